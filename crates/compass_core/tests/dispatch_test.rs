#[cfg(test)]
mod dispatch_tests {
    use compass_core::config::ServerConfig;
    use compass_core::dispatch::{DispatchError, Dispatcher, SEND_SOS};
    use pretty_assertions::assert_eq;
    use reqwest::Method;
    use serde_json::{Value, json};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher_for(base_url: &str) -> Dispatcher {
        Dispatcher::new(&ServerConfig {
            base_url: base_url.to_string(),
            client_name: "COMPASS-Test".to_string(),
            client_version: "9.9.9".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    /// Base URL of a port nothing is listening on
    fn dead_server_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_success_returns_body_and_stamps_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/twilio/test"))
            .and(header("X-Client", "COMPASS-Test"))
            .and(header("X-Client-Version", "9.9.9"))
            .and(header("Accept", "application/json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": { "sid": "SM1" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = dispatcher_for(&server.uri());
        let data = dispatcher.test_twilio("5551234567").await.unwrap();
        assert_eq!(data, json!({ "sid": "SM1" }));

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["test_number"], "5551234567");
        let stamp = body["client_timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[tokio::test]
    async fn test_get_sends_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "twilio": { "enabled": true, "status": "active" },
                "version": "2.1.0",
                "stats": { "alerts_sent": 4 }
            })))
            .mount(&server)
            .await;

        let status = dispatcher_for(&server.uri()).status().await.unwrap();
        assert!(status.twilio.enabled);
        assert_eq!(status.twilio.status.as_deref(), Some("active"));
        assert_eq!(status.version.as_deref(), Some("2.1.0"));

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].body.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport() {
        let dispatcher = dispatcher_for(&dead_server_url());
        let err = dispatcher
            .dispatch(SEND_SOS, Method::POST, Some(&json!({})))
            .await
            .unwrap_err();
        assert!(err.is_transport(), "expected transport error, got {err:?}");
    }

    #[tokio::test]
    async fn test_non_2xx_is_rejected_with_body() {
        let server = MockServer::start().await;
        Mock::given(path("/send-report"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = dispatcher_for(&server.uri())
            .dispatch("send-report", Method::POST, Some(&json!({ "type": "family" })))
            .await
            .unwrap_err();
        match err {
            DispatchError::Rejected { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_2xx_with_invalid_json_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let err = dispatcher_for(&server.uri()).status().await.unwrap_err();
        assert!(matches!(err, DispatchError::Rejected { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_success_false_is_application_error() {
        let server = MockServer::start().await;
        Mock::given(path("/send-report"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "queue full",
                "data": { "retry_after": 30 }
            })))
            .mount(&server)
            .await;

        let err = dispatcher_for(&server.uri())
            .dispatch("send-report", Method::POST, Some(&json!({})))
            .await
            .unwrap_err();
        match &err {
            DispatchError::Application { message, data, .. } => {
                assert_eq!(message, "queue full");
                assert_eq!(data.as_ref().unwrap()["retry_after"], 30);
            }
            other => panic!("expected application error, got {other:?}"),
        }
        assert!(!err.is_transport());
        assert_eq!(err.user_message(), "queue full");
    }
}
