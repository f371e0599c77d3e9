#[cfg(test)]
mod scenario_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use compass_core::config::ServerConfig;
    use compass_core::fallback::{NativeIntent, RecordingActions};
    use compass_core::kv::{KeyValueStore, MAX_DOCUMENT_BYTES, MemoryStore, StorageKey};
    use compass_core::location::FixedLocation;
    use compass_core::notify::{NotificationLevel, RecordingNotifier};
    use compass_core::prelude::*;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        service: CoachService,
        actions: Arc<RecordingActions>,
        notifier: Arc<RecordingNotifier>,
        kv: Arc<MemoryStore>,
    }

    fn harness(base_url: &str, kv: Arc<MemoryStore>) -> Harness {
        let actions = Arc::new(RecordingActions::new());
        let notifier = RecordingNotifier::new();
        let store = StateStore::new(kv.clone(), MAX_DOCUMENT_BYTES);
        let dispatcher = Dispatcher::new(&ServerConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        })
        .unwrap();
        let service = CoachService::new(
            Arc::new(StateHandle::open(store)),
            dispatcher,
            FallbackEscalation::new(actions.clone(), "911"),
        )
        .with_location(Arc::new(FixedLocation("Home".to_string())))
        .with_notifier(notifier.clone());
        Harness {
            service,
            actions,
            notifier,
            kv,
        }
    }

    fn dead_server_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_sos_transport_failure_activates_fallback() {
        let h = harness(&dead_server_url(), Arc::new(MemoryStore::new()));

        let outcome = h.service.send_sos_alert().await;
        assert!(!outcome.success);
        assert!(outcome.fallback_activated);
        let fallback = outcome.fallback.unwrap();
        assert!(fallback.success);
        assert_eq!(fallback.actions, vec!["SMS app opened", "Phone app opened"]);
        assert_eq!(fallback.phone, "5551234567");

        let intents = h.actions.intents();
        assert!(matches!(&intents[0], NativeIntent::Sms { phone, .. } if phone == "5551234567"));
        assert!(matches!(&intents[1], NativeIntent::Dial { phone } if phone == "5551234567"));

        assert_eq!(h.service.events().recent(1)[0].event, "sos_fallback_activated");
        assert!(h.notifier.is_idle(Affordance::SosButton));
        let notes = h.notifier.notifications();
        assert_eq!(notes.last().unwrap().0, NotificationLevel::Error);
    }

    #[tokio::test]
    async fn test_sos_success_logs_alert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-sos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "alert_id": "SOS-42", "delivery_summary": { "contacts_notified": 2 } }
            })))
            .expect(1)
            .mount(&server)
            .await;
        let h = harness(&server.uri(), Arc::new(MemoryStore::new()));

        let outcome = h.service.send_sos_alert().await;
        assert!(outcome.success);
        assert!(!outcome.fallback_activated);
        assert!(h.actions.intents().is_empty());

        let entry = &h.service.events().recent(1)[0];
        assert_eq!(entry.event, "sos_alert_sent");
        assert_eq!(entry.attributes["alert_id"], "SOS-42");
        assert_eq!(entry.attributes["contacts_notified"], 2);

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["patient_name"], "Rohan Choure");
        assert_eq!(body["location"], "Home");
        assert_eq!(body["additional_contacts"].as_array().unwrap().len(), 2);
        assert!(body["client_timestamp"].is_string());
        assert!(h.notifier.is_idle(Affordance::SosButton));
    }

    #[tokio::test]
    async fn test_sos_business_failure_does_not_fall_back() {
        let server = MockServer::start().await;
        Mock::given(path("/send-sos"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "Twilio not configured"
            })))
            .mount(&server)
            .await;
        let h = harness(&server.uri(), Arc::new(MemoryStore::new()));

        let outcome = h.service.send_sos_alert().await;
        assert!(!outcome.success);
        assert!(!outcome.fallback_activated);
        assert_eq!(outcome.message, "Twilio not configured");
        assert!(h.actions.intents().is_empty());
        assert_eq!(
            h.notifier.notifications().last().unwrap().0,
            NotificationLevel::Warning
        );
    }

    #[tokio::test]
    async fn test_report_business_failure_returns_server_message() {
        let server = MockServer::start().await;
        Mock::given(path("/send-report"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "queue full"
            })))
            .mount(&server)
            .await;
        let h = harness(&server.uri(), Arc::new(MemoryStore::new()));

        let outcome = h.service.send_health_report(ReportType::Family).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "queue full");
        assert!(!outcome.fallback_activated);
        assert!(!outcome.queued);
        assert!(h.actions.intents().is_empty());
        assert!(h.service.pending().is_empty());
        assert!(h.notifier.is_idle(Affordance::ReportButton));
    }

    #[tokio::test]
    async fn test_unreachable_report_is_queued_then_flushed() {
        let kv = Arc::new(MemoryStore::new());

        let offline = harness(&dead_server_url(), kv.clone());
        let outcome = offline.service.send_health_report(ReportType::Doctor).await;
        assert!(!outcome.success);
        assert!(outcome.queued);
        assert!(!outcome.fallback_activated);
        assert!(offline.actions.intents().is_empty());
        let pending = offline.service.pending().list();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].recipient, "Dr. Sharma");

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-report"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": {} })),
            )
            .expect(1)
            .mount(&server)
            .await;
        let online = harness(&server.uri(), kv.clone());
        let summary = online.service.flush_pending_reports().await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.requeued, 0);
        assert!(online.service.pending().is_empty());
        assert_eq!(online.service.events().recent(1)[0].event, "doctor_report_sent");

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["type"], "doctor");
        assert!(body["report"]["score"].is_u64());
    }

    #[tokio::test]
    async fn test_interrupted_flush_keeps_every_queued_report() {
        let kv = Arc::new(MemoryStore::new());
        let offline = harness(&dead_server_url(), kv.clone());
        assert!(offline.service.send_health_report(ReportType::Family).await.queued);
        assert!(offline.service.send_health_report(ReportType::Doctor).await.queued);

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send-report"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "data": {} }))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        let online = harness(&server.uri(), kv.clone());

        let flush = tokio::time::timeout(
            Duration::from_millis(300),
            online.service.flush_pending_reports(),
        )
        .await;
        assert!(flush.is_err());
        assert_eq!(online.service.pending().len(), 2);
        assert!(online.notifier.is_idle(Affordance::ReportButton));
    }

    #[tokio::test]
    async fn test_flush_removes_only_answered_reports() {
        let kv = Arc::new(MemoryStore::new());
        let offline = harness(&dead_server_url(), kv.clone());
        assert!(offline.service.send_health_report(ReportType::Family).await.queued);
        assert!(offline.service.send_health_report(ReportType::Doctor).await.queued);

        let summary = offline.service.flush_pending_reports().await.unwrap();
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.requeued, 2);
        let still = offline.service.pending().list();
        assert_eq!(still.len(), 2);
        assert_eq!(still[0].report_type, ReportType::Family);

        let server = MockServer::start().await;
        Mock::given(path("/send-report"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "recipient unknown"
            })))
            .expect(2)
            .mount(&server)
            .await;
        let online = harness(&server.uri(), kv.clone());
        let summary = online.service.flush_pending_reports().await.unwrap();
        assert_eq!(summary.dropped, 2);
        assert_eq!(summary.requeued, 0);
        assert!(online.service.pending().is_empty());
    }

    #[tokio::test]
    async fn test_first_connection_is_announced_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "twilio": { "enabled": true, "status": "active" },
                "version": "2.0.0"
            })))
            .mount(&server)
            .await;
        let h = harness(&server.uri(), Arc::new(MemoryStore::new()));

        let first = h.service.check_status().await;
        let second = h.service.check_status().await;
        assert!(first.online && second.online);
        assert_eq!(second.version.as_deref(), Some("2.0.0"));

        let connected = h
            .notifier
            .notifications()
            .into_iter()
            .filter(|(_, title, _)| title == "API Connected")
            .count();
        assert_eq!(connected, 1);
        assert!(h.kv.get(StorageKey::ApiFirstConnect).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_twilio_test_defaults_to_first_contact() {
        let server = MockServer::start().await;
        Mock::given(path("/twilio/test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": {} })),
            )
            .mount(&server)
            .await;
        let h = harness(&server.uri(), Arc::new(MemoryStore::new()));

        let outcome = h.service.test_twilio_connection(None).await.unwrap();
        assert!(outcome.success);

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["test_number"], "(555) 123-4567");
    }
}
