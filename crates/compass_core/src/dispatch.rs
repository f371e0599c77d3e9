//! JSON client for the COMPASS server
//!
//! Every call is a single attempt. Failures come back as one of three
//! [`DispatchError`] variants so callers can tell "the server is unreachable"
//! apart from "the server said no" without looking at message text.

use std::time::Duration;

use chrono::Utc;
use miette::Diagnostic;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::compose::{HealthReport, SosAlert};
use crate::config::ServerConfig;
use crate::error::CoreError;

pub const SEND_SOS: &str = "send-sos";
pub const SEND_REPORT: &str = "send-report";
pub const TWILIO_TEST: &str = "twilio/test";
pub const STATUS: &str = "status";

const DEFAULT_FAILURE_MESSAGE: &str = "Request failed";

#[derive(Error, Diagnostic, Debug)]
pub enum DispatchError {
    /// The request never got an HTTP response
    #[error("Cannot reach the server at {endpoint}")]
    #[diagnostic(
        code(compass_core::dispatch_transport),
        help("Check that the COMPASS server is running and the base URL is correct")
    )]
    Transport {
        endpoint: String,
        #[source]
        cause: reqwest::Error,
    },

    /// Non-2xx response, or a 2xx response that was not JSON
    #[error("Server rejected request to {endpoint} with HTTP {status}")]
    #[diagnostic(code(compass_core::dispatch_rejected), help("Response body: {body}"))]
    Rejected {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The server processed the request and reported `success: false`
    #[error("{message}")]
    #[diagnostic(code(compass_core::dispatch_application))]
    Application {
        endpoint: String,
        message: String,
        data: Option<Value>,
    },
}

impl DispatchError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn endpoint(&self) -> &str {
        match self {
            Self::Transport { endpoint, .. }
            | Self::Rejected { endpoint, .. }
            | Self::Application { endpoint, .. } => endpoint,
        }
    }

    /// Text suitable for a notification
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport { .. } => {
                "Cannot connect to server. Please check that the COMPASS server is running."
                    .to_string()
            }
            Self::Rejected { status, body, .. } => format!("API Error: HTTP {status}: {body}"),
            Self::Application { message, .. } => message.clone(),
        }
    }
}

/// A body with the client timestamp merged in at the top level
#[derive(Serialize)]
struct Stamped<'a, B: Serialize + ?Sized> {
    #[serde(flatten)]
    body: Option<&'a B>,
    client_timestamp: String,
}

/// Pull the failure message out of a `success: false` body
fn application_failure(value: &Value) -> Option<(String, Option<Value>)> {
    if value.get("success") != Some(&Value::Bool(false)) {
        return None;
    }
    let data = value.get("data").cloned();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| {
            data.as_ref()
                .and_then(|d| d.get("error"))
                .and_then(Value::as_str)
        })
        .unwrap_or(DEFAULT_FAILURE_MESSAGE)
        .to_string();
    Some((message, data))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosReceipt {
    pub alert_id: Option<String>,
    pub contacts_notified: u64,
    pub data: Value,
}

impl SosReceipt {
    fn from_response(response: &Value) -> Self {
        let data = response.get("data").cloned().unwrap_or(Value::Null);
        let alert_id = data.get("alert_id").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        });
        let contacts_notified = data
            .pointer("/delivery_summary/contacts_notified")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Self {
            alert_id,
            contacts_notified,
            data,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TwilioStatus {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Body of `GET /status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    #[serde(default)]
    pub twilio: TwilioStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    base_url: String,
    client_name: String,
    client_version: String,
}

impl Dispatcher {
    pub fn new(config: &ServerConfig) -> Result<Self, CoreError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| {
            CoreError::configuration(
                "[server]",
                "request_timeout_secs",
                "settings reqwest can build a client from",
                e,
            )
        })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_name: config.client_name.clone(),
            client_version: config.client_version.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Send one request and classify the outcome. `body` is ignored for GET.
    pub async fn dispatch<B>(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&B>,
    ) -> Result<Value, DispatchError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(endpoint);
        tracing::debug!("API request: {} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-Client", &self.client_name)
            .header("X-Client-Version", &self.client_version);

        if method != Method::GET {
            // `.json()` also sets Content-Type: application/json
            request = request.json(&Stamped {
                body,
                client_timestamp: Utc::now().to_rfc3339(),
            });
        }

        let response = request.send().await.map_err(|cause| {
            tracing::warn!("API connection error ({}): {}", endpoint, cause);
            DispatchError::Transport {
                endpoint: url.clone(),
                cause,
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|cause| DispatchError::Transport {
                endpoint: url.clone(),
                cause,
            })?;

        if !status.is_success() {
            tracing::warn!("API error {} from {}: {}", status, endpoint, text);
            return Err(DispatchError::Rejected {
                endpoint: url,
                status: status.as_u16(),
                body: text,
            });
        }

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Non-JSON response from {}: {}", endpoint, e);
                return Err(DispatchError::Rejected {
                    endpoint: url,
                    status: status.as_u16(),
                    body: text,
                });
            }
        };

        if let Some((message, data)) = application_failure(&value) {
            tracing::info!("Server reported failure for {}: {}", endpoint, message);
            return Err(DispatchError::Application {
                endpoint: url,
                message,
                data,
            });
        }

        tracing::debug!("API response from {}: {}", endpoint, value);
        Ok(value)
    }

    pub async fn send_sos(&self, alert: &SosAlert) -> Result<SosReceipt, DispatchError> {
        let response = self.dispatch(SEND_SOS, Method::POST, Some(alert)).await?;
        Ok(SosReceipt::from_response(&response))
    }

    /// Returns the response's `data`, or the whole body when it has none
    pub async fn send_report(&self, report: &HealthReport) -> Result<Value, DispatchError> {
        let response = self.dispatch(SEND_REPORT, Method::POST, Some(report)).await?;
        Ok(response.get("data").cloned().unwrap_or(response))
    }

    pub async fn test_twilio(&self, number: &str) -> Result<Value, DispatchError> {
        let body = serde_json::json!({ "test_number": number });
        let response = self.dispatch(TWILIO_TEST, Method::POST, Some(&body)).await?;
        Ok(response.get("data").cloned().unwrap_or(response))
    }

    pub async fn status(&self) -> Result<ServerStatus, DispatchError> {
        let response = self.dispatch::<Value>(STATUS, Method::GET, None).await?;
        serde_json::from_value(response.clone()).map_err(|_| DispatchError::Rejected {
            endpoint: self.url(STATUS),
            status: 200,
            body: response.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_application_failure_message_sources() {
        assert_eq!(application_failure(&json!({ "success": true })), None);
        assert_eq!(application_failure(&json!({ "twilio": {} })), None);

        let (message, _) = application_failure(&json!({
            "success": false,
            "message": "queue full"
        }))
        .unwrap();
        assert_eq!(message, "queue full");

        let (message, data) = application_failure(&json!({
            "success": false,
            "data": { "error": "bad credentials" }
        }))
        .unwrap();
        assert_eq!(message, "bad credentials");
        assert!(data.is_some());

        let (message, _) = application_failure(&json!({ "success": false })).unwrap();
        assert_eq!(message, DEFAULT_FAILURE_MESSAGE);
    }

    #[test]
    fn test_stamped_body_is_flattened() {
        let body = json!({ "test_number": "5551234567" });
        let stamped = serde_json::to_value(Stamped {
            body: Some(&body),
            client_timestamp: "2026-01-01T00:00:00+00:00".to_string(),
        })
        .unwrap();
        assert_eq!(stamped["test_number"], "5551234567");
        assert_eq!(stamped["client_timestamp"], "2026-01-01T00:00:00+00:00");

        let empty = serde_json::to_value(Stamped::<Value> {
            body: None,
            client_timestamp: "t".to_string(),
        })
        .unwrap();
        assert_eq!(empty, json!({ "client_timestamp": "t" }));
    }

    #[test]
    fn test_sos_receipt_reads_delivery_summary() {
        let receipt = SosReceipt::from_response(&json!({
            "success": true,
            "data": { "alert_id": 17, "delivery_summary": { "contacts_notified": 2 } }
        }));
        assert_eq!(receipt.alert_id.as_deref(), Some("17"));
        assert_eq!(receipt.contacts_notified, 2);

        let bare = SosReceipt::from_response(&json!({ "success": true }));
        assert_eq!(bare.alert_id, None);
        assert_eq!(bare.contacts_notified, 0);
    }
}
