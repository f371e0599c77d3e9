//! Device-native escalation when the server cannot be reached
//!
//! Opens a pre-filled SMS and a phone call to the number found in the
//! profile's emergency contact line. Nothing here returns an error: a
//! launch that fails is logged and left out of the reported actions.

use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, LazyLock};
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ApplicationState;

pub const SMS_OPENED: &str = "SMS app opened";
pub const PHONE_OPENED: &str = "Phone app opened";

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(?(\d{3})\)?[-.\s]?(\d{3})[-.\s]?(\d{4})").expect("phone pattern compiles")
});

/// First 3-3-4 digit group in `text`, as bare digits
pub fn extract_phone(text: &str) -> Option<String> {
    let caps = PHONE_PATTERN.captures(text)?;
    Some(format!("{}{}{}", &caps[1], &caps[2], &caps[3]))
}

#[derive(Error, Diagnostic, Debug)]
pub enum NativeActionError {
    #[error("Failed to launch '{opener}' for {uri}")]
    #[diagnostic(
        code(compass_core::native_launch),
        help("Set [fallback] opener to a command that can open sms: and tel: links")
    )]
    Launch {
        opener: String,
        uri: String,
        #[source]
        cause: std::io::Error,
    },

    #[error("{action} is not available on this device")]
    #[diagnostic(code(compass_core::native_unavailable))]
    Unavailable { action: &'static str },
}

/// Device messaging and calling
pub trait NativeActions: Send + Sync {
    fn open_sms(&self, phone: &str, body: &str) -> Result<(), NativeActionError>;
    fn dial(&self, phone: &str) -> Result<(), NativeActionError>;
}

pub fn sms_uri(phone: &str, body: &str) -> String {
    format!("sms:{}?body={}", phone, urlencoding::encode(body))
}

pub fn tel_uri(phone: &str) -> String {
    format!("tel:{phone}")
}

/// Hands `sms:`/`tel:` URIs to an opener command such as `xdg-open`
#[derive(Debug, Clone)]
pub struct UriLauncher {
    opener: String,
}

impl UriLauncher {
    pub fn new(opener: impl Into<String>) -> Self {
        Self {
            opener: opener.into(),
        }
    }

    fn launch(&self, uri: String) -> Result<(), NativeActionError> {
        self.spawn_reaped(uri).map(|_| ())
    }

    /// Start the opener and wait for it on a background thread so it does
    /// not linger as a zombie
    fn spawn_reaped(
        &self,
        uri: String,
    ) -> Result<Option<JoinHandle<Option<ExitStatus>>>, NativeActionError> {
        tracing::debug!("Launching {} {}", self.opener, uri);
        let mut child = Command::new(&self.opener)
            .arg(&uri)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|cause| NativeActionError::Launch {
                opener: self.opener.clone(),
                uri,
                cause,
            })?;

        let opener = self.opener.clone();
        let reaper = std::thread::Builder::new()
            .name("opener-reaper".to_string())
            .spawn(move || match child.wait() {
                Ok(status) => {
                    if !status.success() {
                        tracing::warn!("{} exited with {}", opener, status);
                    }
                    Some(status)
                }
                Err(e) => {
                    tracing::warn!("Could not wait for {}: {}", opener, e);
                    None
                }
            });
        match reaper {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                tracing::warn!("Could not start a reaper thread for {}: {}", self.opener, e);
                Ok(None)
            }
        }
    }
}

impl NativeActions for UriLauncher {
    fn open_sms(&self, phone: &str, body: &str) -> Result<(), NativeActionError> {
        self.launch(sms_uri(phone, body))
    }

    fn dial(&self, phone: &str) -> Result<(), NativeActionError> {
        self.launch(tel_uri(phone))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum NativeIntent {
    Sms { phone: String, body: String },
    Dial { phone: String },
}

/// Records intents instead of performing them. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct RecordingActions {
    intents: Mutex<Vec<NativeIntent>>,
    fail_sms: bool,
    fail_dial: bool,
}

impl RecordingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given actions report themselves unavailable
    pub fn failing(sms: bool, dial: bool) -> Self {
        Self {
            intents: Mutex::new(Vec::new()),
            fail_sms: sms,
            fail_dial: dial,
        }
    }

    pub fn intents(&self) -> Vec<NativeIntent> {
        self.intents.lock().clone()
    }
}

impl NativeActions for RecordingActions {
    fn open_sms(&self, phone: &str, body: &str) -> Result<(), NativeActionError> {
        if self.fail_sms {
            return Err(NativeActionError::Unavailable { action: "SMS" });
        }
        self.intents.lock().push(NativeIntent::Sms {
            phone: phone.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    fn dial(&self, phone: &str) -> Result<(), NativeActionError> {
        if self.fail_dial {
            return Err(NativeActionError::Unavailable { action: "Phone" });
        }
        self.intents.lock().push(NativeIntent::Dial {
            phone: phone.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackResult {
    /// At least one native action was performed
    pub success: bool,
    pub message: String,
    pub actions: Vec<String>,
    pub phone: String,
    pub used_emergency_number: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FallbackEscalation {
    actions: Arc<dyn NativeActions>,
    emergency_number: String,
}

impl std::fmt::Debug for FallbackEscalation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackEscalation")
            .field("emergency_number", &self.emergency_number)
            .finish_non_exhaustive()
    }
}

impl FallbackEscalation {
    pub fn new(actions: Arc<dyn NativeActions>, emergency_number: impl Into<String>) -> Self {
        Self {
            actions,
            emergency_number: emergency_number.into(),
        }
    }

    pub fn emergency_message(state: &ApplicationState) -> String {
        let profile = &state.profile;
        format!(
            "EMERGENCY: {} needs immediate assistance. Conditions: {}. Contact: {}",
            profile.name_or_default(),
            profile.conditions_or_default(),
            profile.emergency_contact_or_default()
        )
    }

    pub fn activate(&self, state: &ApplicationState) -> FallbackResult {
        let message = Self::emergency_message(state);
        let extracted = state
            .profile
            .emergency_contact
            .as_deref()
            .and_then(extract_phone);
        let used_emergency_number = extracted.is_none();
        let phone = extracted.unwrap_or_else(|| self.emergency_number.clone());

        let mut actions = Vec::new();
        match self.actions.open_sms(&phone, &message) {
            Ok(()) => actions.push(SMS_OPENED.to_string()),
            Err(e) => tracing::warn!("Fallback SMS failed: {}", e),
        }
        match self.actions.dial(&phone) {
            Ok(()) => actions.push(PHONE_OPENED.to_string()),
            Err(e) => tracing::warn!("Fallback call failed: {}", e),
        }

        let success = !actions.is_empty();
        if success {
            tracing::info!("Emergency fallback activated for {}: {:?}", phone, actions);
        } else {
            tracing::error!("Emergency fallback could not open any device action");
        }

        FallbackResult {
            success,
            message: if success {
                "Emergency fallback activated".to_string()
            } else {
                format!("Could not open SMS or phone. Call {phone} now.")
            },
            actions,
            phone,
            used_emergency_number,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_phone_variants() {
        assert_eq!(
            extract_phone("Avinash Hugar - (555) 123-4567").as_deref(),
            Some("5551234567")
        );
        assert_eq!(extract_phone("call 555.987.6543").as_deref(), Some("5559876543"));
        assert_eq!(extract_phone("5551112222").as_deref(), Some("5551112222"));
        assert_eq!(extract_phone("no number here"), None);
        assert_eq!(extract_phone("ext 12-34"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_launcher_waits_for_the_opener() {
        let launcher = UriLauncher::new("true");
        let reaper = launcher.spawn_reaped(tel_uri("911")).unwrap().unwrap();
        let status = reaper.join().unwrap();
        assert!(status.is_some_and(|s| s.success()));
        assert!(launcher.dial("911").is_ok());
    }

    #[test]
    fn test_missing_opener_is_a_launch_error() {
        let launcher = UriLauncher::new("compass-no-such-opener");
        let err = launcher.dial("911").unwrap_err();
        assert!(matches!(err, NativeActionError::Launch { ref uri, .. } if uri == "tel:911"));
    }

    #[test]
    fn test_sms_uri_encodes_body() {
        assert_eq!(
            sms_uri("5551234567", "Help me: now"),
            "sms:5551234567?body=Help%20me%3A%20now"
        );
        assert_eq!(tel_uri("911"), "tel:911");
    }

    #[test]
    fn test_activate_opens_sms_and_phone() {
        let recorder = Arc::new(RecordingActions::new());
        let fallback = FallbackEscalation::new(recorder.clone(), "911");
        let state = ApplicationState::default();

        let result = fallback.activate(&state);
        assert!(result.success);
        assert_eq!(result.actions, vec![SMS_OPENED, PHONE_OPENED]);
        assert_eq!(result.phone, "5551234567");
        assert!(!result.used_emergency_number);

        let intents = recorder.intents();
        assert_eq!(intents.len(), 2);
        match &intents[0] {
            NativeIntent::Sms { body, .. } => assert_eq!(
                body,
                "EMERGENCY: Rohan Choure needs immediate assistance. \
                 Conditions: Hypertension, Type 2 Diabetes. \
                 Contact: Avinash Hugar - (555) 123-4567"
            ),
            other => panic!("expected SMS intent, got {other:?}"),
        }
    }

    #[test]
    fn test_activate_without_number_uses_emergency_services() {
        let recorder = Arc::new(RecordingActions::new());
        let fallback = FallbackEscalation::new(recorder.clone(), "112");
        let mut state = ApplicationState::default();
        state.profile.emergency_contact = Some("my neighbour".to_string());

        let result = fallback.activate(&state);
        assert_eq!(result.phone, "112");
        assert!(result.used_emergency_number);
        assert_eq!(
            recorder.intents()[1],
            NativeIntent::Dial {
                phone: "112".to_string()
            }
        );
    }

    #[test]
    fn test_failed_actions_are_swallowed() {
        let fallback = FallbackEscalation::new(Arc::new(RecordingActions::failing(true, false)), "911");
        let result = fallback.activate(&ApplicationState::default());
        assert!(result.success);
        assert_eq!(result.actions, vec![PHONE_OPENED]);

        let fallback = FallbackEscalation::new(Arc::new(RecordingActions::failing(true, true)), "911");
        let result = fallback.activate(&ApplicationState::default());
        assert!(!result.success);
        assert!(result.actions.is_empty());
    }
}
