//! User-facing feedback: notifications and busy indicators
//!
//! The core never renders anything itself. Front-ends implement
//! [`Notifier`] and decide how a notification or a busy affordance looks.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationLevel::Info => "INFO",
            NotificationLevel::Success => "SUCCESS",
            NotificationLevel::Warning => "WARNING",
            NotificationLevel::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Controls that show a loading state while an action is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affordance {
    SosButton,
    ReportButton,
    TestButton,
    StatusIndicator,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotificationLevel, title: &str, message: &str);

    /// Show or clear the loading state of a control
    fn set_busy(&self, _affordance: Affordance, _busy: bool) {}

    /// Positive feedback after a successful send
    fn celebrate(&self) {}
}

/// Writes notifications to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotificationLevel, title: &str, message: &str) {
        match level {
            NotificationLevel::Info | NotificationLevel::Success => {
                tracing::info!("[{}] {}: {}", level, title, message)
            }
            NotificationLevel::Warning => tracing::warn!("[{}] {}: {}", level, title, message),
            NotificationLevel::Error => tracing::error!("[{}] {}: {}", level, title, message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Notification {
        level: NotificationLevel,
        title: String,
        message: String,
    },
    Busy {
        affordance: Affordance,
        busy: bool,
    },
    Celebration,
}

/// Keeps every call so tests can assert on what the user would have seen
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<Recorded>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().clone()
    }

    /// Only the notifications, as (level, title, message)
    pub fn notifications(&self) -> Vec<(NotificationLevel, String, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Recorded::Notification {
                    level,
                    title,
                    message,
                } => Some((*level, title.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    /// Whether the affordance was left in its idle state
    pub fn is_idle(&self, affordance: Affordance) -> bool {
        self.calls
            .lock()
            .iter()
            .rev()
            .find_map(|call| match call {
                Recorded::Busy {
                    affordance: a,
                    busy,
                } if *a == affordance => Some(!busy),
                _ => None,
            })
            .unwrap_or(true)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NotificationLevel, title: &str, message: &str) {
        self.calls.lock().push(Recorded::Notification {
            level,
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn set_busy(&self, affordance: Affordance, busy: bool) {
        self.calls.lock().push(Recorded::Busy { affordance, busy });
    }

    fn celebrate(&self) {
        self.calls.lock().push(Recorded::Celebration);
    }
}

/// Marks an affordance busy until dropped
#[must_use = "the affordance returns to idle as soon as the guard is dropped"]
pub struct BusyGuard<'a> {
    notifier: &'a dyn Notifier,
    affordance: Affordance,
}

impl<'a> BusyGuard<'a> {
    pub fn engage(notifier: &'a dyn Notifier, affordance: Affordance) -> Self {
        notifier.set_busy(affordance, true);
        Self {
            notifier,
            affordance,
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.notifier.set_busy(self.affordance, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fails_midway(notifier: &dyn Notifier) -> Result<(), String> {
        let _busy = BusyGuard::engage(notifier, Affordance::ReportButton);
        "not-a-number".parse::<u32>().map_err(|e| e.to_string())?;
        Ok(())
    }

    #[test]
    fn test_guard_resets_on_early_return() {
        let notifier = RecordingNotifier::new();
        assert!(fails_midway(notifier.as_ref()).is_err());
        assert_eq!(
            notifier.calls(),
            vec![
                Recorded::Busy {
                    affordance: Affordance::ReportButton,
                    busy: true
                },
                Recorded::Busy {
                    affordance: Affordance::ReportButton,
                    busy: false
                },
            ]
        );
        assert!(notifier.is_idle(Affordance::ReportButton));
    }
}
