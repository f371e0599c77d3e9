//! User actions, end to end
//!
//! Each action composes a payload from the state handle, sends it through
//! the dispatcher and turns every outcome into notifications, an event log
//! entry and an [`ActionOutcome`]. Remote failures never escape as errors;
//! only missing user input does, and it is rejected before anything is sent.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use crate::compose::{ReportType, compose_health_report, compose_sos_alert, recipient_for};
use crate::config::CompassConfig;
use crate::dispatch::{DispatchError, Dispatcher, TwilioStatus};
use crate::error::{CoreError, Result};
use crate::event_log::EventLog;
use crate::fallback::{FallbackEscalation, FallbackResult, NativeActions};
use crate::gamification::{self, Rewards};
use crate::kv::{FileStore, KeyValueStore, KeyValueStoreExt, StorageKey};
use crate::location::{LocationSource, NoLocation};
use crate::metrics::DerivedMetrics;
use crate::notify::{Affordance, BusyGuard, NotificationLevel, Notifier, TracingNotifier};
use crate::pending::{PendingReport, PendingReports};
use crate::state::store::CompletionOutcome;
use crate::state::{StateHandle, StateStore};

/// What a user action ended with
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub fallback_activated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackResult>,
    /// The payload was archived for a later resend
    pub queued: bool,
}

impl ActionOutcome {
    fn succeeded(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details,
            fallback_activated: false,
            fallback: None,
            queued: false,
        }
    }

    fn failed(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            success: false,
            ..Self::succeeded(message, details)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub online: bool,
    pub twilio: TwilioStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushSummary {
    pub sent: usize,
    /// Still unreachable, left in the queue
    pub requeued: usize,
    /// Rejected by the server or missing a payload
    pub dropped: usize,
}

pub struct CoachService {
    state: Arc<StateHandle>,
    dispatcher: Dispatcher,
    events: EventLog,
    pending: PendingReports,
    fallback: FallbackEscalation,
    location: Arc<dyn LocationSource>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for CoachService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoachService")
            .field("server", &self.dispatcher.base_url())
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl CoachService {
    /// Event log and pending queue share the state store's key-value store
    pub fn new(state: Arc<StateHandle>, dispatcher: Dispatcher, fallback: FallbackEscalation) -> Self {
        let kv: Arc<dyn KeyValueStore> = state.store().kv().clone();
        Self {
            events: EventLog::open(kv.clone()),
            pending: PendingReports::new(kv),
            state,
            dispatcher,
            fallback,
            location: Arc::new(NoLocation),
            notifier: Arc::new(TracingNotifier),
        }
    }

    /// Wire everything up from configuration, storing data under `storage.path`
    pub fn open(config: &CompassConfig, actions: Arc<dyn NativeActions>) -> Result<Self> {
        let kv = FileStore::open(&config.storage.path)?.with_quota(config.storage.max_document_bytes);
        let store = StateStore::new(Arc::new(kv), config.storage.max_document_bytes);
        let state = Arc::new(StateHandle::open(store));
        let dispatcher = Dispatcher::new(&config.server)?;
        let fallback = FallbackEscalation::new(actions, config.fallback.emergency_number.clone());
        Ok(Self::new(state, dispatcher, fallback))
    }

    pub fn with_location(mut self, location: Arc<dyn LocationSource>) -> Self {
        self.location = location;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn state(&self) -> &Arc<StateHandle> {
        &self.state
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn pending(&self) -> &PendingReports {
        &self.pending
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn notify(&self, level: NotificationLevel, title: &str, message: &str) {
        self.notifier.notify(level, title, message);
    }

    pub async fn send_sos_alert(&self) -> ActionOutcome {
        let _busy = BusyGuard::engage(self.notifier.as_ref(), Affordance::SosButton);

        let location = self.location.current_location().await;
        let vitals = self.state.current_vitals();
        let user_id = self.state.user_id().unwrap_or_else(|e| {
            tracing::warn!("No stable user id for SOS alert: {}", e);
            "unknown".to_string()
        });
        let alert = self
            .state
            .read(|state| compose_sos_alert(state, &user_id, location, vitals));

        match self.dispatcher.send_sos(&alert).await {
            Ok(receipt) => {
                self.notify(
                    NotificationLevel::Success,
                    "SOS Alert Sent!",
                    "Emergency contacts notified via SMS, WhatsApp, and voice call.",
                );
                self.notifier.celebrate();
                self.events.record(
                    "sos_alert_sent",
                    json!({
                        "alert_id": receipt.alert_id,
                        "contacts_notified": receipt.contacts_notified,
                    }),
                );
                ActionOutcome::succeeded("SOS Alert Processed Successfully", Some(receipt.data))
            }
            Err(e) if e.is_transport() => {
                tracing::error!("SOS alert could not reach the server: {}", e);
                let state = self.state.snapshot();
                let fallback = self.fallback.activate(&state);
                self.notify(
                    NotificationLevel::Error,
                    "Using Fallback System",
                    &fallback.message,
                );
                self.events.record(
                    "sos_fallback_activated",
                    json!({
                        "reason": e.to_string(),
                        "actions": fallback.actions,
                        "phone": fallback.phone,
                    }),
                );
                ActionOutcome {
                    fallback_activated: true,
                    fallback: Some(fallback),
                    ..ActionOutcome::failed("Using fallback emergency system", None)
                }
            }
            Err(e) => {
                let message = e.user_message();
                self.notify(NotificationLevel::Warning, "Alert Processing Issue", &message);
                self.events.record("sos_alert_failed", json!({ "message": message }));
                let details = match e {
                    DispatchError::Application { data, .. } => data,
                    _ => None,
                };
                ActionOutcome::failed(message, details)
            }
        }
    }

    pub async fn send_health_report(&self, report_type: ReportType) -> ActionOutcome {
        let _busy = BusyGuard::engage(self.notifier.as_ref(), Affordance::ReportButton);

        let state = self.state.snapshot();
        let vitals = self.state.current_vitals();
        let metrics = DerivedMetrics::from_tasks(&state.tasks);
        let report = compose_health_report(report_type, &state, &vitals, &metrics);
        let recipient = recipient_for(report_type, &state.emergency_contacts);

        match self.dispatcher.send_report(&report).await {
            Ok(data) => {
                self.notify(
                    NotificationLevel::Success,
                    &format!("{} Report Sent", report_type.title()),
                    "Report delivered via WhatsApp.",
                );
                self.notifier.celebrate();
                self.events.record(
                    &format!("{report_type}_report_sent"),
                    json!({ "report_type": report_type, "recipient": recipient }),
                );
                ActionOutcome::succeeded(
                    format!("{report_type} report sent successfully via WhatsApp!"),
                    Some(data),
                )
            }
            Err(DispatchError::Application { message, data, .. }) => {
                self.notify(NotificationLevel::Warning, "Report Delivery Issue", &message);
                ActionOutcome::failed(message, data)
            }
            Err(e @ DispatchError::Rejected { .. }) => {
                let message = e.user_message();
                self.notify(NotificationLevel::Warning, "Report Delivery Issue", &message);
                ActionOutcome::failed(message, None)
            }
            Err(e) => {
                tracing::warn!("Health report could not reach the server: {}", e);
                let queued = match self
                    .pending
                    .push(PendingReport::new(report, recipient, &metrics))
                {
                    Ok(_) => true,
                    Err(err) => {
                        tracing::error!("Error saving report locally: {}", err);
                        false
                    }
                };
                let hint = if queued {
                    "Cannot connect to server. The report was saved and can be resent later."
                } else {
                    "Cannot connect to server. Is it running?"
                };
                self.notify(NotificationLevel::Error, "Report Generation Failed", hint);
                ActionOutcome {
                    queued,
                    ..ActionOutcome::failed(
                        format!("Error sending {report_type} report: {}", e.user_message()),
                        None,
                    )
                }
            }
        }
    }

    /// Send a test message. Without `number`, the first emergency contact's
    /// phone is used; with neither, nothing is sent.
    pub async fn test_twilio_connection(&self, number: Option<String>) -> Result<ActionOutcome> {
        let number = number
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .or_else(|| {
                self.state.read(|state| {
                    state
                        .emergency_contacts
                        .first()
                        .map(|c| c.phone.trim().to_string())
                        .filter(|p| !p.is_empty())
                })
            })
            .ok_or_else(|| {
                CoreError::invalid_input(
                    "test_number",
                    "Enter a phone number to test Twilio, or add an emergency contact",
                )
            })?;

        let _busy = BusyGuard::engage(self.notifier.as_ref(), Affordance::TestButton);
        self.notify(NotificationLevel::Info, "Testing Twilio", "Sending test message...");

        let outcome = match self.dispatcher.test_twilio(&number).await {
            Ok(data) => {
                self.notify(
                    NotificationLevel::Success,
                    "Twilio Test Successful",
                    &format!("Test message sent to {number}"),
                );
                ActionOutcome::succeeded("Twilio connection verified", Some(data))
            }
            Err(DispatchError::Application { message, data, .. }) => {
                self.notify(NotificationLevel::Error, "Twilio Test Failed", &message);
                ActionOutcome::failed("Twilio test failed", data)
            }
            Err(e) => {
                let message = e.user_message();
                self.notify(NotificationLevel::Error, "Twilio Test Error", &message);
                ActionOutcome::failed(message, None)
            }
        };
        Ok(outcome)
    }

    pub async fn check_status(&self) -> StatusReport {
        let _busy = BusyGuard::engage(self.notifier.as_ref(), Affordance::StatusIndicator);
        let checked_at = Utc::now();

        match self.dispatcher.status().await {
            Ok(status) => {
                if status.twilio.enabled {
                    self.announce_first_connection(&status.twilio);
                } else {
                    tracing::warn!("API server online but Twilio not configured");
                    self.notify(
                        NotificationLevel::Warning,
                        "Twilio Not Configured",
                        "SMS/WhatsApp features unavailable",
                    );
                }
                StatusReport {
                    online: true,
                    twilio: status.twilio,
                    version: status.version,
                    stats: status.stats,
                    error: None,
                    checked_at,
                }
            }
            Err(e) => {
                tracing::warn!("API server is offline: {}", e);
                self.notify(
                    NotificationLevel::Error,
                    "API Server Offline",
                    &format!(
                        "Running in local mode. Start the COMPASS server at {}.",
                        self.dispatcher.base_url()
                    ),
                );
                StatusReport {
                    online: false,
                    twilio: TwilioStatus::default(),
                    version: None,
                    stats: None,
                    error: Some(e.to_string()),
                    checked_at,
                }
            }
        }
    }

    fn announce_first_connection(&self, twilio: &TwilioStatus) {
        let kv = self.state.store().kv();
        let seen = kv
            .get_json::<bool>(StorageKey::ApiFirstConnect)
            .ok()
            .flatten()
            .unwrap_or(false);
        if seen {
            return;
        }
        self.notify(
            NotificationLevel::Success,
            "API Connected",
            &format!(
                "Twilio enabled: {}",
                twilio.status.as_deref().unwrap_or("active")
            ),
        );
        if let Err(e) = kv.set_json(StorageKey::ApiFirstConnect, &true) {
            tracing::warn!("Could not remember first connection: {}", e);
        }
    }

    /// Resend every archived report once. Each entry stays in the queue
    /// until the server has answered for it, so an interrupted flush loses
    /// nothing.
    pub async fn flush_pending_reports(&self) -> Result<FlushSummary> {
        let _busy = BusyGuard::engage(self.notifier.as_ref(), Affordance::ReportButton);
        let mut summary = FlushSummary::default();

        for entry in self.pending.list() {
            let Some(payload) = entry.payload.as_ref() else {
                tracing::warn!(
                    "Dropping pending {} report from {} with no payload",
                    entry.report_type,
                    entry.timestamp
                );
                self.forget_pending(&entry);
                summary.dropped += 1;
                continue;
            };

            match self.dispatcher.send_report(payload).await {
                Ok(_) => {
                    self.forget_pending(&entry);
                    summary.sent += 1;
                    self.events.record(
                        &format!("{}_report_sent", entry.report_type),
                        json!({
                            "report_type": entry.report_type,
                            "recipient": entry.recipient,
                            "queued_at": entry.timestamp,
                        }),
                    );
                }
                Err(e) if e.is_transport() => summary.requeued += 1,
                Err(e) => {
                    tracing::warn!("Server refused pending {} report: {}", entry.report_type, e);
                    self.forget_pending(&entry);
                    summary.dropped += 1;
                }
            }
        }

        self.notify(
            NotificationLevel::Info,
            "Pending Reports",
            &format!(
                "{} sent, {} still waiting, {} dropped",
                summary.sent, summary.requeued, summary.dropped
            ),
        );
        Ok(summary)
    }

    fn forget_pending(&self, entry: &PendingReport) {
        if let Err(e) = self.pending.remove(entry) {
            tracing::error!(
                "Could not remove pending {} report from the queue: {}",
                entry.report_type,
                e
            );
        }
    }

    /// Complete a task and announce what it earned
    pub fn complete_task(&self, id: u64) -> Result<CompletionOutcome> {
        let outcome = self.state.complete_task(id, Local::now().date_naive())?;
        if let Some(rewards) = &outcome.rewards {
            self.announce_rewards(&outcome, rewards);
        }
        Ok(outcome)
    }

    fn announce_rewards(&self, outcome: &CompletionOutcome, rewards: &Rewards) {
        self.events.record(
            "task_completed",
            json!({
                "task_id": outcome.task.id,
                "category": outcome.task.category,
                "xp_gained": rewards.xp_gained,
            }),
        );
        if rewards.levels_gained > 0 {
            self.notify(
                NotificationLevel::Success,
                "Level Up!",
                &format!("You reached level {}", rewards.level),
            );
            self.notifier.celebrate();
        }
        for id in &rewards.new_badges {
            let name = gamification::badge(id).map_or(id.as_str(), |b| b.name);
            self.notify(NotificationLevel::Success, "Badge Earned", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::fallback::RecordingActions;
    use crate::kv::{MAX_DOCUMENT_BYTES, MemoryStore};
    use crate::notify::RecordingNotifier;
    use pretty_assertions::assert_eq;

    fn offline_service(notifier: Arc<RecordingNotifier>) -> CoachService {
        let store = StateStore::new(Arc::new(MemoryStore::new()), MAX_DOCUMENT_BYTES);
        let config = ServerConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        CoachService::new(
            Arc::new(StateHandle::open(store)),
            Dispatcher::new(&config).unwrap(),
            FallbackEscalation::new(Arc::new(RecordingActions::new()), "911"),
        )
        .with_notifier(notifier)
    }

    #[tokio::test]
    async fn test_twilio_test_without_any_number_is_rejected_before_dispatch() {
        let notifier = RecordingNotifier::new();
        let service = offline_service(notifier.clone());
        service
            .state()
            .mutate(|state| {
                state.emergency_contacts.iter_mut().for_each(|c| c.phone.clear());
                Ok(())
            })
            .unwrap();

        let err = service.test_twilio_connection(None).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { .. }));
        assert!(notifier.calls().is_empty());
    }

    #[test]
    fn test_complete_task_announces_badges() {
        let notifier = RecordingNotifier::new();
        let service = offline_service(notifier.clone());

        service.complete_task(1).unwrap();
        let outcome = service.complete_task(2).unwrap();
        assert!(outcome
            .rewards
            .unwrap()
            .new_badges
            .contains(&"vitals-pro".to_string()));
        assert!(notifier
            .notifications()
            .iter()
            .any(|(_, title, message)| title == "Badge Earned" && message == "Vitals Pro"));
        assert_eq!(service.events().recent(1)[0].event, "task_completed");
    }
}
