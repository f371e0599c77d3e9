//! COMPASS Core - health coach state and alert delivery
//!
//! This crate holds the client side of the COMPASS health coach: the local
//! state document and its store, health metrics and gamification, SOS and
//! report payloads, the dispatcher that sends them to the COMPASS server,
//! and the device-native fallback used when the server cannot be reached.

pub mod compose;
pub mod config;
pub mod countdown;
pub mod dispatch;
pub mod error;
pub mod event_log;
pub mod fallback;
pub mod gamification;
pub mod kv;
pub mod location;
pub mod metrics;
pub mod notify;
pub mod pending;
pub mod service;
pub mod state;
pub mod status;

pub use compose::{HealthReport, ReportType, SosAlert};
pub use config::CompassConfig;
pub use dispatch::{DispatchError, Dispatcher};
pub use error::{CoreError, Result};
pub use event_log::{EventLog, EventLogEntry};
pub use fallback::{FallbackEscalation, FallbackResult, NativeActions};
pub use kv::{FileStore, KeyValueStore, MemoryStore, StorageError, StorageKey};
pub use metrics::DerivedMetrics;
pub use notify::{Affordance, NotificationLevel, Notifier};
pub use service::{ActionOutcome, CoachService, StatusReport};
pub use state::{ApplicationState, StateHandle, StateStore};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        ActionOutcome, Affordance, ApplicationState, CoachService, CompassConfig, CoreError,
        DerivedMetrics, DispatchError, Dispatcher, FallbackEscalation, HealthReport,
        KeyValueStore, NotificationLevel, Notifier, ReportType, Result, SosAlert, StateHandle,
        StateStore, StatusReport,
    };
}
