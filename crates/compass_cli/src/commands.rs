pub mod alerts;
pub mod config;
pub mod events;
pub mod export;
pub mod pending;
pub mod profile;
pub mod status;
pub mod tasks;
pub mod theme;
pub mod vitals;

use std::sync::Arc;

use compass_core::CoachService;
use compass_core::config::CompassConfig;
use compass_core::fallback::UriLauncher;
use compass_core::location::FixedLocation;
use miette::Result;

use crate::output::CliNotifier;

/// Build the service from configuration, with terminal notifications and
/// the platform opener for native fallback actions
pub fn open_service(config: &CompassConfig, location: Option<String>) -> Result<CoachService> {
    let actions = Arc::new(UriLauncher::new(config.fallback.opener.clone()));
    let mut service = CoachService::open(config, actions)?.with_notifier(Arc::new(CliNotifier::default()));
    if let Some(location) = location {
        service = service.with_location(Arc::new(FixedLocation(location)));
    }
    tracing::debug!("Opened {:?}", service);
    Ok(service)
}
