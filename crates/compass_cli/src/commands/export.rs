use std::path::Path;

use compass_core::config::CompassConfig;
use miette::{IntoDiagnostic, Result};
use owo_colors::OwoColorize;

use crate::commands::open_service;
use crate::output::Output;

/// Write the full state document as JSON, e.g. before clearing storage
/// that has run out of room
pub async fn export(config: &CompassConfig, path: &Path) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;

    let state = service.state().snapshot();
    let json = serde_json::to_string_pretty(&state).into_diagnostic()?;
    tokio::fs::write(path, json).await.into_diagnostic()?;

    output.success(&format!("Exported health data to {}", path.display().bright_cyan()));
    output.kv("Tasks", &state.tasks.len().to_string());
    output.kv("Events", &service.events().len().to_string());
    Ok(())
}
