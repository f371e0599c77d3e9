use compass_core::config::CompassConfig;
use miette::Result;
use owo_colors::OwoColorize;

use crate::commands::open_service;
use crate::output::Output;

/// Show the stored theme, or store a new one
pub async fn theme(config: &CompassConfig, name: Option<&str>) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;
    let store = service.state().store();

    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => {
            store.set_theme(name)?;
            output.success(&format!("Theme set to {}", name.bright_cyan()));
        }
        None => output.kv("Theme", &store.theme().bright_cyan().to_string()),
    }
    Ok(())
}
