use compass_core::config::CompassConfig;
use miette::Result;
use owo_colors::OwoColorize;

use crate::commands::open_service;
use crate::output::{Output, format_relative_time};

pub async fn list(config: &CompassConfig, limit: usize) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;
    let events = service.events().recent(limit);

    output.section("Recent Events");
    if events.is_empty() {
        output.status("No events recorded yet");
        return Ok(());
    }

    for entry in events {
        output.info(
            "•",
            &format!(
                "{} {}",
                entry.event.bright_cyan(),
                format_relative_time(entry.timestamp)
            ),
        );
        if !entry.attributes.is_empty() {
            let attributes = serde_json::Value::Object(entry.attributes);
            output.kv("  data", &attributes.to_string().dimmed().to_string());
        }
    }
    Ok(())
}
