use std::sync::Arc;
use std::time::Duration;

use compass_core::config::CompassConfig;
use compass_core::service::StatusReport;
use compass_core::status::StatusPoller;
use miette::Result;
use owo_colors::OwoColorize;

use crate::commands::open_service;
use crate::output::{Output, format_flag, format_relative_time};

/// Check the server once
pub async fn show(config: &CompassConfig) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;

    output.section("COMPASS Server");
    output.kv("Server", &config.server.base_url.bright_cyan().to_string());
    let report = service.check_status().await;
    print_report(&output, &report);
    Ok(())
}

/// Poll the server until interrupted
pub async fn watch(config: &CompassConfig) -> Result<()> {
    let output = Output::new();
    let service = Arc::new(open_service(config, None)?);

    output.section("Watching COMPASS Server");
    output.kv("Server", &config.server.base_url.bright_cyan().to_string());
    output.kv(
        "Interval",
        &format!("{}s", config.server.status_poll_interval_secs),
    );
    output.status("Press Ctrl-C to stop");

    let mut poller = StatusPoller::spawn(
        service,
        Duration::from_secs(config.server.status_initial_delay_secs),
        Duration::from_secs(config.server.status_poll_interval_secs.max(1)),
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            report = poller.changed() => match report {
                Some(report) => {
                    println!();
                    print_report(&output, &report);
                }
                None => {
                    output.warning("Status polling stopped unexpectedly");
                    break;
                }
            },
        }
    }

    poller.shutdown();
    output.status("Stopped watching");
    Ok(())
}

fn print_report(output: &Output, report: &StatusReport) {
    output.kv("Online", &format_flag(report.online, "online", "offline"));
    output.kv(
        "Twilio",
        &format_flag(
            report.twilio.enabled,
            report.twilio.status.as_deref().unwrap_or("enabled"),
            "not configured",
        ),
    );
    if let Some(version) = &report.version {
        output.kv("Version", version);
    }
    if let Some(stats) = &report.stats {
        output.kv("Stats", &stats.to_string());
    }
    if let Some(error) = &report.error {
        output.kv("Error", &error.red().to_string());
    }
    output.kv("Checked", &format_relative_time(report.checked_at));
}
