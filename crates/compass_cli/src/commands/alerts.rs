use std::sync::Arc;

use compass_core::ReportType;
use compass_core::config::CompassConfig;
use compass_core::countdown::SosCountdown;
use compass_core::service::ActionOutcome;
use miette::Result;
use owo_colors::OwoColorize;

use crate::commands::open_service;
use crate::output::Output;

/// Send an SOS alert, after a cancellable countdown unless `now` is set
pub async fn sos(config: &CompassConfig, now: bool, location: Option<String>) -> Result<()> {
    let output = Output::new();
    let service = Arc::new(open_service(config, location)?);

    output.section("SOS Emergency Alert");

    if now || config.sos.countdown_secs == 0 {
        let outcome = service.send_sos_alert().await;
        print_outcome(&output, &outcome);
        return Ok(());
    }

    output.status("Press Ctrl-C to cancel");
    let sender = service.clone();
    let handle = SosCountdown::start(
        config.sos.countdown_secs,
        move |left| output.warning(&format!("Sending SOS in {}...", left.to_string().bold())),
        move || async move { sender.send_sos_alert().await },
    );

    let canceller = handle.canceller();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let result = handle.wait().await;
    interrupt.abort();

    match result {
        Some(outcome) => print_outcome(&output, &outcome),
        None => output.success("SOS cancelled, nothing was sent"),
    }
    Ok(())
}

pub async fn report(config: &CompassConfig, report_type: ReportType) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;

    output.section(&format!("{} Health Report", report_type.title()));
    let outcome = service.send_health_report(report_type).await;
    print_outcome(&output, &outcome);
    if outcome.queued {
        output.status(&format!(
            "Resend later with: {} pending flush",
            "compass-cli".bright_green()
        ));
    }
    Ok(())
}

pub async fn test_twilio(config: &CompassConfig, number: Option<String>) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;

    output.section("Twilio Test");
    let outcome = service.test_twilio_connection(number).await?;
    print_outcome(&output, &outcome);
    Ok(())
}

fn print_outcome(output: &Output, outcome: &ActionOutcome) {
    println!();
    if outcome.success {
        output.success(&outcome.message);
    } else {
        output.error(&outcome.message);
    }

    if let Some(fallback) = &outcome.fallback {
        output.kv("Fallback", &fallback.message);
        output.kv("Phone", &fallback.phone);
        for action in &fallback.actions {
            output.list_item(action);
        }
        if fallback.used_emergency_number {
            output.warning("No contact number on file, used the emergency number");
        }
    }

    if let Some(details) = &outcome.details {
        if let Ok(pretty) = serde_json::to_string_pretty(details) {
            output.kv("Details", "");
            for line in pretty.lines() {
                println!("    {}", line.dimmed());
            }
        }
    }
}
