use compass_core::config::CompassConfig;
use miette::Result;
use owo_colors::OwoColorize;

use crate::commands::open_service;
use crate::output::{Output, format_relative_time};

pub async fn list(config: &CompassConfig) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;
    let pending = service.pending().list();

    output.section("Pending Reports");
    if pending.is_empty() {
        output.status("Nothing waiting to be sent");
        return Ok(());
    }

    output.success(&format!("{} report(s) waiting:", pending.len()));
    println!();
    for entry in &pending {
        output.info(
            "•",
            &format!("{} report for {}", entry.report_type.title().bright_cyan(), entry.recipient),
        );
        output.kv("Saved", &format_relative_time(entry.timestamp));
        output.kv(
            "Summary",
            &format!(
                "score {}, {} tasks done, {}% adherence",
                entry.data.health_score, entry.data.tasks_completed, entry.data.medication_adherence
            ),
        );
        if entry.payload.is_none() {
            output.warning("No payload saved, this entry cannot be resent");
        }
    }
    println!();
    output.status(&format!(
        "Resend with: {} pending flush",
        "compass-cli".bright_green()
    ));
    Ok(())
}

pub async fn flush(config: &CompassConfig) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;

    output.section("Resending Pending Reports");
    if service.pending().is_empty() {
        output.status("Nothing waiting to be sent");
        return Ok(());
    }

    let summary = service.flush_pending_reports().await?;
    output.kv("Sent", &summary.sent.to_string().bright_green().to_string());
    output.kv("Still waiting", &summary.requeued.to_string());
    output.kv("Dropped", &summary.dropped.to_string());
    Ok(())
}
