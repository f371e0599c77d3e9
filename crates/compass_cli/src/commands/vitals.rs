use compass_core::config::CompassConfig;
use compass_core::state::Vitals;
use miette::Result;
use owo_colors::OwoColorize;

use crate::commands::open_service;
use crate::output::{Output, format_relative_time};

/// Readings given on the command line; anything left out keeps its current value
#[derive(Debug, Default)]
pub struct VitalsInput {
    pub hr: Option<u32>,
    pub bp: Option<String>,
    pub bg: Option<u32>,
    pub spo2: Option<u32>,
    pub temperature: Option<f32>,
}

pub async fn show(config: &CompassConfig) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;
    let vitals = service.state().current_vitals();

    output.section("Current Vitals");
    output.kv("Heart rate", &format!("{} bpm", vitals.hr.to_string().bright_white()));
    output.kv("Blood pressure", &format!("{} mmHg", vitals.bp.bright_white()));
    output.kv("Blood glucose", &format!("{} mg/dL", vitals.bg.to_string().bright_white()));
    output.kv("SpO2", &format!("{}%", vitals.spo2.to_string().bright_white()));
    output.kv("Temperature", &format!("{:.1}°F", vitals.temperature));
    output.kv("Read", &format_relative_time(vitals.timestamp));
    Ok(())
}

pub async fn set(config: &CompassConfig, input: VitalsInput) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;

    if input.hr.is_none()
        && input.bp.is_none()
        && input.bg.is_none()
        && input.spo2.is_none()
        && input.temperature.is_none()
    {
        output.warning("Nothing to update, pass at least one of --hr --bp --bg --spo2 --temperature");
        return Ok(());
    }

    let current = service.state().current_vitals();
    let vitals = Vitals {
        hr: input.hr.unwrap_or(current.hr),
        bp: input.bp.unwrap_or(current.bp),
        bg: input.bg.unwrap_or(current.bg),
        spo2: input.spo2.unwrap_or(current.spo2),
        temperature: Some(input.temperature.unwrap_or(current.temperature)),
    };
    service.state().update_vitals(vitals)?;

    output.success("Vitals updated");
    show(config).await
}
