use chrono::{Local, NaiveTime, Timelike};
use compass_core::config::CompassConfig;
use compass_core::state::TaskCategory;
use miette::Result;
use owo_colors::OwoColorize;

use crate::commands::open_service;
use crate::output::Output;

pub async fn list(config: &CompassConfig) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;
    let tasks = service.state().read(|state| state.tasks.clone());

    output.section("Today's Tasks");
    if tasks.is_empty() {
        output.status("No tasks scheduled");
        output.status(&format!(
            "Add one with: {} tasks add <name> --time 08:00",
            "compass-cli".bright_green()
        ));
        return Ok(());
    }

    output.table_header(&["ID", "Done", "Time", "Category", "Task"]);
    for task in &tasks {
        let done = if task.completed {
            "✓".bright_green().to_string()
        } else {
            " ".to_string()
        };
        output.table_row(&[
            &format!("{:>2}", task.id),
            &format!(" {done}  "),
            &task.time_label(),
            &format!("{:<10}", task.category),
            &task.name,
        ]);
    }
    Ok(())
}

pub async fn add(config: &CompassConfig, name: &str, category: TaskCategory, time: Option<&str>) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;

    let time = match time {
        Some(text) => parse_time(text)?,
        None => {
            let now = Local::now().time();
            NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(now)
        }
    };
    let task = service.state().add_task(name, category, time)?;

    output.success(&format!(
        "Added task {} at {}",
        task.name.bright_cyan(),
        task.time_label()
    ));
    output.kv("ID", &task.id.to_string());
    Ok(())
}

pub async fn complete(config: &CompassConfig, id: u64) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;

    let outcome = service.complete_task(id)?;
    match outcome.rewards {
        Some(rewards) => {
            output.success(&format!("Completed {}", outcome.task.name.bright_cyan()));
            output.kv(
                "Earned",
                &format!(
                    "+{} XP, +{} coins",
                    rewards.xp_gained.to_string().bright_yellow(),
                    rewards.coins_gained
                ),
            );
            output.kv("Level", &rewards.level.to_string());
            output.kv("Streak", &format!("{} days", rewards.streak));
        }
        None => output.status(&format!("{} was already completed", outcome.task.name)),
    }
    Ok(())
}

pub async fn remove(config: &CompassConfig, id: u64) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;

    let task = service.state().remove_task(id)?;
    output.success(&format!("Removed task {}", task.name.bright_cyan()));
    Ok(())
}

/// Accepts "08:00", "8:00", "08:00 AM" and "8:30pm"
pub fn parse_time(text: &str) -> Result<NaiveTime> {
    let text = text.trim().to_ascii_uppercase();
    let compact = text.replace(' ', "");
    NaiveTime::parse_from_str(&text, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&compact, "%I:%M%p"))
        .map_err(|_| miette::miette!(help = "Use 24-hour HH:MM or 12-hour HH:MM AM/PM", "'{}' is not a time of day", text))
}
