use compass_core::config::CompassConfig;
use compass_core::gamification::{self, MAX_LEVEL};
use compass_core::metrics::DerivedMetrics;
use miette::Result;
use owo_colors::OwoColorize;

use crate::commands::open_service;
use crate::output::{Output, format_flag};

pub async fn show(config: &CompassConfig) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;
    let state = service.state().snapshot();
    let profile = &state.profile;

    output.section("Patient Profile");
    output.kv("Name", &profile.name_or_default().bright_cyan().to_string());
    if let Some(dob) = profile.dob {
        output.kv("Date of birth", &dob.to_string());
    }
    output.kv("Blood type", profile.blood_type_or_default());
    output.kv("Conditions", profile.conditions_or_default());
    output.kv("Medications", &profile.medications_summary(", "));
    output.kv("Emergency contact", profile.emergency_contact_or_default());

    output.section("Emergency Contacts");
    for contact in &state.emergency_contacts {
        let marker = if contact.is_primary { " (primary)" } else { "" };
        output.info("•", &format!("{}{}", contact.name.bright_cyan(), marker.dimmed()));
        output.kv("Phone", &contact.phone);
        if !contact.relationship.is_empty() {
            output.kv("Relationship", &contact.relationship);
        }
        output.kv("WhatsApp", &format_flag(contact.supports_whatsapp, "yes", "no"));
    }

    match service.state().user_id() {
        Ok(id) => output.kv("User ID", &id.dimmed().to_string()),
        Err(e) => output.warning(&format!("No user id: {}", e)),
    }
    Ok(())
}

/// Health score, adherence and gamification progress
pub async fn score(config: &CompassConfig) -> Result<()> {
    let output = Output::new();
    let service = open_service(config, None)?;
    let state = service.state().snapshot();
    let metrics = DerivedMetrics::from_tasks(&state.tasks);
    let progress = &state.gamification;

    output.section("Health Score");
    output.kv("Score", &metrics.health_score.to_string().bright_green().bold().to_string());
    output.kv(
        "Medication adherence",
        &format!(
            "{}% ({}/{} taken)",
            metrics.medication_adherence, metrics.meds_taken, metrics.meds_total
        ),
    );
    output.kv(
        "Tasks",
        &format!(
            "{}/{} done ({}%)",
            metrics.progress.tasks_completed,
            metrics.progress.tasks_total,
            metrics.progress.completion_rate
        ),
    );
    output.kv(
        "Daily goal",
        &format_flag(metrics.progress.daily_goal_achieved, "achieved", "not yet"),
    );

    output.section("Progress");
    output.kv("Level", &format!("{} / {}", progress.level, MAX_LEVEL));
    match progress.xp_to_next_level() {
        Some(left) => output.kv("XP", &format!("{} ({} to next level)", progress.xp, left)),
        None => output.kv("XP", &format!("{} (max level)", progress.xp)),
    }
    output.kv("Streak", &format!("{} days", progress.streak));
    output.kv("Health coins", &progress.health_coins.to_string());

    if progress.badges.is_empty() {
        output.kv("Badges", "none yet");
    } else {
        output.kv("Badges", "");
        for id in &progress.badges {
            match gamification::badge(id) {
                Some(badge) => output.list_item(&format!("{} ({:?})", badge.name, badge.rarity)),
                None => output.list_item(id),
            }
        }
    }

    if !metrics.recent_activities.is_empty() {
        output.section("Recent Activity");
        for activity in &metrics.recent_activities {
            output.list_item(activity);
        }
    }
    Ok(())
}
