//! Request bodies for SOS alerts and health reports
//!
//! Composition is pure: the caller gathers the user id, location and vitals
//! snapshot first and passes them in. Missing profile fields are replaced by
//! the defaults on [`Profile`](crate::state::Profile).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::metrics::DerivedMetrics;
use crate::state::{ApplicationState, EmergencyContact, VitalsSnapshot};

pub const NO_RECENT_ACTIVITIES: &str = "No recent activities";
pub const DEFAULT_RECIPIENT: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosAlert {
    pub patient_name: String,
    pub patient_id: String,
    /// Free-text contact line from the profile
    pub emergency_contact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_contact: Option<EmergencyContact>,
    pub location: String,
    pub vitals: VitalsSnapshot,
    pub additional_info: AdditionalInfo,
    pub additional_contacts: Vec<EmergencyContact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalInfo {
    pub conditions: String,
    pub medications: Vec<String>,
    pub blood_type: String,
}

pub fn compose_sos_alert(
    state: &ApplicationState,
    user_id: &str,
    location: String,
    vitals: VitalsSnapshot,
) -> SosAlert {
    let profile = &state.profile;
    SosAlert {
        patient_name: profile.name_or_default().to_string(),
        patient_id: user_id.to_string(),
        emergency_contact: profile.emergency_contact_or_default().to_string(),
        primary_contact: state.primary_contact().cloned(),
        location,
        vitals,
        additional_info: AdditionalInfo {
            conditions: profile.conditions_or_default().to_string(),
            medications: profile.medications.clone(),
            blood_type: profile.blood_type_or_default().to_string(),
        },
        additional_contacts: state.emergency_contacts.clone(),
    }
}

/// Who a health report is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Family,
    Doctor,
}

impl ReportType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReportType::Family => "family",
            ReportType::Doctor => "doctor",
        }
    }

    /// "Family" / "Doctor", for notification titles
    pub const fn title(&self) -> &'static str {
        match self {
            ReportType::Family => "Family",
            ReportType::Doctor => "Doctor",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "family" => Ok(ReportType::Family),
            "doctor" => Ok(ReportType::Doctor),
            other => Err(CoreError::invalid_input(
                "report type",
                format!("'{other}' is not a report type, use 'family' or 'doctor'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub patient_name: String,
    pub report: ReportBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportBody {
    pub hr: u32,
    pub bp: String,
    pub bg: u32,
    pub spo2: u32,
    pub score: u32,
    pub level: u32,
    pub streak: u32,
    pub tasks_completed: usize,
    pub tasks_total: usize,
    pub meds_taken: usize,
    pub meds_total: usize,
    /// Newline-separated, most recent first
    pub recent_activities: String,
    pub medications: String,
    pub conditions: String,
}

pub fn compose_health_report(
    report_type: ReportType,
    state: &ApplicationState,
    vitals: &VitalsSnapshot,
    metrics: &DerivedMetrics,
) -> HealthReport {
    let recent_activities = if metrics.recent_activities.is_empty() {
        NO_RECENT_ACTIVITIES.to_string()
    } else {
        metrics.recent_activities.join("\n")
    };

    HealthReport {
        report_type,
        patient_name: state.profile.name_or_default().to_string(),
        report: ReportBody {
            hr: vitals.hr,
            bp: vitals.bp.clone(),
            bg: vitals.bg,
            spo2: vitals.spo2,
            score: metrics.health_score,
            level: state.gamification.level,
            streak: state.gamification.streak,
            tasks_completed: metrics.progress.tasks_completed,
            tasks_total: metrics.progress.tasks_total,
            meds_taken: metrics.meds_taken,
            meds_total: metrics.meds_total,
            recent_activities,
            medications: state.profile.medications_summary(", "),
            conditions: state.profile.conditions_or_default().to_string(),
        },
    }
}

/// Name of the contact a report is addressed to
pub fn recipient_for(report_type: ReportType, contacts: &[EmergencyContact]) -> String {
    let found = match report_type {
        ReportType::Family => contacts
            .iter()
            .find(|c| c.is_primary)
            .or_else(|| contacts.first()),
        ReportType::Doctor => contacts.iter().find(|c| {
            let relationship = c.relationship.to_ascii_lowercase();
            relationship.contains("physician") || relationship.contains("doctor")
        }),
    };
    found
        .map(|c| c.name.clone())
        .unwrap_or_else(|| DEFAULT_RECIPIENT.to_string())
}
