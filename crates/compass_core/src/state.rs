//! Application state document
//!
//! A single JSON document holds the profile, emergency contacts, vitals,
//! tasks and gamification progress. It is loaded, validated and persisted by
//! [`store::StateStore`]; everything else reads it through a
//! [`store::StateHandle`].

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::gamification::Gamification;

pub mod store;

pub use store::{StateHandle, StateStore};

/// Shown wherever a profile value is missing
pub const UNKNOWN: &str = "Unknown";
pub const NOT_SPECIFIED: &str = "Not specified";
pub const NO_MEDICATIONS: &str = "No medications listed";

/// Body temperature (°F) assumed when none has been recorded
pub const DEFAULT_TEMPERATURE_F: f32 = 98.6;

/// The whole persisted client state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationState {
    #[serde(default)]
    pub profile: Profile,

    #[serde(default)]
    pub emergency_contacts: Vec<EmergencyContact>,

    #[serde(default)]
    pub vitals: Vitals,

    #[serde(default)]
    pub tasks: Vec<Task>,

    #[serde(default)]
    pub gamification: Gamification,

    /// Next task id to hand out. Only ever grows.
    #[serde(default = "default_task_counter")]
    pub task_id_counter: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_date: Option<NaiveDate>,
}

fn default_task_counter() -> u64 {
    1
}

/// Patient profile. Optional fields are read through the `*_or_default`
/// accessors so callers never invent their own fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<NaiveDate>,

    /// Free-text list of conditions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<String>,

    /// Free-text emergency contact, e.g. "Avinash Hugar - (555) 123-4567"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,

    #[serde(default)]
    pub medications: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_type: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Profile {
    pub fn name_or_default(&self) -> &str {
        non_blank(&self.name).unwrap_or(UNKNOWN)
    }

    pub fn conditions_or_default(&self) -> &str {
        non_blank(&self.conditions).unwrap_or(NOT_SPECIFIED)
    }

    pub fn emergency_contact_or_default(&self) -> &str {
        non_blank(&self.emergency_contact).unwrap_or(UNKNOWN)
    }

    pub fn blood_type_or_default(&self) -> &str {
        non_blank(&self.blood_type).unwrap_or(UNKNOWN)
    }

    /// Medications joined with `separator`, or the "none listed" text
    pub fn medications_summary(&self, separator: &str) -> String {
        if self.medications.is_empty() {
            NO_MEDICATIONS.to_string()
        } else {
            self.medications.join(separator)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relationship: String,
    #[serde(default, alias = "primary")]
    pub is_primary: bool,
    #[serde(default, alias = "whatsapp")]
    pub supports_whatsapp: bool,
}

impl EmergencyContact {
    /// The two contacts every new profile starts with
    pub fn defaults() -> Vec<EmergencyContact> {
        vec![
            EmergencyContact {
                name: "Avinash Hugar".to_string(),
                phone: "(555) 123-4567".to_string(),
                relationship: "Primary Emergency Contact".to_string(),
                is_primary: true,
                supports_whatsapp: true,
            },
            EmergencyContact {
                name: "Dr. Sharma".to_string(),
                phone: "(555) 987-6543".to_string(),
                relationship: "Primary Physician".to_string(),
                is_primary: false,
                supports_whatsapp: false,
            },
        ]
    }
}

/// Last recorded vitals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    /// Heart rate, beats/min
    pub hr: u32,
    /// Blood pressure as "systolic/diastolic"
    pub bp: String,
    /// Blood glucose, mg/dL
    #[serde(alias = "glucose")]
    pub bg: u32,
    /// Oxygen saturation, %
    pub spo2: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            hr: 72,
            bp: "130/80".to_string(),
            bg: 105,
            spo2: 97,
            temperature: None,
        }
    }
}

impl Vitals {
    /// Reject readings that cannot be sent to a clinician as-is
    pub fn validate(&self) -> Result<(), CoreError> {
        if parse_blood_pressure(&self.bp).is_none() {
            return Err(CoreError::invalid_input(
                "bp",
                format!("'{}' is not in systolic/diastolic form, e.g. 120/80", self.bp),
            ));
        }
        if !(20..=250).contains(&self.hr) {
            return Err(CoreError::invalid_input(
                "hr",
                format!("{} beats/min is outside 20-250", self.hr),
            ));
        }
        if self.spo2 > 100 {
            return Err(CoreError::invalid_input(
                "spo2",
                format!("{}% is over 100%", self.spo2),
            ));
        }
        Ok(())
    }
}

/// Split "120/80" into (systolic, diastolic)
pub fn parse_blood_pressure(bp: &str) -> Option<(u32, u32)> {
    let (sys, dia) = bp.trim().split_once('/')?;
    Some((sys.trim().parse().ok()?, dia.trim().parse().ok()?))
}

/// Partial live vitals written by the vitals editor. Any field left empty
/// falls back to the document's [`Vitals`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalsOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hr: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bp: Option<String>,
    #[serde(default, alias = "glucose", skip_serializing_if = "Option::is_none")]
    pub bg: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl From<&Vitals> for VitalsOverride {
    fn from(vitals: &Vitals) -> Self {
        Self {
            hr: Some(vitals.hr),
            bp: Some(vitals.bp.clone()),
            bg: Some(vitals.bg),
            spo2: Some(vitals.spo2),
            temperature: vitals.temperature,
        }
    }
}

/// Vitals as sent in alerts and reports, stamped with when they were read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsSnapshot {
    pub hr: u32,
    pub bp: String,
    pub bg: u32,
    pub spo2: u32,
    pub temperature: f32,
    pub timestamp: DateTime<Utc>,
}

impl VitalsSnapshot {
    pub fn merge(base: &Vitals, live: Option<&VitalsOverride>, timestamp: DateTime<Utc>) -> Self {
        let live = live.cloned().unwrap_or_default();
        Self {
            hr: live.hr.unwrap_or(base.hr),
            bp: live.bp.unwrap_or_else(|| base.bp.clone()),
            bg: live.bg.unwrap_or(base.bg),
            spo2: live.spo2.unwrap_or(base.spo2),
            temperature: live
                .temperature
                .or(base.temperature)
                .unwrap_or(DEFAULT_TEMPERATURE_F),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Medication,
    Activity,
    Vitals,
    #[serde(other)]
    Other,
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskCategory::Medication => "medication",
            TaskCategory::Activity => "activity",
            TaskCategory::Vitals => "vitals",
            TaskCategory::Other => "other",
        };
        f.write_str(name)
    }
}

impl FromStr for TaskCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "medication" | "med" | "meds" => Ok(TaskCategory::Medication),
            "activity" | "exercise" => Ok(TaskCategory::Activity),
            "vitals" => Ok(TaskCategory::Vitals),
            "other" => Ok(TaskCategory::Other),
            other => Err(CoreError::invalid_input(
                "category",
                format!("'{other}' is not one of medication, activity, vitals, other"),
            )),
        }
    }
}

/// A scheduled daily task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    #[serde(alias = "title")]
    pub name: String,
    #[serde(alias = "type")]
    pub category: TaskCategory,
    #[serde(default, alias = "isChecked")]
    pub completed: bool,
    /// Scheduled time of day
    #[serde(default)]
    pub time: NaiveTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_medication(&self) -> bool {
        self.category == TaskCategory::Medication
    }

    /// "08:00 AM" style label
    pub fn time_label(&self) -> String {
        self.time.format("%I:%M %p").to_string()
    }
}

fn seed_task(id: u64, name: &str, category: TaskCategory, hour: u32, minute: u32) -> Task {
    Task {
        id,
        name: name.to_string(),
        category,
        completed: false,
        time: NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default(),
        completed_at: None,
    }
}

impl Default for ApplicationState {
    /// Example document used on first launch
    fn default() -> Self {
        Self {
            profile: Profile {
                name: Some("Rohan Choure".to_string()),
                dob: NaiveDate::from_ymd_opt(1975, 5, 15),
                conditions: Some("Hypertension, Type 2 Diabetes".to_string()),
                emergency_contact: Some("Avinash Hugar - (555) 123-4567".to_string()),
                medications: vec![
                    "Aspirin 75mg".to_string(),
                    "Metformin 500mg".to_string(),
                    "Lisinopril 10mg".to_string(),
                ],
                blood_type: Some("O+".to_string()),
            },
            emergency_contacts: EmergencyContact::defaults(),
            vitals: Vitals::default(),
            tasks: vec![
                seed_task(1, "Take Blood Pressure", TaskCategory::Vitals, 8, 0),
                seed_task(2, "Check Blood Glucose", TaskCategory::Vitals, 8, 30),
                seed_task(3, "Take Morning Medication", TaskCategory::Medication, 9, 0),
                seed_task(4, "30 min Walk/Exercise", TaskCategory::Activity, 17, 0),
                seed_task(5, "Take Evening Medication", TaskCategory::Medication, 20, 0),
            ],
            gamification: Gamification::seeded(Local::now().date_naive()),
            task_id_counter: 6,
            last_updated_date: None,
        }
    }
}

impl ApplicationState {
    /// The contact flagged primary, or the first one if none is
    pub fn primary_contact(&self) -> Option<&EmergencyContact> {
        self.emergency_contacts
            .iter()
            .find(|c| c.is_primary)
            .or_else(|| self.emergency_contacts.first())
    }

    pub fn task(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Hand out the next task id
    pub fn next_task_id(&mut self) -> u64 {
        let id = self.task_id_counter;
        self.task_id_counter += 1;
        id
    }

    /// Repair a freshly loaded document so the invariants hold from here on.
    /// Returns a description of every repair made.
    pub fn normalize(&mut self) -> Vec<String> {
        let mut repairs = Vec::new();

        if self.emergency_contacts.is_empty() {
            self.emergency_contacts = EmergencyContact::defaults();
            repairs.push("filled empty emergency contacts with defaults".to_string());
        }

        let mut seen_primary = false;
        for contact in self.emergency_contacts.iter_mut() {
            if contact.is_primary {
                if seen_primary {
                    contact.is_primary = false;
                    repairs.push(format!("cleared extra primary flag on {}", contact.name));
                }
                seen_primary = true;
            }
        }

        let mut ids = HashSet::new();
        let mut duplicates = Vec::new();
        for (idx, task) in self.tasks.iter().enumerate() {
            if !ids.insert(task.id) {
                duplicates.push(idx);
            }
        }
        let max_id = self.tasks.iter().map(|t| t.id).max().unwrap_or(0);
        if self.task_id_counter <= max_id {
            repairs.push(format!(
                "raised task id counter from {} to {}",
                self.task_id_counter,
                max_id + 1
            ));
            self.task_id_counter = max_id + 1;
        }
        for idx in duplicates {
            let fresh = self.next_task_id();
            repairs.push(format!(
                "reassigned duplicate task id {} to {}",
                self.tasks[idx].id, fresh
            ));
            self.tasks[idx].id = fresh;
        }

        repairs.extend(self.gamification.normalize());
        repairs
    }
}
