//! Health reports that could not reach the server, kept for a manual resend

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::compose::{HealthReport, ReportType};
use crate::kv::{KeyValueStore, KeyValueStoreExt, StorageError, StorageKey};
use crate::metrics::DerivedMetrics;

/// Headline numbers at the time the report was archived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSummary {
    pub health_score: u32,
    pub tasks_completed: usize,
    pub medication_adherence: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingReport {
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub recipient: String,
    pub timestamp: DateTime<Utc>,
    pub data: PendingSummary,
    /// The exact body that failed to send. Older entries carry none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<HealthReport>,
}

impl PendingReport {
    pub fn new(report: HealthReport, recipient: impl Into<String>, metrics: &DerivedMetrics) -> Self {
        Self {
            report_type: report.report_type,
            recipient: recipient.into(),
            timestamp: Utc::now(),
            data: PendingSummary {
                health_score: metrics.health_score,
                tasks_completed: metrics.progress.tasks_completed,
                medication_adherence: metrics.medication_adherence,
            },
            payload: Some(report),
        }
    }
}

/// The `pendingReports` queue. The lock is held across read-modify-write.
pub struct PendingReports {
    kv: Arc<dyn KeyValueStore>,
    lock: Mutex<()>,
}

impl std::fmt::Debug for PendingReports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingReports").finish_non_exhaustive()
    }
}

impl PendingReports {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Vec<PendingReport> {
        match self.kv.get_json::<Vec<PendingReport>>(StorageKey::PendingReports) {
            Ok(reports) => reports.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Pending reports are unreadable, treating queue as empty: {}", e);
                Vec::new()
            }
        }
    }

    pub fn push(&self, report: PendingReport) -> Result<usize, StorageError> {
        let _guard = self.lock.lock();
        let mut reports = self.read();
        reports.push(report);
        self.kv.set_json(StorageKey::PendingReports, &reports)?;
        tracing::info!("Report saved locally for later sending ({} pending)", reports.len());
        Ok(reports.len())
    }

    pub fn list(&self) -> Vec<PendingReport> {
        let _guard = self.lock.lock();
        self.read()
    }

    pub fn len(&self) -> usize {
        self.list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the first entry equal to `report`. Returns false when it is
    /// already gone.
    pub fn remove(&self, report: &PendingReport) -> Result<bool, StorageError> {
        let _guard = self.lock.lock();
        let mut reports = self.read();
        let Some(idx) = reports.iter().position(|r| r == report) else {
            return Ok(false);
        };
        reports.remove(idx);
        if reports.is_empty() {
            self.kv.remove(StorageKey::PendingReports)?;
        } else {
            self.kv.set_json(StorageKey::PendingReports, &reports)?;
        }
        Ok(true)
    }
}
