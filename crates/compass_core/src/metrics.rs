//! Scores derived from the task list
//!
//! Everything here is a pure function of the tasks: no clock, no storage.

use serde::{Deserialize, Serialize};

use crate::state::Task;

/// Score reported when there are no tasks to judge by
pub const DEFAULT_HEALTH_SCORE: u32 = 85;

/// Completed tasks needed for the daily goal
pub const DAILY_GOAL_TASKS: usize = 3;

const COMPLETION_WEIGHT: f64 = 0.7;
const MEDICATION_WEIGHT: f64 = 0.3;

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// (completed, total) over medication tasks
pub fn medication_progress(tasks: &[Task]) -> (usize, usize) {
    tasks
        .iter()
        .filter(|t| t.is_medication())
        .fold((0, 0), |(done, total), t| {
            (done + usize::from(t.completed), total + 1)
        })
}

fn medication_ratio(tasks: &[Task]) -> f64 {
    match medication_progress(tasks) {
        (_, 0) => 100.0,
        (taken, total) => percent(taken, total),
    }
}

/// 70% overall completion, 30% medication completion, rounded
pub fn health_score(tasks: &[Task]) -> u32 {
    if tasks.is_empty() {
        return DEFAULT_HEALTH_SCORE;
    }
    let completed = tasks.iter().filter(|t| t.completed).count();
    let task_score = percent(completed, tasks.len());
    (task_score * COMPLETION_WEIGHT + medication_ratio(tasks) * MEDICATION_WEIGHT).round() as u32
}

/// Medication adherence in percent; 100 with no medication tasks
pub fn medication_adherence(tasks: &[Task]) -> u32 {
    medication_ratio(tasks).round() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub tasks_completed: usize,
    pub tasks_total: usize,
    pub completion_rate: u32,
    pub daily_goal_achieved: bool,
}

pub fn progress_summary(tasks: &[Task]) -> ProgressSummary {
    let tasks_completed = tasks.iter().filter(|t| t.completed).count();
    ProgressSummary {
        tasks_completed,
        tasks_total: tasks.len(),
        completion_rate: percent(tasks_completed, tasks.len()).round() as u32,
        daily_goal_achieved: tasks_completed >= DAILY_GOAL_TASKS,
    }
}

/// Completed tasks, most recently completed first, as "<name> at <time>"
pub fn recent_activities(tasks: &[Task], limit: usize) -> Vec<String> {
    let mut done: Vec<&Task> = tasks.iter().filter(|t| t.completed).collect();
    // Stable sort: tasks without a completion time keep list order, after timed ones
    done.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    done.into_iter()
        .take(limit)
        .map(|t| format!("{} at {}", t.name, t.time_label()))
        .collect()
}

/// Everything reports need from the task list, computed once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub health_score: u32,
    pub medication_adherence: u32,
    pub progress: ProgressSummary,
    pub meds_taken: usize,
    pub meds_total: usize,
    pub recent_activities: Vec<String>,
}

impl DerivedMetrics {
    /// Number of recent activities carried into reports
    pub const RECENT_ACTIVITY_LIMIT: usize = 3;

    pub fn from_tasks(tasks: &[Task]) -> Self {
        let (meds_taken, meds_total) = medication_progress(tasks);
        Self {
            health_score: health_score(tasks),
            medication_adherence: medication_adherence(tasks),
            progress: progress_summary(tasks),
            meds_taken,
            meds_total,
            recent_activities: recent_activities(tasks, Self::RECENT_ACTIVITY_LIMIT),
        }
    }
}
