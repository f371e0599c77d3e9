//! Levels, streaks, coins and badges

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::metrics;
use crate::state::{Task, TaskCategory};

/// Cumulative XP at which each level starts
pub const LEVEL_THRESHOLDS: [u32; 11] = [0, 100, 250, 500, 800, 1200, 1700, 2300, 3000, 4000, 5000];
pub const MAX_LEVEL: u32 = 10;

pub const XP_PER_TASK: u32 = 10;
pub const XP_PER_MEDICATION: u32 = 15;
pub const COINS_PER_TASK: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub id: &'static str,
    pub name: &'static str,
    pub rarity: Rarity,
}

pub const BADGE_CATALOG: &[Badge] = &[
    Badge { id: "first-checkin", name: "First Check-in", rarity: Rarity::Common },
    Badge { id: "streak-3", name: "3-Day Streak", rarity: Rarity::Common },
    Badge { id: "streak-7", name: "Weekly Warrior", rarity: Rarity::Uncommon },
    Badge { id: "streak-14", name: "Fortnight Champion", rarity: Rarity::Rare },
    Badge { id: "streak-30", name: "Monthly Master", rarity: Rarity::Epic },
    Badge { id: "task-master", name: "Task Master", rarity: Rarity::Uncommon },
    Badge { id: "vitals-pro", name: "Vitals Pro", rarity: Rarity::Uncommon },
    Badge { id: "medication-adherent", name: "Medication Adherent", rarity: Rarity::Rare },
    Badge { id: "level-5", name: "Level 5 Achiever", rarity: Rarity::Uncommon },
    Badge { id: "level-10", name: "Level 10 Master", rarity: Rarity::Rare },
    Badge { id: "health-champion", name: "Health Champion", rarity: Rarity::Legendary },
];

const CHAMPION_BADGE: &str = "health-champion";

pub fn badge(id: &str) -> Option<&'static Badge> {
    BADGE_CATALOG.iter().find(|b| b.id == id)
}

/// Progress stored in the state document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gamification {
    pub level: u32,
    /// XP earned within the current level
    pub xp: u32,
    pub streak: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_date: Option<NaiveDate>,
    #[serde(default)]
    pub badges: BTreeSet<String>,
    #[serde(default)]
    pub health_coins: u32,
}

impl Default for Gamification {
    fn default() -> Self {
        Self {
            level: 1,
            xp: 0,
            streak: 0,
            last_activity_date: None,
            badges: BTreeSet::new(),
            health_coins: 0,
        }
    }
}

/// What a single task completion earned
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Rewards {
    pub xp_gained: u32,
    pub coins_gained: u32,
    pub levels_gained: u32,
    pub level: u32,
    pub streak: u32,
    pub new_badges: Vec<String>,
}

impl Gamification {
    /// Example progress for a brand-new document
    pub fn seeded(today: NaiveDate) -> Self {
        Self {
            level: 5,
            xp: 150,
            streak: 3,
            last_activity_date: Some(today),
            badges: ["first-checkin", "streak-3"]
                .into_iter()
                .map(String::from)
                .collect(),
            health_coins: 25,
        }
    }

    /// XP still needed to leave the current level, `None` at max level
    pub fn xp_to_next_level(&self) -> Option<u32> {
        if self.level >= MAX_LEVEL {
            return None;
        }
        let idx = self.level as usize;
        let span = LEVEL_THRESHOLDS[idx] - LEVEL_THRESHOLDS[idx - 1];
        Some(span.saturating_sub(self.xp))
    }

    /// Add XP, levelling up as many times as it covers. Returns levels gained.
    pub fn award_xp(&mut self, amount: u32) -> u32 {
        self.xp = self.xp.saturating_add(amount);
        let mut gained = 0;
        while self.level < MAX_LEVEL {
            let idx = self.level as usize;
            let span = LEVEL_THRESHOLDS[idx] - LEVEL_THRESHOLDS[idx - 1];
            if self.xp < span {
                break;
            }
            self.xp -= span;
            self.level += 1;
            gained += 1;
        }
        gained
    }

    /// Count `today` towards the streak: same day is a no-op, the next day
    /// extends it, any gap restarts it at 1
    pub fn record_activity(&mut self, today: NaiveDate) {
        match self.last_activity_date {
            Some(last) if last == today => return,
            Some(last) if last.succ_opt() == Some(today) => {
                self.streak = self.streak.saturating_add(1);
            }
            _ => self.streak = 1,
        }
        self.last_activity_date = Some(today);
    }

    /// Grant a catalog badge. Returns false for unknown or already-held ids.
    pub fn award_badge(&mut self, id: &str) -> bool {
        badge(id).is_some() && self.badges.insert(id.to_string())
    }

    /// Clamp the level and drop badges that are not in the catalog
    pub fn normalize(&mut self) -> Vec<String> {
        let mut repairs = Vec::new();
        if !(1..=MAX_LEVEL).contains(&self.level) {
            let clamped = self.level.clamp(1, MAX_LEVEL);
            repairs.push(format!("clamped level {} to {}", self.level, clamped));
            self.level = clamped;
        }
        let unknown: Vec<String> = self
            .badges
            .iter()
            .filter(|id| badge(id).is_none())
            .cloned()
            .collect();
        for id in unknown {
            self.badges.remove(&id);
            repairs.push(format!("dropped unknown badge '{id}'"));
        }
        repairs
    }

    /// Apply the rewards for completing `task`. `tasks` is the list after the
    /// completion was recorded.
    pub fn apply_task_completion(&mut self, task: &Task, tasks: &[Task], today: NaiveDate) -> Rewards {
        self.record_activity(today);

        let xp_gained = if task.is_medication() {
            XP_PER_MEDICATION
        } else {
            XP_PER_TASK
        };
        let levels_gained = self.award_xp(xp_gained);
        self.health_coins = self.health_coins.saturating_add(COINS_PER_TASK);

        let mut earned = Vec::new();
        let mut grant = |g: &mut Gamification, id: &str| {
            if g.award_badge(id) {
                earned.push(id.to_string());
            }
        };

        grant(self, "first-checkin");
        for (days, id) in [(3, "streak-3"), (7, "streak-7"), (14, "streak-14"), (30, "streak-30")] {
            if self.streak >= days {
                grant(self, id);
            }
        }
        if self.level >= 5 {
            grant(self, "level-5");
        }
        if self.level >= MAX_LEVEL {
            grant(self, "level-10");
        }
        if metrics::progress_summary(tasks).daily_goal_achieved {
            grant(self, "task-master");
        }
        let (meds_taken, meds_total) = metrics::medication_progress(tasks);
        if meds_total > 0 && meds_taken == meds_total {
            grant(self, "medication-adherent");
        }
        let vitals: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.category == TaskCategory::Vitals)
            .collect();
        if !vitals.is_empty() && vitals.iter().all(|t| t.completed) {
            grant(self, "vitals-pro");
        }
        let others_held = BADGE_CATALOG
            .iter()
            .filter(|b| b.id != CHAMPION_BADGE)
            .all(|b| self.badges.contains(b.id));
        if others_held {
            grant(self, CHAMPION_BADGE);
        }

        Rewards {
            xp_gained,
            coins_gained: COINS_PER_TASK,
            levels_gained,
            level: self.level,
            streak: self.streak,
            new_badges: earned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use pretty_assertions::assert_eq;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn task(id: u64, category: TaskCategory, completed: bool) -> Task {
        Task {
            id,
            name: format!("task {id}"),
            category,
            completed,
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            completed_at: None,
        }
    }

    #[test]
    fn test_catalog_ids_are_unique() {
        let ids: BTreeSet<&str> = BADGE_CATALOG.iter().map(|b| b.id).collect();
        assert_eq!(ids.len(), BADGE_CATALOG.len());
        assert_eq!(badge("streak-7").unwrap().name, "Weekly Warrior");
    }

    #[test]
    fn test_award_xp_levels_up_across_spans() {
        let mut g = Gamification::default();
        // Level 1 spans 100 XP, level 2 spans 150
        assert_eq!(g.award_xp(260), 2);
        assert_eq!(g.level, 3);
        assert_eq!(g.xp, 10);
        assert_eq!(g.xp_to_next_level(), Some(240));
    }

    #[test]
    fn test_award_xp_caps_at_max_level() {
        let mut g = Gamification {
            level: MAX_LEVEL,
            ..Default::default()
        };
        assert_eq!(g.award_xp(10_000), 0);
        assert_eq!(g.level, MAX_LEVEL);
        assert_eq!(g.xp_to_next_level(), None);
    }

    #[test]
    fn test_counters_saturate_instead_of_overflowing() {
        let mut g = Gamification {
            level: MAX_LEVEL,
            xp: u32::MAX - 5,
            streak: u32::MAX,
            last_activity_date: Some(date(9)),
            health_coins: u32::MAX,
            ..Default::default()
        };
        let tasks = vec![task(1, TaskCategory::Activity, true)];

        let rewards = g.apply_task_completion(&tasks[0], &tasks, date(10));
        assert_eq!(rewards.levels_gained, 0);
        assert_eq!(g.xp, u32::MAX);
        assert_eq!(g.streak, u32::MAX);
        assert_eq!(g.health_coins, u32::MAX);
    }

    #[test]
    fn test_streak_rules() {
        let mut g = Gamification::default();
        g.record_activity(date(1));
        assert_eq!(g.streak, 1);
        g.record_activity(date(1));
        assert_eq!(g.streak, 1);
        g.record_activity(date(2));
        assert_eq!(g.streak, 2);
        g.record_activity(date(5));
        assert_eq!(g.streak, 1);
    }

    #[test]
    fn test_unknown_badges_are_refused_and_dropped() {
        let mut g = Gamification::default();
        assert!(!g.award_badge("space-cadet"));
        g.badges.insert("space-cadet".to_string());
        g.level = 0;
        let repairs = g.normalize();
        assert_eq!(repairs.len(), 2);
        assert!(g.badges.is_empty());
        assert_eq!(g.level, 1);
    }

    #[test]
    fn test_completion_rewards() {
        let mut g = Gamification::default();
        let tasks = vec![
            task(1, TaskCategory::Medication, true),
            task(2, TaskCategory::Vitals, true),
            task(3, TaskCategory::Activity, false),
        ];
        let rewards = g.apply_task_completion(&tasks[0], &tasks, date(10));
        assert_eq!(rewards.xp_gained, XP_PER_MEDICATION);
        assert_eq!(rewards.coins_gained, 1);
        assert_eq!(g.health_coins, 1);
        assert_eq!(
            rewards.new_badges,
            vec![
                "first-checkin".to_string(),
                "medication-adherent".to_string(),
                "vitals-pro".to_string(),
            ]
        );

        // Same badges are not granted twice
        let again = g.apply_task_completion(&tasks[1], &tasks, date(10));
        assert!(again.new_badges.is_empty());
        assert_eq!(g.streak, 1);
    }
}
