use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::{ApplicationState, Task, TaskCategory, Vitals, VitalsOverride, VitalsSnapshot};
use crate::error::{CoreError, Result};
use crate::gamification::Rewards;
use crate::kv::{self, KeyValueStore, KeyValueStoreExt, StorageError, StorageKey};

pub const DEFAULT_THEME: &str = "neon";

/// Persistence for the state document and the small per-device values that
/// live next to it
#[derive(Clone)]
pub struct StateStore {
    kv: Arc<dyn KeyValueStore>,
    max_document_bytes: usize,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("max_document_bytes", &self.max_document_bytes)
            .finish_non_exhaustive()
    }
}

impl StateStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, max_document_bytes: usize) -> Self {
        Self {
            kv,
            max_document_bytes,
        }
    }

    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// Load the document: primary key, then the legacy key, then the
    /// built-in default. Unreadable documents count as absent.
    pub fn load(&self) -> ApplicationState {
        let mut state = self
            .read_document(StorageKey::AppState)
            .or_else(|| {
                let legacy = self.read_document(StorageKey::LegacyAppState);
                if legacy.is_some() {
                    tracing::info!("Loaded state from legacy key {}", StorageKey::LegacyAppState);
                }
                legacy
            })
            .unwrap_or_else(|| {
                tracing::info!("No saved state found, starting from the default document");
                ApplicationState::default()
            });

        if state.tasks.is_empty() {
            match self.kv.get_json::<Vec<Task>>(StorageKey::HealthTasks) {
                Ok(Some(tasks)) if !tasks.is_empty() => {
                    tracing::info!("Adopted {} tasks from {}", tasks.len(), StorageKey::HealthTasks);
                    state.tasks = tasks;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Ignoring unreadable legacy task list: {}", e),
            }
        }

        for repair in state.normalize() {
            tracing::warn!("State repaired on load: {}", repair);
        }
        state
    }

    fn read_document(&self, key: StorageKey) -> Option<ApplicationState> {
        match self.kv.get_json::<ApplicationState>(key) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Treating stored document under {} as absent: {}", key, e);
                None
            }
        }
    }

    /// Persist the document. Returns `false` when the stored copy was already
    /// identical and nothing was written.
    pub fn save(&self, state: &ApplicationState) -> std::result::Result<bool, StorageError> {
        let raw = serde_json::to_string(state).map_err(|cause| StorageError::Serialization {
            key: StorageKey::AppState.to_string(),
            cause,
        })?;
        kv::ensure_within_quota(StorageKey::AppState, &raw, self.max_document_bytes)?;

        if let Ok(Some(current)) = self.kv.get(StorageKey::AppState) {
            if current == raw {
                tracing::debug!("State unchanged, skipping save");
                return Ok(false);
            }
        }
        self.kv.set(StorageKey::AppState, &raw)?;
        tracing::debug!("Saved state ({} bytes)", raw.len());
        Ok(true)
    }

    /// Stable per-device identifier, created on first use
    pub fn user_id(&self) -> std::result::Result<String, StorageError> {
        if let Some(id) = self.kv.get_json::<String>(StorageKey::UserId)? {
            return Ok(id);
        }
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(9).collect();
        let id = format!("user_{}_{}", Utc::now().timestamp_millis(), suffix);
        self.kv.set_json(StorageKey::UserId, &id)?;
        tracing::info!("Created user id {}", id);
        Ok(id)
    }

    pub fn theme(&self) -> String {
        match self.kv.get_json::<String>(StorageKey::Theme) {
            Ok(Some(theme)) if !theme.trim().is_empty() => theme,
            Ok(_) => DEFAULT_THEME.to_string(),
            Err(e) => {
                tracing::warn!("Unreadable theme preference: {}", e);
                DEFAULT_THEME.to_string()
            }
        }
    }

    pub fn set_theme(&self, theme: &str) -> std::result::Result<(), StorageError> {
        self.kv.set_json(StorageKey::Theme, theme)
    }

    /// Live vitals written by the vitals editor, if any
    pub fn vitals_override(&self) -> Option<VitalsOverride> {
        self.kv
            .get_json(StorageKey::CurrentVitals)
            .unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable live vitals: {}", e);
                None
            })
    }

    pub fn set_vitals_override(&self, vitals: &VitalsOverride) -> std::result::Result<(), StorageError> {
        self.kv.set_json(StorageKey::CurrentVitals, vitals)
    }
}

/// Result of completing a task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOutcome {
    pub task: Task,
    /// `None` when the task was already complete
    pub rewards: Option<Rewards>,
}

/// Owner of the in-memory document. All mutation goes through [`StateHandle::mutate`],
/// which holds the lock across modify and save.
#[derive(Debug)]
pub struct StateHandle {
    store: StateStore,
    state: Mutex<ApplicationState>,
}

impl StateHandle {
    pub fn open(store: StateStore) -> Self {
        let state = store.load();
        Self {
            store,
            state: Mutex::new(state),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn snapshot(&self) -> ApplicationState {
        self.state.lock().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&ApplicationState) -> R) -> R {
        let guard = self.state.lock();
        f(&*guard)
    }

    /// Apply `f` to a copy of the document and persist it. The in-memory
    /// document only changes once the save succeeds.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut ApplicationState) -> Result<R>) -> Result<R> {
        let mut guard = self.state.lock();
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        self.store.save(&draft)?;
        *guard = draft;
        Ok(out)
    }

    pub fn add_task(&self, name: &str, category: TaskCategory, time: NaiveTime) -> Result<Task> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::invalid_input("name", "Task name must not be empty"));
        }
        self.mutate(|state| {
            let task = Task {
                id: state.next_task_id(),
                name: name.to_string(),
                category,
                completed: false,
                time,
                completed_at: None,
            };
            state.tasks.push(task.clone());
            Ok(task)
        })
    }

    pub fn complete_task(&self, id: u64, today: NaiveDate) -> Result<CompletionOutcome> {
        self.mutate(|state| {
            let idx = state
                .tasks
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| CoreError::task_not_found(id, state.tasks.iter().map(|t| t.id)))?;

            if state.tasks[idx].completed {
                return Ok(CompletionOutcome {
                    task: state.tasks[idx].clone(),
                    rewards: None,
                });
            }

            state.tasks[idx].completed = true;
            state.tasks[idx].completed_at = Some(Utc::now());
            state.last_updated_date = Some(today);

            let task = state.tasks[idx].clone();
            let rewards = state
                .gamification
                .apply_task_completion(&task, &state.tasks, today);
            Ok(CompletionOutcome {
                task,
                rewards: Some(rewards),
            })
        })
    }

    pub fn remove_task(&self, id: u64) -> Result<Task> {
        self.mutate(|state| {
            let idx = state
                .tasks
                .iter()
                .position(|t| t.id == id)
                .ok_or_else(|| CoreError::task_not_found(id, state.tasks.iter().map(|t| t.id)))?;
            Ok(state.tasks.remove(idx))
        })
    }

    /// Record new vitals in the document and as the live snapshot
    pub fn update_vitals(&self, vitals: Vitals) -> Result<()> {
        vitals.validate()?;
        let live = VitalsOverride::from(&vitals);
        self.mutate(|state| {
            state.vitals = vitals;
            Ok(())
        })?;
        self.store.set_vitals_override(&live)?;
        Ok(())
    }

    /// Document vitals with any live values laid over them
    pub fn current_vitals(&self) -> VitalsSnapshot {
        let live = self.store.vitals_override();
        self.read(|state| VitalsSnapshot::merge(&state.vitals, live.as_ref(), Utc::now()))
    }

    pub fn user_id(&self) -> Result<String> {
        Ok(self.store.user_id()?)
    }
}
