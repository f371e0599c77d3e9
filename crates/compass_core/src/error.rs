use miette::Diagnostic;
use thiserror::Error;

use crate::kv::StorageError;

#[derive(Error, Diagnostic, Debug)]
pub enum CoreError {
    /// Local store read/write failure
    #[error(transparent)]
    #[diagnostic(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid input for {field}")]
    #[diagnostic(code(compass_core::invalid_input), help("{reason}"))]
    InvalidInput { field: String, reason: String },

    #[error("Task not found")]
    #[diagnostic(
        code(compass_core::task_not_found),
        help("No task with id {id}. Known task ids: {known}")
    )]
    TaskNotFound { id: u64, known: String },

    #[error("Configuration error")]
    #[diagnostic(
        code(compass_core::configuration_error),
        help("Check configuration file at {config_path}")
    )]
    ConfigurationError {
        config_path: String,
        field: String,
        expected: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn task_not_found(id: u64, known_ids: impl IntoIterator<Item = u64>) -> Self {
        let known = known_ids
            .into_iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>();
        Self::TaskNotFound {
            id,
            known: if known.is_empty() {
                "none".to_string()
            } else {
                known.join(", ")
            },
        }
    }

    pub fn configuration(
        config_path: impl Into<String>,
        field: impl Into<String>,
        expected: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConfigurationError {
            config_path: config_path.into(),
            field: field.into(),
            expected: expected.into(),
            cause: Box::new(cause),
        }
    }

    /// True when a save was refused because the document is over the storage ceiling
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::Storage(StorageError::QuotaExceeded { .. }))
    }
}
