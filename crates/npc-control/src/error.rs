//! Error types for task control.
//!
//! Expected outcomes of an assignment attempt are values of [`TaskError`];
//! nothing here panics across the assignment boundary. Malformed catalogs are
//! reported as [`CatalogError`] and abort the load.

use std::path::PathBuf;

use npc_messages::{ControllerId, TaskId};
use thiserror::Error;

/// Why a task operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Target eligibility or start preconditions are not met.
    #[error("task {task} is not eligible for this actor/target")]
    NotEligible { task: TaskId },
    /// The target already has `max_performers` actors on this task.
    #[error("task {task} is at capacity ({max} performers) for this target")]
    CapacityExceeded { task: TaskId, max: u32 },
    /// The catalog has no task with this id.
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),
    /// The actor is not registered as controllable.
    #[error("entity is not a controllable actor")]
    UnknownActor,
    /// The requesting user may not control this actor.
    #[error("{0} may not control this actor")]
    PermissionDenied(ControllerId),
    /// A move order could not place every actor.
    #[error("no free tile near the requested destination")]
    NoFreeTile,
}

/// Why a task catalog could not be loaded.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML catalog: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to parse JSON catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported catalog format: {0}")]
    UnsupportedFormat(String),
    #[error("duplicate task id: {0}")]
    DuplicateTask(TaskId),
    #[error("task {task} references unknown component '{component}'")]
    UnknownComponent { task: TaskId, component: String },
    #[error("task {task} is malformed: {reason}")]
    Malformed { task: TaskId, reason: String },
}

/// Why a controller configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_display() {
        let err = TaskError::CapacityExceeded {
            task: TaskId::new("Mine"),
            max: 1,
        };
        assert_eq!(
            err.to_string(),
            "task Mine is at capacity (1 performers) for this target"
        );

        let err = TaskError::PermissionDenied(ControllerId(4));
        assert_eq!(err.to_string(), "controller#4 may not control this actor");
    }

    #[test]
    fn test_catalog_error_from_toml() {
        let toml_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: CatalogError = toml_err.into();
        assert!(err.to_string().starts_with("failed to parse TOML catalog"));
    }
}
