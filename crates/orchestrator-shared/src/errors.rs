//! # Shared Error Taxonomy
//!
//! Implements the error taxonomy of the design: validation, protocol
//! conflicts, and parameter-reference failures that originate in the
//! protocol registry (C1), dependency resolver (C5), and parameter
//! substitutor (C6). Provider/transport/internal errors that originate in
//! the engine crate live in `orchestrator_engine::errors::EngineError` and
//! convert into `OrchestratorError` at the coordinator boundary.

use thiserror::Error;
use uuid::Uuid;

/// Result alias for shared-crate operations.
pub type SharedResult<T> = Result<T, SharedError>;

/// Errors raised by the protocol registry, dependency resolver, and
/// parameter substitutor.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SharedError {
    #[error("protocol conflict: {name}/{version} is already registered with a different definition")]
    ProtocolConflict { name: String, version: String },

    #[error("unknown protocol: {name}/{version}")]
    UnknownProtocol { name: String, version: String },

    #[error("unknown method: {method} in protocol {name}/{version}")]
    UnknownMethod {
        name: String,
        version: String,
        method: String,
    },

    #[error("protocol inheritance cycle detected starting at {name}/{version}")]
    InheritanceCycle { name: String, version: String },

    #[error("task validation failed: {0:?}")]
    ValidationFailed(Vec<ValidationError>),

    #[error("dependency cycle detected: {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("duplicate task id in workflow: {0}")]
    DuplicateTaskId(String),

    #[error("task {task} depends on unknown task {dependency}")]
    UnknownDependency { task: String, dependency: String },

    #[error("task {task} declares a dependency on itself")]
    SelfDependency { task: String },

    #[error("parameter reference to unresolved dependency: task {referrer} references {target}, which is not a (transitive) dependency")]
    UndeclaredParameterDependency { referrer: String, target: String },

    #[error("parameter reference error: {0}")]
    ParameterReference(#[from] ParameterReferenceError),
}

/// A single schema-validation failure on a task's parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Errors raised while substituting `${task-id.path}` references (C6).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParameterReferenceError {
    #[error("referenced task {task_id} has not completed")]
    UnsatisfiedReference { task_id: String },

    #[error("path {path} not found in result of task {task_id}")]
    MissingPath { task_id: String, path: String },

    #[error("referenced task {task_id} is not present in the workflow's result map")]
    UnknownTask { task_id: String },
}

/// Internal invariant violations: bugs, not user errors.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("internal error: {context} (task {task_id:?})")]
pub struct InternalError {
    pub context: String,
    pub task_id: Option<Uuid>,
}

impl InternalError {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            task_id: None,
        }
    }

    pub fn for_task(context: impl Into<String>, task_id: Uuid) -> Self {
        Self {
            context: context.into(),
            task_id: Some(task_id),
        }
    }
}
