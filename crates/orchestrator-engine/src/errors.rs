//! # Engine Error Taxonomy
//!
//! Errors that originate in the execution engine's runtime components
//! (provider dispatch, queueing, persistence lookups) as opposed to the
//! static/definitional errors in `orchestrator_shared::errors`.

use thiserror::Error;
use uuid::Uuid;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("no provider available for {protocol}/{method}")]
    NoProviderAvailable { protocol: String, method: String },

    #[error("provider {provider_id} is not registered")]
    ProviderNotFound { provider_id: Uuid },

    #[error("provider {provider_id} is saturated or ineligible")]
    ProviderUnavailable { provider_id: Uuid },

    #[error("provider {provider_id} transport error: {reason}")]
    ProviderTransportError { provider_id: Uuid, reason: String },

    #[error("provider {provider_id} timed out")]
    ProviderTimeout { provider_id: Uuid },

    #[error("queue is full (max_size={max_size})")]
    QueueFull { max_size: usize },

    #[error("workflow {workflow_id} not found")]
    WorkflowNotFound { workflow_id: Uuid },

    #[error("task {task_id} not found")]
    TaskNotFound { task_id: Uuid },

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

/// Top-level error type returned across the coordinator's public API,
/// unifying the shared (definitional) and engine (runtime) taxonomies.
#[derive(Debug, Error, Clone)]
pub enum OrchestratorError {
    #[error(transparent)]
    Shared(#[from] orchestrator_shared::errors::SharedError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}
