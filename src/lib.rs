//! Facade crate: re-exports the orchestrator's component crates.
//!
//! The core library code lives in `orchestrator-shared` (data model, config,
//! errors, resilience primitives) and `orchestrator-engine` (the eight
//! components of the execution engine). This crate has no behavior of its
//! own; it exists so end-to-end tests and an eventual CLI front end have a
//! single dependency to pull in.

pub use orchestrator_engine as engine;
pub use orchestrator_shared as shared;

pub mod prelude {
    pub use orchestrator_engine::{
        coordinator::ExecutionCoordinator,
        persistence::{DistributedBackend, LocalMemoryBackend, PersistenceBackend},
        protocol_registry::ProtocolRegistry,
        provider_registry::{Provider, ProviderRegistry},
        queue::TaskQueue,
        resolver::DependencyResolver,
        scheduler::EventScheduler,
        substitutor::ParameterSubstitutor,
    };
    pub use orchestrator_shared::models::{
        event::{EventKind, EventRecord},
        protocol::{MethodSpec, ParamSchema, ProtocolSpec},
        provider::{HealthStatus, ProviderRecord},
        task::{BackoffStrategy, ErrorRecord, Priority, RetryConfig, Task, TaskStatus},
        workflow::{ErrorPolicy, Workflow, WorkflowStatus},
    };
}
