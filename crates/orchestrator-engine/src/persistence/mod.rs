//! # Persistence Backend (C3)
//!
//! The durability contract every component writes task, workflow, and
//! event state through. Two in-memory reference implementations are
//! provided — [`memory::LocalMemoryBackend`] for a single node and
//! [`distributed::DistributedBackend`] which composes several node
//! handles over one shared store, demonstrating the cross-node
//! notification fan-out a real distributed backend would provide. Neither
//! implementation persists to disk; a production deployment swaps in a
//! backend of its own (out of scope, §2 Non-goals).

mod distributed;
mod memory;

pub use distributed::DistributedBackend;
pub use memory::LocalMemoryBackend;

use crate::errors::EngineResult;
use async_trait::async_trait;
use orchestrator_shared::models::event::EventRecord;
use orchestrator_shared::models::task::Task;
use orchestrator_shared::models::workflow::Workflow;
use serde_json::Value;
use uuid::Uuid;

/// Emitted on every state-changing write, so a watcher (e.g. a recovering
/// coordinator replica) can react without polling.
#[derive(Debug, Clone)]
pub enum ChangeNotification {
    TaskUpdated(Uuid),
    WorkflowUpdated(Uuid),
}

#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    async fn put_task(&self, task: Task) -> EngineResult<()>;
    async fn get_task(&self, task_uuid: Uuid) -> EngineResult<Option<Task>>;
    async fn list_tasks_for_workflow(&self, workflow_id: Uuid) -> EngineResult<Vec<Task>>;

    async fn put_workflow(&self, workflow: Workflow) -> EngineResult<()>;
    async fn get_workflow(&self, workflow_id: Uuid) -> EngineResult<Option<Workflow>>;
    async fn list_workflows(&self) -> EngineResult<Vec<Workflow>>;

    /// Atomically (per-entity) records a task's successful result and
    /// folds it into the owning workflow's result map (§3 Ownership:
    /// "cross-entity updates that must be atomic use a per-entity
    /// transaction or equivalent compare-and-set").
    async fn complete_task_with_result(
        &self,
        workflow_id: Uuid,
        task_uuid: Uuid,
        display_id: String,
        result: Value,
    ) -> EngineResult<()>;

    async fn insert_event(&self, event: EventRecord) -> EngineResult<()>;
    async fn delete_event(&self, dedupe_key: &str) -> EngineResult<()>;
    async fn list_events(&self) -> EngineResult<Vec<EventRecord>>;

    /// Subscribes to change notifications. Each subscriber gets its own
    /// receiver; notifications already delivered to other subscribers are
    /// still delivered to a newly-subscribed one only going forward.
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ChangeNotification>;
}
