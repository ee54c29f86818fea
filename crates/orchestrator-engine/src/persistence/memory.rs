//! Single-node in-memory reference implementation of [`PersistenceBackend`].

use super::{ChangeNotification, PersistenceBackend};
use crate::errors::{EngineError, EngineResult};
use async_trait::async_trait;
use dashmap::DashMap;
use orchestrator_shared::models::event::EventRecord;
use orchestrator_shared::models::task::Task;
use orchestrator_shared::models::workflow::Workflow;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

const NOTIFY_CHANNEL_CAPACITY: usize = 4096;

pub struct LocalMemoryBackend {
    tasks: DashMap<Uuid, Task>,
    workflows: DashMap<Uuid, Workflow>,
    events: DashMap<String, EventRecord>,
    notify_tx: broadcast::Sender<ChangeNotification>,
}

impl Default for LocalMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalMemoryBackend {
    pub fn new() -> Self {
        let (notify_tx, _) = broadcast::channel(NOTIFY_CHANNEL_CAPACITY);
        Self {
            tasks: DashMap::new(),
            workflows: DashMap::new(),
            events: DashMap::new(),
            notify_tx,
        }
    }
}

#[async_trait]
impl PersistenceBackend for LocalMemoryBackend {
    async fn put_task(&self, task: Task) -> EngineResult<()> {
        let task_uuid = task.task_uuid;
        self.tasks.insert(task_uuid, task);
        let _ = self.notify_tx.send(ChangeNotification::TaskUpdated(task_uuid));
        Ok(())
    }

    async fn get_task(&self, task_uuid: Uuid) -> EngineResult<Option<Task>> {
        Ok(self.tasks.get(&task_uuid).map(|e| e.clone()))
    }

    async fn list_tasks_for_workflow(&self, workflow_id: Uuid) -> EngineResult<Vec<Task>> {
        Ok(self
            .tasks
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .map(|e| e.clone())
            .collect())
    }

    async fn put_workflow(&self, workflow: Workflow) -> EngineResult<()> {
        let workflow_uuid = workflow.workflow_uuid;
        self.workflows.insert(workflow_uuid, workflow);
        let _ = self
            .notify_tx
            .send(ChangeNotification::WorkflowUpdated(workflow_uuid));
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> EngineResult<Option<Workflow>> {
        Ok(self.workflows.get(&workflow_id).map(|e| e.clone()))
    }

    async fn list_workflows(&self) -> EngineResult<Vec<Workflow>> {
        Ok(self.workflows.iter().map(|e| e.clone()).collect())
    }

    async fn complete_task_with_result(
        &self,
        workflow_id: Uuid,
        task_uuid: Uuid,
        display_id: String,
        result: Value,
    ) -> EngineResult<()> {
        {
            let mut task = self
                .tasks
                .get_mut(&task_uuid)
                .ok_or(EngineError::TaskNotFound { task_id: task_uuid })?;
            task.result = Some(result.clone());
        }
        {
            let mut workflow = self
                .workflows
                .get_mut(&workflow_id)
                .ok_or(EngineError::WorkflowNotFound { workflow_id })?;
            workflow.results.insert(display_id, result);
        }
        let _ = self.notify_tx.send(ChangeNotification::TaskUpdated(task_uuid));
        let _ = self
            .notify_tx
            .send(ChangeNotification::WorkflowUpdated(workflow_id));
        Ok(())
    }

    async fn insert_event(&self, event: EventRecord) -> EngineResult<()> {
        self.events.insert(event.dedupe_key.clone(), event);
        Ok(())
    }

    async fn delete_event(&self, dedupe_key: &str) -> EngineResult<()> {
        self.events.remove(dedupe_key);
        Ok(())
    }

    async fn list_events(&self) -> EngineResult<Vec<EventRecord>> {
        Ok(self.events.iter().map(|e| e.clone()).collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.notify_tx.subscribe()
    }
}
