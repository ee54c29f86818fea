//! Reference "distributed" backend: several named node handles sharing one
//! store, each with its own broadcast receiver, demonstrating the
//! cross-node notification fan-out a clustered deployment needs without
//! requiring real networking (out of scope, §2 Non-goals).

use super::{ChangeNotification, LocalMemoryBackend, PersistenceBackend};
use crate::errors::EngineResult;
use async_trait::async_trait;
use orchestrator_shared::models::event::EventRecord;
use orchestrator_shared::models::task::Task;
use orchestrator_shared::models::workflow::Workflow;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct DistributedBackend {
    node_id: Uuid,
    shared: Arc<LocalMemoryBackend>,
}

impl DistributedBackend {
    /// Builds `node_count` node handles sharing one underlying store.
    /// Every handle observes the others' writes through its own broadcast
    /// receiver, the way a real cluster fans out change events.
    pub fn new_cluster(node_count: usize) -> Vec<DistributedBackend> {
        let shared = Arc::new(LocalMemoryBackend::new());
        (0..node_count.max(1))
            .map(|_| DistributedBackend {
                node_id: Uuid::new_v4(),
                shared: shared.clone(),
            })
            .collect()
    }

    pub fn node_id(&self) -> Uuid {
        self.node_id
    }
}

#[async_trait]
impl PersistenceBackend for DistributedBackend {
    async fn put_task(&self, task: Task) -> EngineResult<()> {
        self.shared.put_task(task).await
    }

    async fn get_task(&self, task_uuid: Uuid) -> EngineResult<Option<Task>> {
        self.shared.get_task(task_uuid).await
    }

    async fn list_tasks_for_workflow(&self, workflow_id: Uuid) -> EngineResult<Vec<Task>> {
        self.shared.list_tasks_for_workflow(workflow_id).await
    }

    async fn put_workflow(&self, workflow: Workflow) -> EngineResult<()> {
        self.shared.put_workflow(workflow).await
    }

    async fn get_workflow(&self, workflow_id: Uuid) -> EngineResult<Option<Workflow>> {
        self.shared.get_workflow(workflow_id).await
    }

    async fn list_workflows(&self) -> EngineResult<Vec<Workflow>> {
        self.shared.list_workflows().await
    }

    async fn complete_task_with_result(
        &self,
        workflow_id: Uuid,
        task_uuid: Uuid,
        display_id: String,
        result: Value,
    ) -> EngineResult<()> {
        self.shared
            .complete_task_with_result(workflow_id, task_uuid, display_id, result)
            .await
    }

    async fn insert_event(&self, event: EventRecord) -> EngineResult<()> {
        self.shared.insert_event(event).await
    }

    async fn delete_event(&self, dedupe_key: &str) -> EngineResult<()> {
        self.shared.delete_event(dedupe_key).await
    }

    async fn list_events(&self) -> EngineResult<Vec<EventRecord>> {
        self.shared.list_events().await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeNotification> {
        self.shared.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_shared::models::task::{Priority, RetryConfig};

    #[tokio::test]
    async fn a_write_on_one_node_is_visible_from_another() {
        let mut nodes = DistributedBackend::new_cluster(2);
        let node_b = nodes.pop().unwrap();
        let node_a = nodes.pop().unwrap();
        assert_ne!(node_a.node_id(), node_b.node_id());

        let task = Task::new(
            Uuid::new_v4(),
            "t1",
            "Task",
            "llm/v1",
            "generate",
            serde_json::json!({}),
            Priority::Normal,
            vec![],
            None,
            RetryConfig::default(),
        );
        let task_uuid = task.task_uuid;
        node_a.put_task(task).await.unwrap();
        assert!(node_b.get_task(task_uuid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn each_node_receives_its_own_notification_stream() {
        let mut nodes = DistributedBackend::new_cluster(2);
        let node_b = nodes.pop().unwrap();
        let node_a = nodes.pop().unwrap();
        let mut rx_a = node_a.subscribe();
        let mut rx_b = node_b.subscribe();

        let task = Task::new(
            Uuid::new_v4(),
            "t1",
            "Task",
            "llm/v1",
            "generate",
            serde_json::json!({}),
            Priority::Normal,
            vec![],
            None,
            RetryConfig::default(),
        );
        node_a.put_task(task).await.unwrap();
        assert!(matches!(
            rx_a.recv().await.unwrap(),
            ChangeNotification::TaskUpdated(_)
        ));
        assert!(matches!(
            rx_b.recv().await.unwrap(),
            ChangeNotification::TaskUpdated(_)
        ));
    }
}
