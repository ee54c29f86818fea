//! # Execution Coordinator (C8)
//!
//! Integrates C1–C7: accepts workflow submissions, proactively assigns
//! ready tasks to eligible providers, and reacts to completion, failure,
//! timeout, cancellation, and provider lifecycle events. Nothing in this
//! module polls; every action is triggered by an explicit call or a
//! scheduled-event delivery (§4.8, §1 Concurrency discipline).

use crate::errors::{EngineError, EngineResult, OrchestratorError};
use crate::persistence::PersistenceBackend;
use crate::protocol_registry::ProtocolRegistry;
use crate::provider_registry::{DispatchOutcome, Provider, ProviderRegistry};
use crate::queue::TaskQueue;
use crate::resolver::{DependencyResolver, WorkflowGraph};
use crate::scheduler::EventScheduler;
use crate::substitutor::ParameterSubstitutor;
use dashmap::DashMap;
use orchestrator_shared::config::{compute_backoff_delay, OrchestratorConfig};
use orchestrator_shared::jsonrpc::{reserved_codes, JsonRpcRequest, JsonRpcResponse};
use orchestrator_shared::models::event::{EventKind, EventRecord};
use orchestrator_shared::models::protocol::ProtocolSpec;
use orchestrator_shared::models::provider::ProviderRecord;
use orchestrator_shared::models::task::{Priority, RetryConfig, Task, TaskStatus};
use orchestrator_shared::models::workflow::{ErrorPolicy, Workflow, WorkflowStatus};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// One task as authored in a workflow submission, before uuid assignment.
#[derive(Debug, Clone)]
pub struct TaskSubmission {
    pub display_id: String,
    pub name: String,
    pub protocol: String,
    pub method: String,
    pub params: Value,
    pub priority: Priority,
    pub dependencies: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub retry: Option<RetryConfig>,
}

pub struct WorkflowSubmission {
    pub name: String,
    pub tasks: Vec<TaskSubmission>,
    pub parallelism_cap: Option<usize>,
    pub error_policy: ErrorPolicy,
    pub idempotency_key: Option<String>,
}

pub struct ExecutionCoordinator {
    protocol_registry: Arc<ProtocolRegistry>,
    provider_registry: Arc<ProviderRegistry>,
    persistence: Arc<dyn PersistenceBackend>,
    queue: Arc<TaskQueue>,
    scheduler: Arc<EventScheduler>,
    config: OrchestratorConfig,
    workflows: DashMap<Uuid, Workflow>,
    tasks: DashMap<Uuid, Task>,
    graphs: DashMap<Uuid, WorkflowGraph>,
    terminal_tasks: DashMap<Uuid, HashSet<Uuid>>,
    running_provider: DashMap<Uuid, Uuid>,
    idempotency_index: DashMap<String, Uuid>,
    /// Lets a handful of call sites (the spawned dispatch task) obtain an
    /// owned `Arc<Self>` from `&self` without the crate depending on an
    /// unstable `self: &Arc<Self>` receiver.
    self_ref: Weak<ExecutionCoordinator>,
}

impl ExecutionCoordinator {
    pub fn new(
        protocol_registry: Arc<ProtocolRegistry>,
        provider_registry: Arc<ProviderRegistry>,
        persistence: Arc<dyn PersistenceBackend>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let (scheduler, rx) = EventScheduler::new();
        let coordinator = Arc::new_cyclic(|weak| Self {
            protocol_registry,
            provider_registry,
            persistence,
            queue: Arc::new(TaskQueue::new(config.queue.max_size, config.queue.dequeue_scan_limit)),
            scheduler: Arc::new(scheduler),
            config,
            workflows: DashMap::new(),
            tasks: DashMap::new(),
            graphs: DashMap::new(),
            terminal_tasks: DashMap::new(),
            running_provider: DashMap::new(),
            idempotency_index: DashMap::new(),
            self_ref: weak.clone(),
        });
        spawn_event_loop(coordinator.clone(), rx);
        coordinator
    }

    fn arc(&self) -> Arc<Self> {
        self.self_ref.upgrade().expect("coordinator dropped while an operation was in flight")
    }

    // ---- Submission (§4.8 Submission) ----------------------------------

    #[instrument(skip(self, submission), fields(workflow_name = %submission.name))]
    pub async fn submit_workflow(
        &self,
        submission: WorkflowSubmission,
    ) -> Result<Uuid, OrchestratorError> {
        if let Some(key) = &submission.idempotency_key {
            if let Some(existing) = self.idempotency_index.get(key) {
                return Ok(*existing);
            }
        }

        let workflow = Workflow::new(
            submission.name,
            submission.tasks.iter().map(|t| t.display_id.clone()).collect(),
            submission.parallelism_cap,
            submission.error_policy,
            submission.idempotency_key.clone(),
        );
        let workflow_uuid = workflow.workflow_uuid;

        let tasks: Vec<Task> = submission
            .tasks
            .iter()
            .map(|t| {
                Task::new(
                    workflow_uuid,
                    t.display_id.clone(),
                    t.name.clone(),
                    t.protocol.clone(),
                    t.method.clone(),
                    t.params.clone(),
                    t.priority,
                    t.dependencies.clone(),
                    t.timeout_secs,
                    t.retry.clone().unwrap_or_else(|| RetryConfig {
                        max_attempts: self.config.retry_defaults.max_attempts,
                        strategy: self.config.retry_defaults.strategy,
                        base_delay_ms: self.config.retry_defaults.base_delay_ms,
                        max_delay_ms: self.config.retry_defaults.max_delay_ms,
                        jitter: self.config.retry_defaults.jitter,
                    }),
                )
            })
            .collect();
        let task_count = tasks.len();

        for task in &tasks {
            self.protocol_registry
                .validate_task(task)
                .map_err(orchestrator_shared::errors::SharedError::ValidationFailed)?;
        }

        let graph = DependencyResolver::build_graph(&tasks)?;

        self.persistence.put_workflow(workflow.clone()).await?;
        for task in &tasks {
            self.persistence.put_task(task.clone()).await?;
        }
        for task in tasks {
            self.tasks.insert(task.task_uuid, task);
        }
        self.graphs.insert(workflow_uuid, graph.clone());
        self.terminal_tasks.insert(workflow_uuid, HashSet::new());

        if let Some(key) = submission.idempotency_key {
            self.idempotency_index.insert(key, workflow_uuid);
        }

        if workflow.is_empty() {
            let mut wf = workflow;
            wf.status = WorkflowStatus::Completed;
            wf.completed_at = Some(chrono::Utc::now());
            self.workflows.insert(workflow_uuid, wf.clone());
            self.persistence.put_workflow(wf).await?;
            return Ok(workflow_uuid);
        }

        let mut wf = workflow;
        wf.status = WorkflowStatus::Running;
        self.workflows.insert(workflow_uuid, wf.clone());
        self.persistence.put_workflow(wf).await?;
        info!(workflow_id = %workflow_uuid, task_count, "workflow submitted");

        for ready_uuid in DependencyResolver::initial_ready_set(&graph) {
            self.enqueue_task(ready_uuid).await;
        }

        self.assign_available_tasks().await;
        Ok(workflow_uuid)
    }

    async fn enqueue_task(&self, task_uuid: Uuid) {
        let Some(mut task) = self.tasks.get_mut(&task_uuid) else {
            return;
        };
        if !task.transition(TaskStatus::Queued) {
            return;
        }
        let snapshot = task.clone();
        drop(task);
        self.persistence.put_task(snapshot.clone()).await.ok();
        match self.queue.enqueue(&snapshot) {
            Ok(_) => {
                let at = chrono::Utc::now()
                    + chrono::Duration::seconds(self.config.dead_letter_timeout_secs as i64);
                self.scheduler.schedule(EventRecord::dead_letter(task_uuid, at));
            }
            Err(EngineError::QueueFull { .. }) => {
                warn!(task_uuid = %task_uuid, "queue full; task left unqueued");
            }
            Err(_) => {}
        }
    }

    // ---- Assignment (§4.8 Assignment) ----------------------------------

    /// Sweeps providers by ascending in-flight load, dispatching at most
    /// one ready task per provider per pass, until either no provider has
    /// spare capacity or none can be matched to a ready task.
    pub async fn assign_available_tasks(&self) {
        loop {
            let providers = self.provider_registry.ordered_by_capacity();
            if providers.is_empty() {
                break;
            }
            let mut assigned_any = false;
            for provider_id in providers {
                let caps = self.provider_registry.capabilities_of(provider_id);
                if let Some(task_uuid) = self.queue.try_dequeue_ready(&caps) {
                    if self.dispatch_task(provider_id, task_uuid).await {
                        assigned_any = true;
                    }
                }
            }
            if !assigned_any {
                break;
            }
        }
    }

    /// Whether `workflow_id` already has `parallelism_cap` tasks running,
    /// if it declared one (§3 Workflow attribute "per-workflow parallelism
    /// cap"). Assigned is transient (synchronously promoted to running in
    /// the same call before any await), so the running count alone is an
    /// accurate snapshot of in-flight work at the point this is checked.
    fn workflow_at_parallelism_cap(&self, workflow_id: Uuid) -> bool {
        self.workflows
            .get(&workflow_id)
            .and_then(|w| w.parallelism_cap.map(|cap| w.counts.running >= cap))
            .unwrap_or(false)
    }

    /// Attempts to dispatch `task_uuid` to `provider_id`. Returns `false`
    /// without dispatching (re-enqueueing the task untouched) if the
    /// provider or the task's workflow parallelism cap is not available;
    /// callers use this to distinguish a real assignment from a no-op.
    async fn dispatch_task(&self, provider_id: Uuid, task_uuid: Uuid) -> bool {
        let workflow_id = match self.tasks.get(&task_uuid) {
            Some(task) => task.workflow_id,
            None => return false,
        };
        if self.workflow_at_parallelism_cap(workflow_id) {
            if let Some(task) = self.tasks.get(&task_uuid) {
                self.queue.enqueue(&task).ok();
            }
            return false;
        }

        // Reserve capacity before committing the task to `assigned`: the
        // task status machine has no way back to `queued` once assigned, so
        // a reservation that might fail must happen first.
        let handle: Arc<dyn Provider> = match self.provider_registry.reserve(provider_id) {
            Ok(h) => h,
            Err(_) => {
                // Provider became ineligible between selection and
                // reservation; put the task back on the queue untouched for
                // the next sweep.
                if let Some(task) = self.tasks.get(&task_uuid) {
                    self.queue.enqueue(&task).ok();
                }
                return false;
            }
        };

        {
            let mut task = match self.tasks.get_mut(&task_uuid) {
                Some(t) => t,
                None => {
                    self.provider_registry.release_unused(provider_id);
                    return false;
                }
            };
            if !task.transition(TaskStatus::Assigned) {
                drop(task);
                self.provider_registry.release_unused(provider_id);
                return false;
            }
        }
        self.scheduler.cancel(&format!("deadletter:{task_uuid}"));

        let substituted = {
            let task = self.tasks.get(&task_uuid).unwrap();
            let workflow = self.workflows.get(&workflow_id).unwrap();
            ParameterSubstitutor::substitute(&task.params, &workflow.results)
        };
        let request_params = match substituted {
            Ok(v) => v,
            Err(e) => {
                // Never dispatched; release the slot immediately rather
                // than waiting on a spawned task that will never run.
                self.provider_registry.release_unused(provider_id);
                self.handle_task_failure(task_uuid, None, false, "ParameterReferenceError", e.to_string())
                    .await;
                return true;
            }
        };

        let (request, attempt, timeout_secs) = {
            let mut task = self.tasks.get_mut(&task_uuid).unwrap();
            task.attempt += 1;
            task.transition(TaskStatus::Running);
            let request = JsonRpcRequest::new(task.task_uuid.to_string(), task.method.clone(), request_params);
            (request, task.attempt, task.timeout_secs)
        };
        if let Some(mut workflow) = self.workflows.get_mut(&workflow_id) {
            workflow.counts.running += 1;
        }
        self.running_provider.insert(task_uuid, provider_id);
        self.persist_task(task_uuid).await;

        if let Some(secs) = timeout_secs {
            let at = chrono::Utc::now() + chrono::Duration::seconds(secs as i64);
            self.scheduler.schedule(EventRecord::timeout(task_uuid, attempt, at));
        }

        let me = self.arc();
        let registry = self.provider_registry.clone();
        tokio::spawn(async move {
            let start = std::time::Instant::now();
            let result = handle.dispatch(request).await;
            let elapsed = start.elapsed();
            let outcome = if result.is_ok() {
                DispatchOutcome::TransportSuccess
            } else {
                DispatchOutcome::TransportFailure
            };
            registry.release(provider_id, outcome, elapsed);
            me.handle_dispatch_result(task_uuid, provider_id, attempt, result).await;
        });
        true
    }

    async fn handle_dispatch_result(
        &self,
        task_uuid: Uuid,
        provider_id: Uuid,
        attempt: u32,
        result: EngineResult<JsonRpcResponse>,
    ) {
        let still_current = self
            .tasks
            .get(&task_uuid)
            .map(|t| t.status == TaskStatus::Running && t.attempt == attempt)
            .unwrap_or(false);
        if !still_current {
            return; // Superseded by a timeout or cancellation; ignore late result.
        }
        self.scheduler.cancel(&format!("timeout:{task_uuid}:{attempt}"));
        self.running_provider.remove(&task_uuid);

        match result {
            Ok(JsonRpcResponse::Success { result, .. }) => {
                self.handle_task_success(task_uuid, result).await;
            }
            Ok(JsonRpcResponse::Error { error, .. }) => {
                let retryable = error.is_retryable();
                let kind = if error.code == reserved_codes::METHOD_NOT_FOUND {
                    "MethodNotFound"
                } else if error.code == reserved_codes::INVALID_PARAMS {
                    "InvalidParams"
                } else {
                    "JsonRpcMethodError"
                };
                self.handle_task_failure(task_uuid, Some(provider_id), retryable, kind, error.message)
                    .await;
            }
            Err(EngineError::ProviderTimeout { .. }) => {
                self.handle_task_failure(
                    task_uuid,
                    Some(provider_id),
                    true,
                    "ProviderTimeout",
                    "provider timed out".to_string(),
                )
                .await;
            }
            Err(e) => {
                self.handle_task_failure(task_uuid, Some(provider_id), true, "ProviderTransportError", e.to_string())
                    .await;
            }
        }
    }

    // ---- Completion (§4.8 Completion) ----------------------------------

    async fn handle_task_success(&self, task_uuid: Uuid, result: Value) {
        let (workflow_id, display_id, correlation_id) = {
            let mut task = match self.tasks.get_mut(&task_uuid) {
                Some(t) => t,
                None => return,
            };
            if !task.transition(TaskStatus::Completed) {
                return;
            }
            task.result = Some(result.clone());
            (task.workflow_id, task.display_id.clone(), task.correlation_id)
        };
        info!(
            correlation_id = %correlation_id,
            task_uuid = %task_uuid,
            workflow_id = %workflow_id,
            "task completed"
        );

        self.persistence
            .complete_task_with_result(workflow_id, task_uuid, display_id, result.clone())
            .await
            .ok();

        if let Some(mut workflow) = self.workflows.get_mut(&workflow_id) {
            workflow.results.insert(self.tasks.get(&task_uuid).unwrap().display_id.clone(), result);
            workflow.counts.completed += 1;
            workflow.counts.running = workflow.counts.running.saturating_sub(1);
        }

        self.terminal_tasks.entry(workflow_id).or_default().insert(task_uuid);

        let ready = {
            let graph = self.graphs.get(&workflow_id);
            let terminal = self.terminal_tasks.get(&workflow_id);
            match (graph, terminal) {
                (Some(graph), Some(terminal)) => {
                    DependencyResolver::newly_ready(&graph, &terminal, task_uuid)
                }
                _ => Vec::new(),
            }
        };
        for ready_uuid in ready {
            self.enqueue_task(ready_uuid).await;
        }

        self.assign_available_tasks().await;
        self.maybe_finalize(workflow_id).await;
    }

    // ---- Failure (§4.8 Failure) -----------------------------------------

    async fn handle_task_failure(
        &self,
        task_uuid: Uuid,
        provider_id: Option<Uuid>,
        retryable: bool,
        kind: &str,
        message: String,
    ) {
        let workflow_id = {
            let task = match self.tasks.get(&task_uuid) {
                Some(t) => t,
                None => return,
            };
            task.workflow_id
        };

        let was_running = self
            .tasks
            .get(&task_uuid)
            .map(|t| t.status == TaskStatus::Running)
            .unwrap_or(false);

        let can_retry = {
            let mut task = self.tasks.get_mut(&task_uuid).unwrap();
            task.record_error(kind, message, provider_id);
            retryable && task.attempt < task.retry.max_attempts
        };

        if can_retry {
            let (attempt, strategy, base, max, jitter) = {
                let mut task = self.tasks.get_mut(&task_uuid).unwrap();
                if !task.transition(TaskStatus::RetryScheduled) {
                    return;
                }
                (
                    task.attempt,
                    task.retry.strategy,
                    task.retry.base_delay_ms,
                    task.retry.max_delay_ms,
                    task.retry.jitter,
                )
            };
            if was_running {
                if let Some(mut workflow) = self.workflows.get_mut(&workflow_id) {
                    workflow.counts.running = workflow.counts.running.saturating_sub(1);
                }
            }
            let backoff = compute_backoff_delay(strategy, base, max, jitter, attempt);
            let at = chrono::Utc::now() + chrono::Duration::from_std(backoff).unwrap_or_default();
            let correlation_id = self.tasks.get(&task_uuid).map(|t| t.correlation_id).unwrap_or(task_uuid);
            info!(
                correlation_id = %correlation_id,
                task_uuid = %task_uuid,
                workflow_id = %workflow_id,
                provider_id = ?provider_id,
                attempt,
                kind,
                "task failed; retry scheduled"
            );
            self.persist_task(task_uuid).await;
            self.scheduler.schedule(EventRecord::retry(task_uuid, attempt, at));
            self.assign_available_tasks().await;
            return;
        }

        {
            let mut task = self.tasks.get_mut(&task_uuid).unwrap();
            if !task.transition(TaskStatus::Failed) {
                return;
            }
        }
        let correlation_id = self.tasks.get(&task_uuid).map(|t| t.correlation_id).unwrap_or(task_uuid);
        warn!(
            correlation_id = %correlation_id,
            task_uuid = %task_uuid,
            workflow_id = %workflow_id,
            provider_id = ?provider_id,
            kind,
            "task permanently failed"
        );
        self.persist_task(task_uuid).await;
        self.terminal_tasks.entry(workflow_id).or_default().insert(task_uuid);
        if let Some(mut workflow) = self.workflows.get_mut(&workflow_id) {
            workflow.counts.failed += 1;
            if was_running {
                workflow.counts.running = workflow.counts.running.saturating_sub(1);
            }
        }
        self.on_task_terminal_failed(workflow_id, task_uuid).await;
    }

    async fn on_task_terminal_failed(&self, workflow_id: Uuid, task_uuid: Uuid) {
        let policy = self
            .workflows
            .get(&workflow_id)
            .map(|w| w.error_policy)
            .unwrap_or_default();
        match policy {
            ErrorPolicy::FailFast => {
                self.cancel_remaining_tasks(workflow_id).await;
                self.finalize_workflow(workflow_id, WorkflowStatus::Failed).await;
            }
            ErrorPolicy::ContinueOnError => {
                let ready = {
                    let graph = self.graphs.get(&workflow_id);
                    let terminal = self.terminal_tasks.get(&workflow_id);
                    match (graph, terminal) {
                        (Some(graph), Some(terminal)) => {
                            DependencyResolver::newly_ready(&graph, &terminal, task_uuid)
                        }
                        _ => Vec::new(),
                    }
                };
                for ready_uuid in ready {
                    self.enqueue_task(ready_uuid).await;
                }
                self.assign_available_tasks().await;
                self.maybe_finalize(workflow_id).await;
            }
        }
    }

    async fn maybe_finalize(&self, workflow_id: Uuid) {
        let Some(workflow) = self.workflows.get(&workflow_id) else {
            return;
        };
        if workflow.is_terminal() || !workflow.counts.all_terminal() {
            return;
        }
        let status = if workflow.counts.failed > 0 {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Completed
        };
        drop(workflow);
        self.finalize_workflow(workflow_id, status).await;
    }

    async fn finalize_workflow(&self, workflow_id: Uuid, status: WorkflowStatus) {
        let Some(mut workflow) = self.workflows.get_mut(&workflow_id) else {
            return;
        };
        if workflow.is_terminal() {
            return;
        }
        workflow.status = status;
        workflow.completed_at = Some(chrono::Utc::now());
        let snapshot = workflow.clone();
        drop(workflow);
        info!(workflow_id = %workflow_id, status = ?status, "workflow finalized");
        self.persistence.put_workflow(snapshot).await.ok();
    }

    async fn cancel_remaining_tasks(&self, workflow_id: Uuid) {
        let task_uuids: Vec<Uuid> = self
            .tasks
            .iter()
            .filter(|e| e.workflow_id == workflow_id && !e.status.is_terminal())
            .map(|e| e.task_uuid)
            .collect();
        let mut cancelled_count = 0usize;
        let mut running_cancelled_count = 0usize;
        for task_uuid in task_uuids {
            self.queue.remove(task_uuid);
            self.scheduler.cancel(&format!("deadletter:{task_uuid}"));
            if let Some(mut task) = self.tasks.get_mut(&task_uuid) {
                let attempt = task.attempt;
                let was_running = task.status == TaskStatus::Running;
                if !task.transition(TaskStatus::Cancelled) {
                    continue;
                }
                drop(task);
                self.scheduler.cancel(&format!("retry:{task_uuid}:{attempt}"));
                self.scheduler.cancel(&format!("timeout:{task_uuid}:{attempt}"));
                self.persist_task(task_uuid).await;
                self.terminal_tasks.entry(workflow_id).or_default().insert(task_uuid);
                cancelled_count += 1;
                if was_running {
                    running_cancelled_count += 1;
                }
            }
        }
        if cancelled_count > 0 {
            if let Some(mut workflow) = self.workflows.get_mut(&workflow_id) {
                workflow.counts.cancelled += cancelled_count;
                workflow.counts.running = workflow.counts.running.saturating_sub(running_cancelled_count);
            }
        }
    }

    // ---- Cancellation (§4.8 Cancellation) -------------------------------

    pub async fn cancel_workflow(&self, workflow_id: Uuid) -> EngineResult<()> {
        {
            let mut workflow = self
                .workflows
                .get_mut(&workflow_id)
                .ok_or(EngineError::WorkflowNotFound { workflow_id })?;
            if workflow.is_terminal() {
                return Ok(());
            }
            workflow.status = WorkflowStatus::Cancelled;
            workflow.completed_at = Some(chrono::Utc::now());
        }
        self.cancel_remaining_tasks(workflow_id).await;
        if let Some(workflow) = self.workflows.get(&workflow_id) {
            self.persistence.put_workflow(workflow.clone()).await.ok();
        }
        Ok(())
    }

    // ---- Provider lifecycle (§4.8 "provider registration", "provider-health recovery") ----

    pub async fn register_provider(
        &self,
        handle: Arc<dyn Provider>,
        max_in_flight: u32,
        supports_concurrent: bool,
    ) -> Uuid {
        let provider_id = self
            .provider_registry
            .register(handle, max_in_flight, supports_concurrent);
        let at = chrono::Utc::now()
            + chrono::Duration::seconds(self.config.health_probe.initial_interval_secs as i64);
        self.scheduler.schedule(EventRecord::health_probe(provider_id, at));
        self.assign_available_tasks().await;
        provider_id
    }

    async fn run_health_probe(&self, provider_id: Uuid) {
        let Some(handle) = self.provider_registry.handle_of(provider_id) else {
            return;
        };
        let was_unavailable = self
            .provider_registry
            .get(provider_id)
            .map(|r| !r.health.is_eligible())
            .unwrap_or(false);
        let success = handle.health_probe().await;
        let next_interval = self
            .provider_registry
            .record_probe_result(provider_id, success)
            .unwrap_or(self.config.health_probe.initial_interval_secs);

        let at = chrono::Utc::now() + chrono::Duration::seconds(next_interval as i64);
        self.scheduler.schedule(EventRecord::health_probe(provider_id, at));

        let became_eligible = was_unavailable
            && self
                .provider_registry
                .get(provider_id)
                .map(|r| r.health.is_eligible())
                .unwrap_or(false);
        if became_eligible {
            self.assign_available_tasks().await;
        }
    }

    // ---- Scheduled-event dispatch ----------------------------------------

    async fn handle_event(&self, event: EventRecord) {
        match event.kind {
            EventKind::Retry => {
                let (Some(task_uuid), Some(attempt)) = (event.task_uuid(), event.attempt()) else {
                    return;
                };
                let fires = self
                    .tasks
                    .get(&task_uuid)
                    .map(|t| t.status == TaskStatus::RetryScheduled && t.attempt == attempt)
                    .unwrap_or(false);
                if !fires {
                    return;
                }
                self.enqueue_task(task_uuid).await;
                self.assign_available_tasks().await;
            }
            EventKind::Timeout => {
                let (Some(task_uuid), Some(attempt)) = (event.task_uuid(), event.attempt()) else {
                    return;
                };
                let fires = self
                    .tasks
                    .get(&task_uuid)
                    .map(|t| t.status == TaskStatus::Running && t.attempt == attempt)
                    .unwrap_or(false);
                if !fires {
                    return;
                }
                let provider_id = self.running_provider.remove(&task_uuid).map(|(_, p)| p);
                self.handle_task_failure(
                    task_uuid,
                    provider_id,
                    true,
                    "ProviderTimeout",
                    "task exceeded its timeout".to_string(),
                )
                .await;
            }
            EventKind::DeadLetter => {
                let Some(task_uuid) = event.task_uuid() else {
                    return;
                };
                let fires = self
                    .tasks
                    .get(&task_uuid)
                    .map(|t| t.status == TaskStatus::Queued)
                    .unwrap_or(false);
                if !fires {
                    return;
                }
                self.queue.remove(task_uuid);
                self.handle_task_failure(
                    task_uuid,
                    None,
                    false,
                    "NoProviderAvailable",
                    "task remained unassignable past its dead-letter timeout".to_string(),
                )
                .await;
            }
            EventKind::HealthProbe => {
                let Some(provider_id) = event.provider_id() else {
                    return;
                };
                self.run_health_probe(provider_id).await;
            }
        }
    }

    async fn persist_task(&self, task_uuid: Uuid) {
        if let Some(task) = self.tasks.get(&task_uuid) {
            self.persistence.put_task(task.clone()).await.ok();
        }
    }

    // ---- Read-only queries (§4.8 Queries) --------------------------------

    pub fn get_task(&self, task_uuid: Uuid) -> Option<Task> {
        self.tasks.get(&task_uuid).map(|t| t.clone())
    }

    pub fn get_workflow(&self, workflow_id: Uuid) -> Option<Workflow> {
        self.workflows.get(&workflow_id).map(|w| w.clone())
    }

    pub fn list_tasks(&self, workflow_id: Uuid) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .map(|e| e.clone())
            .collect()
    }

    pub fn queue_size(&self) -> usize {
        self.queue.size()
    }

    pub fn list_providers(&self) -> Vec<ProviderRecord> {
        self.provider_registry.list()
    }

    pub fn list_protocols(&self) -> Vec<ProtocolSpec> {
        self.protocol_registry.list()
    }

    pub fn provider_registry(&self) -> &Arc<ProviderRegistry> {
        &self.provider_registry
    }

    pub fn protocol_registry(&self) -> &Arc<ProtocolRegistry> {
        &self.protocol_registry
    }
}

fn spawn_event_loop(coordinator: Arc<ExecutionCoordinator>, mut rx: mpsc::UnboundedReceiver<EventRecord>) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            coordinator.handle_event(event).await;
        }
    });
}
