//! End-to-end seed scenarios exercising the coordinator against an
//! in-process scripted provider, rather than a real transport.

mod common;

use common::{ScriptedProvider, Script};
use orchestrator_engine::coordinator::{ExecutionCoordinator, TaskSubmission, WorkflowSubmission};
use orchestrator_engine::persistence::LocalMemoryBackend;
use orchestrator_engine::protocol_registry::ProtocolRegistry;
use orchestrator_engine::provider_registry::ProviderRegistry;
use orchestrator_shared::config::OrchestratorConfig;
use orchestrator_shared::jsonrpc::reserved_codes;
use orchestrator_shared::models::protocol::{MethodSpec, ParamSchema, ProtocolSpec};
use orchestrator_shared::models::task::{BackoffStrategy, Priority, RetryConfig, TaskStatus};
use orchestrator_shared::models::workflow::{ErrorPolicy, WorkflowStatus};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn any_method(name: &str) -> MethodSpec {
    MethodSpec {
        name: name.to_string(),
        params_schema: ParamSchema::Any,
        result_schema: ParamSchema::Any,
    }
}

fn new_coordinator() -> Arc<ExecutionCoordinator> {
    let protocols = Arc::new(ProtocolRegistry::new());
    let spec = ProtocolSpec::new("test", "v1")
        .with_method(any_method("run"))
        .with_method(any_method("step"));
    protocols.register(spec).unwrap();

    let config = OrchestratorConfig::default();
    let providers = Arc::new(ProviderRegistry::new(config.health_probe.clone()));
    let persistence = Arc::new(LocalMemoryBackend::new());
    ExecutionCoordinator::new(protocols, providers, persistence, config)
}

fn task(display_id: &str, method: &str, params: serde_json::Value, deps: &[&str]) -> TaskSubmission {
    TaskSubmission {
        display_id: display_id.to_string(),
        name: display_id.to_string(),
        protocol: "test/v1".to_string(),
        method: method.to_string(),
        params,
        priority: Priority::Normal,
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        timeout_secs: None,
        retry: None,
    }
}

async fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

fn caps(method: &str) -> HashSet<(String, String)> {
    HashSet::from([("test/v1".to_string(), method.to_string())])
}

#[tokio::test]
async fn two_task_linear_substitution() {
    let coordinator = new_coordinator();
    let provider = ScriptedProvider::new(
        HashSet::from([
            ("test/v1".to_string(), "run".to_string()),
            ("test/v1".to_string(), "step".to_string()),
        ]),
        vec![
            Script::Success(serde_json::json!({"n": 5})),
            Script::Success(serde_json::json!({"ok": true})),
        ],
    );
    coordinator.register_provider(provider, 4, true).await;

    let workflow_id = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "linear".to_string(),
            tasks: vec![
                task("t1", "run", serde_json::json!({}), &[]),
                task("t2", "step", serde_json::json!({"x": "${t1.n}"}), &["t1"]),
            ],
            parallelism_cap: None,
            error_policy: ErrorPolicy::FailFast,
            idempotency_key: None,
        })
        .await
        .unwrap();

    let done = wait_until(Duration::from_secs(2), || {
        coordinator
            .get_workflow(workflow_id)
            .map(|w| w.is_terminal())
            .unwrap_or(false)
    })
    .await;
    assert!(done, "workflow did not finalize");

    let workflow = coordinator.get_workflow(workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert_eq!(workflow.results.get("t1"), Some(&serde_json::json!({"n": 5})));

    let tasks = coordinator.list_tasks(workflow_id);
    let t2 = tasks.iter().find(|t| t.display_id == "t2").unwrap();
    assert_eq!(t2.status, TaskStatus::Completed);
}

#[tokio::test]
async fn diamond_dag_waits_for_both_branches() {
    let coordinator = new_coordinator();
    let provider = ScriptedProvider::new(
        caps("step"),
        vec![
            Script::Success(serde_json::json!({"v": "a"})),
            Script::Success(serde_json::json!({"v": "b"})),
            Script::Success(serde_json::json!({"v": "c"})),
            Script::Success(serde_json::json!({"v": "d"})),
        ],
    );
    coordinator.register_provider(provider, 4, true).await;

    let workflow_id = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "diamond".to_string(),
            tasks: vec![
                task("a", "step", serde_json::json!({}), &[]),
                task("b", "step", serde_json::json!({}), &["a"]),
                task("c", "step", serde_json::json!({}), &["a"]),
                task(
                    "d",
                    "step",
                    serde_json::json!({"b": "${b.v}", "c": "${c.v}"}),
                    &["b", "c"],
                ),
            ],
            parallelism_cap: None,
            error_policy: ErrorPolicy::FailFast,
            idempotency_key: None,
        })
        .await
        .unwrap();

    let done = wait_until(Duration::from_secs(2), || {
        coordinator
            .get_workflow(workflow_id)
            .map(|w| w.is_terminal())
            .unwrap_or(false)
    })
    .await;
    assert!(done, "workflow did not finalize");
    let workflow = coordinator.get_workflow(workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert_eq!(workflow.counts.completed, 4);
}

#[tokio::test]
async fn retry_path_recovers_after_transient_errors() {
    let coordinator = new_coordinator();
    let provider = ScriptedProvider::new(
        caps("run"),
        vec![
            Script::AppError(-32001, "transient".to_string()),
            Script::AppError(-32001, "transient".to_string()),
            Script::Success(serde_json::json!({"ok": true})),
        ],
    );
    coordinator.register_provider(provider, 1, false).await;

    let workflow_id = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "retry".to_string(),
            tasks: vec![TaskSubmission {
                retry: Some(RetryConfig {
                    max_attempts: 3,
                    strategy: BackoffStrategy::Fixed,
                    base_delay_ms: 20,
                    max_delay_ms: 100,
                    jitter: false,
                }),
                ..task("t1", "run", serde_json::json!({}), &[])
            }],
            parallelism_cap: None,
            error_policy: ErrorPolicy::FailFast,
            idempotency_key: None,
        })
        .await
        .unwrap();

    let done = wait_until(Duration::from_secs(2), || {
        coordinator
            .get_workflow(workflow_id)
            .map(|w| w.is_terminal())
            .unwrap_or(false)
    })
    .await;
    assert!(done, "workflow did not finalize");

    let workflow = coordinator.get_workflow(workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    let t1 = coordinator
        .list_tasks(workflow_id)
        .into_iter()
        .find(|t| t.display_id == "t1")
        .unwrap();
    assert_eq!(t1.status, TaskStatus::Completed);
    assert_eq!(t1.error_history.len(), 2);
}

#[tokio::test]
async fn fail_fast_cancels_independent_siblings() {
    let coordinator = new_coordinator();
    let provider = ScriptedProvider::new(
        caps("run"),
        vec![Script::AppError(reserved_codes::METHOD_NOT_FOUND, "no such method".to_string())],
    );
    coordinator.register_provider(provider, 4, true).await;

    let workflow_id = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "fail-fast".to_string(),
            tasks: vec![
                task("t1", "run", serde_json::json!({}), &[]),
                task("t2", "run", serde_json::json!({}), &[]),
                task("t3", "run", serde_json::json!({}), &[]),
            ],
            parallelism_cap: None,
            error_policy: ErrorPolicy::FailFast,
            idempotency_key: None,
        })
        .await
        .unwrap();

    let done = wait_until(Duration::from_secs(2), || {
        coordinator
            .get_workflow(workflow_id)
            .map(|w| w.is_terminal())
            .unwrap_or(false)
    })
    .await;
    assert!(done, "workflow did not finalize");

    let workflow = coordinator.get_workflow(workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    let t1 = coordinator
        .list_tasks(workflow_id)
        .into_iter()
        .find(|t| t.display_id == "t1")
        .unwrap();
    assert_eq!(t1.status, TaskStatus::Failed);
}

#[tokio::test]
async fn no_provider_then_register_assigns_immediately() {
    let coordinator = new_coordinator();

    let workflow_id = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "late-provider".to_string(),
            tasks: vec![task("t1", "run", serde_json::json!({}), &[])],
            parallelism_cap: None,
            error_policy: ErrorPolicy::FailFast,
            idempotency_key: None,
        })
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let t1 = coordinator
        .list_tasks(workflow_id)
        .into_iter()
        .find(|t| t.display_id == "t1")
        .unwrap();
    assert_eq!(t1.status, TaskStatus::Queued);

    let provider = ScriptedProvider::new(caps("run"), vec![Script::Success(serde_json::json!({"ok": true}))]);
    coordinator.register_provider(provider, 4, true).await;

    let done = wait_until(Duration::from_secs(2), || {
        coordinator
            .get_workflow(workflow_id)
            .map(|w| w.is_terminal())
            .unwrap_or(false)
    })
    .await;
    assert!(done, "workflow did not finalize after provider registered");
    assert_eq!(coordinator.get_workflow(workflow_id).unwrap().status, WorkflowStatus::Completed);
}

/// Only one provider is registered at first, so every retry of the
/// workflow's single task is forced through it (otherwise the assignment
/// sweep's tie-break between two equally-loaded providers would make
/// which one absorbs the failures nondeterministic). Once it has
/// demoted to unavailable, a second healthy provider is registered and
/// picks up the task that was left waiting in the queue.
#[tokio::test]
async fn provider_demotes_after_consecutive_transport_failures() {
    let coordinator = new_coordinator();
    let failing = ScriptedProvider::new(
        caps("run"),
        vec![
            Script::Transport,
            Script::Transport,
            Script::Transport,
            Script::Transport,
            Script::Transport,
        ],
    );
    let failing_id = coordinator.register_provider(failing, 1, false).await;

    let workflow_id = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "demotion".to_string(),
            tasks: vec![TaskSubmission {
                retry: Some(RetryConfig {
                    max_attempts: 10,
                    strategy: BackoffStrategy::Fixed,
                    base_delay_ms: 5,
                    max_delay_ms: 20,
                    jitter: false,
                }),
                ..task("t1", "run", serde_json::json!({}), &[])
            }],
            parallelism_cap: None,
            error_policy: ErrorPolicy::FailFast,
            idempotency_key: None,
        })
        .await
        .unwrap();

    let demoted = wait_until(Duration::from_secs(2), || {
        coordinator
            .provider_registry()
            .get(failing_id)
            .map(|r| !r.health.is_eligible())
            .unwrap_or(false)
    })
    .await;
    assert!(demoted, "provider should have demoted to unavailable after 5 consecutive failures");

    let healthy = ScriptedProvider::new(caps("run"), vec![Script::Success(serde_json::json!({"ok": true}))]);
    coordinator.register_provider(healthy, 4, true).await;

    let done = wait_until(Duration::from_secs(2), || {
        coordinator
            .get_workflow(workflow_id)
            .map(|w| w.is_terminal())
            .unwrap_or(false)
    })
    .await;
    assert!(done, "workflow did not finalize after a healthy provider was registered");
    assert_eq!(coordinator.get_workflow(workflow_id).unwrap().status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn zero_task_workflow_completes_immediately() {
    let coordinator = new_coordinator();
    let workflow_id = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "empty".to_string(),
            tasks: vec![],
            parallelism_cap: None,
            error_policy: ErrorPolicy::FailFast,
            idempotency_key: None,
        })
        .await
        .unwrap();
    assert_eq!(coordinator.get_workflow(workflow_id).unwrap().status, WorkflowStatus::Completed);
}

#[tokio::test]
async fn duplicate_idempotency_key_returns_same_workflow() {
    let coordinator = new_coordinator();
    let provider = ScriptedProvider::new(caps("run"), vec![Script::Success(serde_json::json!({"ok": true}))]);
    coordinator.register_provider(provider, 4, true).await;

    let submission = || WorkflowSubmission {
        name: "idempotent".to_string(),
        tasks: vec![task("t1", "run", serde_json::json!({}), &[])],
        parallelism_cap: None,
        error_policy: ErrorPolicy::FailFast,
        idempotency_key: Some("key-1".to_string()),
    };

    let first = coordinator.submit_workflow(submission()).await.unwrap();
    let second = coordinator.submit_workflow(submission()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn parallelism_cap_limits_concurrent_running_tasks() {
    let coordinator = new_coordinator();
    let provider = ScriptedProvider::new(
        caps("run"),
        vec![
            Script::Success(serde_json::json!({})),
            Script::Success(serde_json::json!({})),
            Script::Success(serde_json::json!({})),
        ],
    );
    coordinator.register_provider(provider, 8, true).await;

    let workflow_id = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "capped".to_string(),
            tasks: vec![
                task("t1", "run", serde_json::json!({}), &[]),
                task("t2", "run", serde_json::json!({}), &[]),
                task("t3", "run", serde_json::json!({}), &[]),
            ],
            parallelism_cap: Some(1),
            error_policy: ErrorPolicy::FailFast,
            idempotency_key: None,
        })
        .await
        .unwrap();

    let done = wait_until(Duration::from_secs(2), || {
        coordinator
            .get_workflow(workflow_id)
            .map(|w| w.is_terminal())
            .unwrap_or(false)
    })
    .await;
    assert!(done, "workflow did not finalize");
    let workflow = coordinator.get_workflow(workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Completed);
    assert_eq!(workflow.counts.completed, 3);
    assert_eq!(workflow.counts.running, 0);
}

/// Two independent root tasks (`a`, `b`) each fail permanently and each has
/// its own dependent (`c`, `d`). Under `ContinueOnError` the failure of `a`
/// must only resolve `a`'s own dependent, never `b`'s — picking an arbitrary
/// failed task out of the whole workflow's terminal set would, depending on
/// iteration order, resolve the same dependent twice and leave the other
/// one stuck in `queued` forever, so the workflow would never finalize.
#[tokio::test]
async fn continue_on_error_resolves_each_independent_branch() {
    let coordinator = new_coordinator();
    let failing = ScriptedProvider::new(
        caps("run"),
        vec![
            Script::AppError(reserved_codes::METHOD_NOT_FOUND, "no such method".to_string()),
            Script::AppError(reserved_codes::METHOD_NOT_FOUND, "no such method".to_string()),
        ],
    );
    coordinator.register_provider(failing, 4, true).await;
    let succeeding = ScriptedProvider::new(
        caps("step"),
        vec![
            Script::Success(serde_json::json!({})),
            Script::Success(serde_json::json!({})),
        ],
    );
    coordinator.register_provider(succeeding, 4, true).await;

    let workflow_id = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "continue-on-error".to_string(),
            tasks: vec![
                task("a", "run", serde_json::json!({}), &[]),
                task("b", "run", serde_json::json!({}), &[]),
                task("c", "step", serde_json::json!({}), &["a"]),
                task("d", "step", serde_json::json!({}), &["b"]),
            ],
            parallelism_cap: None,
            error_policy: ErrorPolicy::ContinueOnError,
            idempotency_key: None,
        })
        .await
        .unwrap();

    let done = wait_until(Duration::from_secs(2), || {
        coordinator
            .get_workflow(workflow_id)
            .map(|w| w.is_terminal())
            .unwrap_or(false)
    })
    .await;
    assert!(done, "workflow did not finalize; a dependent was left stuck");

    let workflow = coordinator.get_workflow(workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Failed);
    assert_eq!(workflow.counts.failed, 2);
    assert_eq!(workflow.counts.completed, 2);

    let tasks = coordinator.list_tasks(workflow_id);
    for id in ["a", "b"] {
        let t = tasks.iter().find(|t| t.display_id == id).unwrap();
        assert_eq!(t.status, TaskStatus::Failed);
    }
    for id in ["c", "d"] {
        let t = tasks.iter().find(|t| t.display_id == id).unwrap();
        assert_eq!(t.status, TaskStatus::Completed, "{id} should have been resolved by its own dependency's failure");
    }
}

#[tokio::test]
async fn cancel_workflow_stops_remaining_tasks() {
    let coordinator = new_coordinator();

    let workflow_id = coordinator
        .submit_workflow(WorkflowSubmission {
            name: "cancel-me".to_string(),
            tasks: vec![
                task("t1", "run", serde_json::json!({}), &[]),
                task("t2", "run", serde_json::json!({}), &[]),
            ],
            parallelism_cap: None,
            error_policy: ErrorPolicy::FailFast,
            idempotency_key: None,
        })
        .await
        .unwrap();

    coordinator.cancel_workflow(workflow_id).await.unwrap();

    let workflow = coordinator.get_workflow(workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Cancelled);
    for t in coordinator.list_tasks(workflow_id) {
        assert_eq!(t.status, TaskStatus::Cancelled);
    }
    assert_eq!(workflow.counts.running, 0);
}
