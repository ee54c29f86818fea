//! # Workflow
//!
//! A DAG of tasks sharing a result namespace and error policy (§3 Workflow).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Error policy controlling how a workflow reacts to a permanently-failed
/// task (§3, §4.8 Failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    #[default]
    FailFast,
    ContinueOnError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Aggregate task counts maintained as tasks move through the state
/// machine, used to decide workflow finalization without re-scanning every
/// task (§3 Invariants, §8 Invariant 6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WorkflowCounts {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub running: usize,
}

impl WorkflowCounts {
    pub fn terminal(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    pub fn all_terminal(&self) -> bool {
        self.total > 0 && self.terminal() == self.total
    }
}

/// A workflow: an ordered set of tasks, an optional parallelism cap, an
/// error policy, and the result map that parameter substitution (C6) reads
/// from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_uuid: Uuid,
    pub name: String,
    /// Ordered as authored; task ids are unique within this set
    /// (Invariant: "task ids are unique within a workflow").
    pub task_display_ids: Vec<String>,
    pub parallelism_cap: Option<usize>,
    pub error_policy: ErrorPolicy,
    pub status: WorkflowStatus,
    pub counts: WorkflowCounts,
    /// Author-facing task id -> result value, populated as tasks complete.
    pub results: HashMap<String, Value>,
    /// External idempotency key, if the submitter supplied one (§8
    /// round-trip law: resubmission under the same key is a single
    /// execution).
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    pub fn new(
        name: impl Into<String>,
        task_display_ids: Vec<String>,
        parallelism_cap: Option<usize>,
        error_policy: ErrorPolicy,
        idempotency_key: Option<String>,
    ) -> Self {
        let total = task_display_ids.len();
        Self {
            workflow_uuid: Uuid::new_v4(),
            name: name.into(),
            task_display_ids,
            parallelism_cap,
            error_policy,
            status: WorkflowStatus::Pending,
            counts: WorkflowCounts {
                total,
                ..Default::default()
            },
            results: HashMap::new(),
            idempotency_key,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// A zero-task workflow is immediately complete (§8 Boundary cases).
    pub fn is_empty(&self) -> bool {
        self.task_display_ids.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_task_workflow_is_empty() {
        let wf = Workflow::new("empty", vec![], None, ErrorPolicy::FailFast, None);
        assert!(wf.is_empty());
        assert_eq!(wf.counts.total, 0);
    }

    #[test]
    fn counts_all_terminal_requires_nonempty() {
        let counts = WorkflowCounts::default();
        assert!(!counts.all_terminal());
    }

    #[test]
    fn counts_all_terminal_true_when_every_task_terminal() {
        let counts = WorkflowCounts {
            total: 3,
            completed: 2,
            failed: 1,
            cancelled: 0,
            running: 0,
        };
        assert!(counts.all_terminal());
    }
}
