//! # Task
//!
//! The unit of work dispatched to a provider (§3 Task). Carries its own
//! retry configuration and a bounded history of past-attempt error
//! records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Maximum number of `ErrorRecord`s retained per task (oldest dropped
/// first) — the "bounded error history" of §7 Visibility.
pub const MAX_ERROR_HISTORY: usize = 32;

/// Task priority. Ordered so `urgent > high > normal > low` as required by
/// the queue's heap ordering (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Backoff strategy for retryable failures (§3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
}

/// Per-task retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter: true,
        }
    }
}

/// The task status machine of §3:
/// `pending -> queued -> assigned -> running -> (completed | failed | retry-scheduled)`,
/// with `retry-scheduled -> queued` re-entry and `cancelled` reachable from
/// any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Assigned,
    Running,
    Completed,
    Failed,
    RetryScheduled,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses end the task's lifecycle; none may transition out.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether a task in `self` counts as "terminal-successful" for
    /// dependency-readiness purposes (§3, §5 GLOSSARY Dependency).
    pub fn is_terminal_successful(self) -> bool {
        matches!(self, TaskStatus::Completed)
    }

    /// Validates a proposed transition against the state machine in §3/§5.
    /// No skip or reverse transitions are permitted (Invariant 4).
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Queued) => true,
            (Queued, Assigned) => true,
            (Assigned, Running) => true,
            (Running, Completed) => true,
            (Running, RetryScheduled) => true,
            (RetryScheduled, Queued) => true,
            // Cancellation is reachable from any non-terminal state. Failure
            // is too: a task can fail before ever running (dead-letter
            // timeout while still queued, a parameter reference that
            // resolves against a failed dependency during assignment), not
            // only after a dispatch attempt.
            (s, Cancelled) if !s.is_terminal() => true,
            (s, Failed) if !s.is_terminal() => true,
            _ => false,
        }
    }
}

/// One recorded failure for a single dispatch attempt (§7 Visibility).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
    pub provider_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
}

/// A task within a workflow (§3 Task).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Generated identity used internally (queue keys, dedupe keys).
    pub task_uuid: Uuid,
    /// Stable id threaded through every log line concerning this task, so
    /// its lifecycle (submit, assign, retries, terminal outcome) can be
    /// grepped out of interleaved logs for other tasks in the same
    /// workflow.
    pub correlation_id: Uuid,
    /// Author-facing id, unique within the owning workflow's description.
    pub display_id: String,
    pub workflow_id: Uuid,
    pub name: String,
    pub protocol: String,
    pub method: String,
    pub params: Value,
    pub priority: Priority,
    /// Display ids of dependencies, as authored in the workflow description.
    pub dependencies: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub retry: RetryConfig,
    pub status: TaskStatus,
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error_history: Vec<ErrorRecord>,
}

impl Task {
    pub fn new(
        workflow_id: Uuid,
        display_id: impl Into<String>,
        name: impl Into<String>,
        protocol: impl Into<String>,
        method: impl Into<String>,
        params: Value,
        priority: Priority,
        dependencies: Vec<String>,
        timeout_secs: Option<u64>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            task_uuid: Uuid::new_v4(),
            correlation_id: Uuid::new_v4(),
            display_id: display_id.into(),
            workflow_id,
            name: name.into(),
            protocol: protocol.into(),
            method: method.into(),
            params,
            priority,
            dependencies,
            timeout_secs,
            retry,
            status: TaskStatus::Pending,
            attempt: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error_history: Vec::new(),
        }
    }

    /// Attempts a status transition, enforcing the state machine. Returns
    /// `false` (no mutation) on an illegal transition rather than panicking,
    /// so callers can surface an `InternalError`.
    #[must_use]
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        if next == TaskStatus::Running {
            self.started_at = Some(Utc::now());
        }
        if matches!(next, TaskStatus::Completed | TaskStatus::Failed) {
            self.completed_at = Some(Utc::now());
        }
        self.status = next;
        true
    }

    /// Records an attempt failure, bounding history to `MAX_ERROR_HISTORY`.
    pub fn record_error(&mut self, kind: impl Into<String>, message: impl Into<String>, provider_id: Option<Uuid>) {
        self.error_history.push(ErrorRecord {
            kind: kind.into(),
            message: message.into(),
            provider_id,
            timestamp: Utc::now(),
            attempt: self.attempt,
        });
        if self.error_history.len() > MAX_ERROR_HISTORY {
            self.error_history.remove(0);
        }
    }

    pub fn protocol_method_pair(&self) -> (String, String) {
        (self.protocol.clone(), self.method.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task() -> Task {
        Task::new(
            Uuid::new_v4(),
            "t1",
            "Task 1",
            "llm/v1",
            "generate",
            serde_json::json!({}),
            Priority::Normal,
            vec![],
            None,
            RetryConfig::default(),
        )
    }

    #[test]
    fn priority_ordering_matches_spec() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn legal_happy_path_transitions() {
        let mut t = sample_task();
        assert!(t.transition(TaskStatus::Queued));
        assert!(t.transition(TaskStatus::Assigned));
        assert!(t.transition(TaskStatus::Running));
        assert!(t.started_at.is_some());
        assert!(t.transition(TaskStatus::Completed));
        assert!(t.completed_at.is_some());
    }

    #[test]
    fn illegal_skip_transition_rejected() {
        let mut t = sample_task();
        // Pending -> Running is a skip (must pass through Queued, Assigned).
        assert!(!t.transition(TaskStatus::Running));
        assert_eq!(t.status, TaskStatus::Pending);
    }

    #[test]
    fn illegal_reverse_transition_rejected() {
        let mut t = sample_task();
        assert!(t.transition(TaskStatus::Queued));
        assert!(t.transition(TaskStatus::Assigned));
        assert!(!t.transition(TaskStatus::Queued));
    }

    #[test]
    fn terminal_states_reject_all_transitions() {
        let mut t = sample_task();
        t.transition(TaskStatus::Queued);
        t.transition(TaskStatus::Assigned);
        t.transition(TaskStatus::Running);
        t.transition(TaskStatus::Completed);
        assert!(!t.transition(TaskStatus::Cancelled));
        assert!(!t.transition(TaskStatus::Failed));
    }

    #[test]
    fn cancellation_reachable_from_queued_and_running() {
        let mut t = sample_task();
        t.transition(TaskStatus::Queued);
        assert!(t.transition(TaskStatus::Cancelled));

        let mut t2 = sample_task();
        t2.transition(TaskStatus::Queued);
        t2.transition(TaskStatus::Assigned);
        t2.transition(TaskStatus::Running);
        assert!(t2.transition(TaskStatus::Cancelled));
    }

    #[test]
    fn retry_scheduled_reenters_queue() {
        let mut t = sample_task();
        t.transition(TaskStatus::Queued);
        t.transition(TaskStatus::Assigned);
        t.transition(TaskStatus::Running);
        assert!(t.transition(TaskStatus::RetryScheduled));
        assert!(t.transition(TaskStatus::Queued));
    }

    #[test]
    fn error_history_is_bounded() {
        let mut t = sample_task();
        for i in 0..(MAX_ERROR_HISTORY + 10) {
            t.record_error("ProviderTransportError", format!("failure {i}"), None);
        }
        assert_eq!(t.error_history.len(), MAX_ERROR_HISTORY);
        // Oldest entries were dropped; the last one recorded is retained.
        assert!(t
            .error_history
            .last()
            .unwrap()
            .message
            .contains(&(MAX_ERROR_HISTORY + 9).to_string()));
    }
}
