//! # Event Record
//!
//! Scheduled wall-clock events (retries, timeouts, health probes, and the
//! dead-letter guard) delivered at-or-after their scheduled time, strictly
//! once per dedupe key (§3 Event record, §4.7). `kind` in the source spec
//! is "e.g. retry, timeout" — non-exhaustive — so the implementation adds
//! `HealthProbe` (§4.2) and `DeadLetter` (§7) events driven through the
//! same scheduler rather than inventing separate timer loops for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Retry,
    Timeout,
    DeadLetter,
    HealthProbe,
}

/// Payload carried by a scheduled event. Task-shaped events carry the task
/// id and the attempt number they apply to (so a late timeout for a
/// superseded attempt is ignored); provider probes carry the provider id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    TaskAttempt { task_uuid: Uuid, attempt: u32 },
    ProviderProbe { provider_id: Uuid },
}

/// A single entry in the event scheduler's min-heap (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub scheduled_at: DateTime<Utc>,
    pub kind: EventKind,
    pub payload: EventPayload,
    pub dedupe_key: String,
}

impl EventRecord {
    pub fn retry(task_uuid: Uuid, attempt: u32, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            scheduled_at,
            kind: EventKind::Retry,
            payload: EventPayload::TaskAttempt { task_uuid, attempt },
            dedupe_key: format!("retry:{task_uuid}:{attempt}"),
        }
    }

    pub fn timeout(task_uuid: Uuid, attempt: u32, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            scheduled_at,
            kind: EventKind::Timeout,
            payload: EventPayload::TaskAttempt { task_uuid, attempt },
            dedupe_key: format!("timeout:{task_uuid}:{attempt}"),
        }
    }

    pub fn dead_letter(task_uuid: Uuid, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            scheduled_at,
            kind: EventKind::DeadLetter,
            payload: EventPayload::TaskAttempt {
                task_uuid,
                attempt: 0,
            },
            dedupe_key: format!("deadletter:{task_uuid}"),
        }
    }

    pub fn health_probe(provider_id: Uuid, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            scheduled_at,
            kind: EventKind::HealthProbe,
            payload: EventPayload::ProviderProbe { provider_id },
            dedupe_key: format!("healthprobe:{provider_id}"),
        }
    }

    pub fn task_uuid(&self) -> Option<Uuid> {
        match self.payload {
            EventPayload::TaskAttempt { task_uuid, .. } => Some(task_uuid),
            EventPayload::ProviderProbe { .. } => None,
        }
    }

    pub fn attempt(&self) -> Option<u32> {
        match self.payload {
            EventPayload::TaskAttempt { attempt, .. } => Some(attempt),
            EventPayload::ProviderProbe { .. } => None,
        }
    }

    pub fn provider_id(&self) -> Option<Uuid> {
        match self.payload {
            EventPayload::ProviderProbe { provider_id } => Some(provider_id),
            EventPayload::TaskAttempt { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keys_are_distinct_per_kind_and_attempt() {
        let task_uuid = Uuid::new_v4();
        let now = Utc::now();
        let retry1 = EventRecord::retry(task_uuid, 1, now);
        let retry2 = EventRecord::retry(task_uuid, 2, now);
        let timeout1 = EventRecord::timeout(task_uuid, 1, now);
        let dead = EventRecord::dead_letter(task_uuid, now);
        assert_ne!(retry1.dedupe_key, retry2.dedupe_key);
        assert_ne!(retry1.dedupe_key, timeout1.dedupe_key);
        assert_ne!(retry1.dedupe_key, dead.dedupe_key);
    }

    #[test]
    fn accessors_return_none_for_mismatched_payload_shape() {
        let provider_id = Uuid::new_v4();
        let probe = EventRecord::health_probe(provider_id, Utc::now());
        assert_eq!(probe.provider_id(), Some(provider_id));
        assert_eq!(probe.task_uuid(), None);

        let task_uuid = Uuid::new_v4();
        let retry = EventRecord::retry(task_uuid, 1, Utc::now());
        assert_eq!(retry.task_uuid(), Some(task_uuid));
        assert_eq!(retry.provider_id(), None);
    }
}
