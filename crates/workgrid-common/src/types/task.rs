//! Task completion records
//!
//! A record moves through `Pending -> Completed` or `Pending -> Failed`.
//! `Failed` may still be completed by a later submission; `Completed` is
//! terminal and never overwritten.

use crate::types::ids::{TaskId, WorkerId};
use serde::{Deserialize, Serialize};

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Completion tuple kept per task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletionRecord {
    pub task_id: TaskId,

    pub status: TaskStatus,

    /// Opaque bytes produced by the worker
    #[serde(with = "crate::types::encoding::hex_bytes")]
    pub result_payload: Vec<u8>,

    /// Worker that supplied the result, `None` while pending
    pub submitter: Option<WorkerId>,

    /// When the record was first created (Unix milliseconds)
    pub created_at: i64,

    /// When the task reached a final status (Unix milliseconds)
    pub completed_at: Option<i64>,

    /// Leaf index in the completion audit tree, set once completed
    pub audit_index: Option<u64>,
}

impl TaskCompletionRecord {
    /// Create a pending record
    pub fn pending(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            result_payload: Vec::new(),
            submitter: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
            audit_index: None,
        }
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Canonical hash of the final record, used as the audit leaf
    pub fn canonical_hash(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.task_id.as_bytes());
        hasher.update(&[self.status as u8]);
        if let Some(submitter) = &self.submitter {
            hasher.update(submitter.as_bytes());
        }
        hasher.update(&(self.result_payload.len() as u64).to_le_bytes());
        hasher.update(&self.result_payload);
        hasher.update(&self.completed_at.unwrap_or_default().to_le_bytes());
        *hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_record() {
        let record = TaskCompletionRecord::pending(TaskId([7u8; 32]));
        assert_eq!(record.status, TaskStatus::Pending);
        assert!(record.submitter.is_none());
        assert!(!record.is_completed());
    }

    #[test]
    fn test_canonical_hash_covers_payload() {
        let mut a = TaskCompletionRecord::pending(TaskId([1u8; 32]));
        a.status = TaskStatus::Completed;
        a.submitter = Some(WorkerId([2u8; 32]));
        a.result_payload = b"result".to_vec();
        a.completed_at = Some(42);

        let mut b = a.clone();
        b.result_payload = b"other".to_vec();

        assert_eq!(a.canonical_hash(), a.clone().canonical_hash());
        assert_ne!(a.canonical_hash(), b.canonical_hash());
    }

    #[test]
    fn test_payload_serialized_as_hex() {
        let mut record = TaskCompletionRecord::pending(TaskId([0u8; 32]));
        record.result_payload = vec![0xde, 0xad];
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["result_payload"], "0xdead");

        let back: TaskCompletionRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.result_payload, vec![0xde, 0xad]);
    }
}
