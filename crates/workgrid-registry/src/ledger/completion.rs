//! Task completion ledger
//!
//! One record per task id. A completed record is final and is appended to
//! an append-only Merkle tree so any completion can later be proven against
//! the published root.

use std::collections::HashMap;

use tracing::{debug, warn};
use workgrid_common::crypto::{MerkleProof, MerkleTree};
use workgrid_common::{LedgerError, TaskCompletionRecord, TaskId, TaskStatus, WorkerId};

use crate::registry::WorkerDirectory;

/// Result of opening a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened(TaskCompletionRecord),
    /// Pending or failed record already tracked, returned unchanged
    Existing(TaskCompletionRecord),
}

impl OpenOutcome {
    pub fn record(&self) -> &TaskCompletionRecord {
        match self {
            OpenOutcome::Opened(r) | OpenOutcome::Existing(r) => r,
        }
    }
}

/// Completion records keyed by task id
#[derive(Debug, Clone, Default)]
pub struct TaskCompletionLedger {
    records: HashMap<TaskId, TaskCompletionRecord>,
    audit: MerkleTree,
}

impl TaskCompletionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a task as pending
    pub fn open_task(&mut self, task_id: TaskId) -> Result<OpenOutcome, LedgerError> {
        match self.records.get(&task_id) {
            Some(r) if r.is_completed() => Err(LedgerError::AlreadyCompleted(task_id)),
            Some(r) => Ok(OpenOutcome::Existing(r.clone())),
            None => {
                let record = TaskCompletionRecord::pending(task_id);
                self.records.insert(task_id, record.clone());
                debug!(%task_id, "Task opened");
                Ok(OpenOutcome::Opened(record))
            }
        }
    }

    /// Record a successful result
    ///
    /// An untracked task is created directly in the completed state.
    pub fn submit_completion(
        &mut self,
        directory: &impl WorkerDirectory,
        task_id: TaskId,
        submitter: WorkerId,
        result_payload: Vec<u8>,
    ) -> Result<TaskCompletionRecord, LedgerError> {
        self.check_submission(directory, &task_id, &submitter)?;

        let mut record = self
            .records
            .get(&task_id)
            .cloned()
            .unwrap_or_else(|| TaskCompletionRecord::pending(task_id));
        record.status = TaskStatus::Completed;
        record.submitter = Some(submitter);
        record.result_payload = result_payload;
        record.completed_at = Some(chrono::Utc::now().timestamp_millis());

        let audit_index = self.audit.append(record.canonical_hash());
        record.audit_index = Some(audit_index);
        self.records.insert(task_id, record.clone());

        debug!(%task_id, %submitter, audit_index, "Task completed");
        Ok(record)
    }

    /// Record a failed attempt; the task may still be completed later
    pub fn submit_failure(
        &mut self,
        directory: &impl WorkerDirectory,
        task_id: TaskId,
        submitter: WorkerId,
        result_payload: Vec<u8>,
    ) -> Result<TaskCompletionRecord, LedgerError> {
        self.check_submission(directory, &task_id, &submitter)?;

        let record = self
            .records
            .entry(task_id)
            .or_insert_with(|| TaskCompletionRecord::pending(task_id));
        record.status = TaskStatus::Failed;
        record.submitter = Some(submitter);
        record.result_payload = result_payload;
        record.completed_at = Some(chrono::Utc::now().timestamp_millis());

        debug!(%task_id, %submitter, "Task failed");
        Ok(record.clone())
    }

    /// Completed record for a task
    pub fn get_completed_task_by_id(
        &self,
        task_id: &TaskId,
    ) -> Result<TaskCompletionRecord, LedgerError> {
        self.records
            .get(task_id)
            .filter(|r| r.is_completed())
            .cloned()
            .ok_or(LedgerError::NotFound(*task_id))
    }

    /// Record in any status
    pub fn get_task(&self, task_id: &TaskId) -> Result<TaskCompletionRecord, LedgerError> {
        self.records
            .get(task_id)
            .cloned()
            .ok_or(LedgerError::NotFound(*task_id))
    }

    /// Current root of the completion audit tree
    pub fn completion_root(&self) -> Option<[u8; 32]> {
        self.audit.root()
    }

    /// Inclusion proof for a completed task against the current root
    pub fn completion_proof(&self, task_id: &TaskId) -> Result<MerkleProof, LedgerError> {
        let record = self.get_completed_task_by_id(task_id)?;
        record
            .audit_index
            .and_then(|index| self.audit.generate_proof(index))
            .ok_or(LedgerError::NotFound(*task_id))
    }

    pub fn completed_count(&self) -> u64 {
        self.audit.leaf_count()
    }

    fn check_submission(
        &self,
        directory: &impl WorkerDirectory,
        task_id: &TaskId,
        submitter: &WorkerId,
    ) -> Result<(), LedgerError> {
        if !directory.is_registered(submitter) {
            warn!(%task_id, %submitter, "Submission from unknown worker");
            return Err(LedgerError::UnknownWorker(*submitter));
        }
        if self.records.get(task_id).map_or(false, |r| r.is_completed()) {
            warn!(%task_id, "Task already completed");
            return Err(LedgerError::AlreadyCompleted(*task_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Known(HashSet<WorkerId>);

    impl WorkerDirectory for Known {
        fn is_registered(&self, worker_id: &WorkerId) -> bool {
            self.0.contains(worker_id)
        }
    }

    fn task(b: u8) -> TaskId {
        TaskId([b; 32])
    }

    fn worker(b: u8) -> WorkerId {
        WorkerId([b; 32])
    }

    fn directory() -> Known {
        Known([worker(1), worker(2)].into_iter().collect())
    }

    #[test]
    fn test_complete_untracked_task() {
        let mut ledger = TaskCompletionLedger::new();
        let record = ledger
            .submit_completion(&directory(), task(1), worker(1), b"result".to_vec())
            .unwrap();
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.audit_index, Some(0));
        assert_eq!(ledger.get_completed_task_by_id(&task(1)).unwrap(), record);
    }

    #[test]
    fn test_second_completion_rejected() {
        let mut ledger = TaskCompletionLedger::new();
        let first = ledger
            .submit_completion(&directory(), task(1), worker(1), b"first".to_vec())
            .unwrap();

        assert_eq!(
            ledger.submit_completion(&directory(), task(1), worker(2), b"second".to_vec()),
            Err(LedgerError::AlreadyCompleted(task(1)))
        );
        assert_eq!(ledger.get_completed_task_by_id(&task(1)).unwrap(), first);
        assert_eq!(ledger.completed_count(), 1);
    }

    #[test]
    fn test_unknown_worker_rejected() {
        let mut ledger = TaskCompletionLedger::new();
        assert_eq!(
            ledger.submit_completion(&directory(), task(1), worker(9), Vec::new()),
            Err(LedgerError::UnknownWorker(worker(9)))
        );
        assert!(ledger.get_task(&task(1)).is_err());
    }

    #[test]
    fn test_pending_and_failed_are_not_completed() {
        let mut ledger = TaskCompletionLedger::new();
        assert!(matches!(ledger.open_task(task(1)), Ok(OpenOutcome::Opened(_))));
        assert!(matches!(ledger.open_task(task(1)), Ok(OpenOutcome::Existing(_))));
        assert_eq!(
            ledger.get_completed_task_by_id(&task(1)),
            Err(LedgerError::NotFound(task(1)))
        );

        ledger
            .submit_failure(&directory(), task(1), worker(1), b"timeout".to_vec())
            .unwrap();
        assert_eq!(ledger.get_task(&task(1)).unwrap().status, TaskStatus::Failed);
        assert!(ledger.get_completed_task_by_id(&task(1)).is_err());

        // A failed task can still be completed
        let done = ledger
            .submit_completion(&directory(), task(1), worker(2), b"ok".to_vec())
            .unwrap();
        assert_eq!(done.submitter, Some(worker(2)));
        assert_eq!(
            ledger.open_task(task(1)),
            Err(LedgerError::AlreadyCompleted(task(1)))
        );
        assert!(ledger
            .submit_failure(&directory(), task(1), worker(1), Vec::new())
            .is_err());
    }

    #[test]
    fn test_completion_proofs_verify() {
        let mut ledger = TaskCompletionLedger::new();
        assert!(ledger.completion_root().is_none());

        for b in 1..=5u8 {
            ledger
                .submit_completion(&directory(), task(b), worker(1), vec![b])
                .unwrap();
        }

        let root = ledger.completion_root().unwrap();
        for b in 1..=5u8 {
            let record = ledger.get_completed_task_by_id(&task(b)).unwrap();
            let proof = ledger.completion_proof(&task(b)).unwrap();
            assert_eq!(proof.root, root);
            assert!(proof.verify(&record.canonical_hash()));
        }
        assert!(ledger.completion_proof(&task(9)).is_err());
    }
}
