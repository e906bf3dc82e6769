//! Committed state changes
//!
//! Events are published on a broadcast channel after the change commits and
//! while the state lock is still held, so subscribers observe them in commit
//! order.

use serde::{Deserialize, Serialize};
use workgrid_common::types::encoding::hex_hash;
use workgrid_common::{
    Address, QuorumNumber, StrategyEntry, StrategyParams, TaskId, TaskStatus, WorkerId,
};

use crate::coordinator::QuorumPhase;
use crate::strategy::ShareUpdate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RegistryEvent {
    WorkerWhitelisted {
        address: Address,
    },
    WorkerUnwhitelisted {
        address: Address,
    },
    WorkerRegistered {
        worker_id: WorkerId,
        address: Address,
    },
    WorkerDeregistered {
        worker_id: WorkerId,
        address: Address,
    },
    StrategiesAdded {
        quorum: QuorumNumber,
        first_index: usize,
        strategies: Vec<StrategyParams>,
    },
    StrategiesRemoved {
        quorum: QuorumNumber,
        removed: Vec<StrategyEntry>,
    },
    OperatorSharesUpdated {
        operator: Address,
        shares: Vec<ShareUpdate>,
    },
    WorkersSelected {
        quorum: QuorumNumber,
        #[serde(with = "hex_hash")]
        seed: [u8; 32],
        nonce: u64,
        worker_ids: Vec<WorkerId>,
    },
    WorkerMgtChanged {
        old: Option<Address>,
        new: Address,
    },
    QuorumPhaseChanged {
        quorum: QuorumNumber,
        from: QuorumPhase,
        to: QuorumPhase,
    },
    TaskOpened {
        task_id: TaskId,
    },
    TaskCompleted {
        task_id: TaskId,
        submitter: WorkerId,
        audit_index: u64,
    },
    TaskFailed {
        task_id: TaskId,
        submitter: WorkerId,
    },
}

impl RegistryEvent {
    /// Event name as serialized
    pub fn name(&self) -> &'static str {
        match self {
            RegistryEvent::WorkerWhitelisted { .. } => "worker_whitelisted",
            RegistryEvent::WorkerUnwhitelisted { .. } => "worker_unwhitelisted",
            RegistryEvent::WorkerRegistered { .. } => "worker_registered",
            RegistryEvent::WorkerDeregistered { .. } => "worker_deregistered",
            RegistryEvent::StrategiesAdded { .. } => "strategies_added",
            RegistryEvent::StrategiesRemoved { .. } => "strategies_removed",
            RegistryEvent::OperatorSharesUpdated { .. } => "operator_shares_updated",
            RegistryEvent::WorkersSelected { .. } => "workers_selected",
            RegistryEvent::WorkerMgtChanged { .. } => "worker_mgt_changed",
            RegistryEvent::QuorumPhaseChanged { .. } => "quorum_phase_changed",
            RegistryEvent::TaskOpened { .. } => "task_opened",
            RegistryEvent::TaskCompleted { .. } => "task_completed",
            RegistryEvent::TaskFailed { .. } => "task_failed",
        }
    }

    /// Event for a final task status, if any
    pub(crate) fn for_task_status(
        task_id: TaskId,
        status: TaskStatus,
        submitter: WorkerId,
        audit_index: Option<u64>,
    ) -> Option<Self> {
        match (status, audit_index) {
            (TaskStatus::Completed, Some(audit_index)) => Some(RegistryEvent::TaskCompleted {
                task_id,
                submitter,
                audit_index,
            }),
            (TaskStatus::Failed, _) => Some(RegistryEvent::TaskFailed { task_id, submitter }),
            _ => None,
        }
    }
}
