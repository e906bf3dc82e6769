//! Error types for Workgrid
//!
//! Provides a unified error type, per-component error variants, and a flat
//! [`ErrorKind`] for reporting across the typed API.

use crate::types::address::Address;
use crate::types::ids::{TaskId, WorkerId};
use crate::QuorumNumber;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using WorkgridError
pub type Result<T> = std::result::Result<T, WorkgridError>;

/// Unified error type for Workgrid operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkgridError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Invalid identifier: {0}")]
    Identifier(#[from] IdentifierError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Worker registry errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Address {0} is not whitelisted")]
    NotWhitelisted(Address),

    #[error("Address {address} is already registered as worker {worker_id}")]
    AlreadyRegistered { address: Address, worker_id: WorkerId },

    #[error("Worker not found: {0}")]
    NotFound(WorkerId),

    #[error("Zero address cannot be whitelisted or registered")]
    ZeroAddress,
}

/// Strategy table errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("Index {index} out of range for quorum {quorum} (length {len})")]
    IndexOutOfRange {
        quorum: QuorumNumber,
        index: usize,
        len: usize,
    },

    #[error("Multiplier must be positive")]
    InvalidMultiplier,

    #[error("Strategy {strategy} already present in quorum {quorum}")]
    DuplicateStrategy { quorum: QuorumNumber, strategy: String },

    #[error("Index {index} listed more than once")]
    DuplicateIndex { index: usize },

    #[error("No strategies or indices provided")]
    EmptyInput,
}

/// Worker selection errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Insufficient workers: requested {requested}, eligible {eligible}")]
    InsufficientWorkers { requested: usize, eligible: usize },

    #[error("Registry changed since snapshot (snapshot {snapshot}, current {current})")]
    StaleSnapshot { snapshot: String, current: String },

    #[error("Selection count must be positive")]
    InvalidCount,
}

/// Task completion ledger errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Submitter {0} is not a registered worker")]
    UnknownWorker(WorkerId),

    #[error("Task {0} is already completed")]
    AlreadyCompleted(TaskId),

    #[error("No completed record for task {0}")]
    NotFound(TaskId),
}

/// Identifier parsing errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentifierError {
    #[error("Expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Flat error classification exposed to API callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotWhitelisted,
    AlreadyRegistered,
    NotFound,
    IndexOutOfRange,
    InvalidMultiplier,
    DuplicateStrategy,
    DuplicateIndex,
    EmptyInput,
    InsufficientWorkers,
    StaleSnapshot,
    InvalidCount,
    UnknownWorker,
    AlreadyCompleted,
    InvalidInput,
    Config,
    Internal,
}

impl WorkgridError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkgridError::Registry(e) => match e {
                RegistryError::NotWhitelisted(_) => ErrorKind::NotWhitelisted,
                RegistryError::AlreadyRegistered { .. } => ErrorKind::AlreadyRegistered,
                RegistryError::NotFound(_) => ErrorKind::NotFound,
                RegistryError::ZeroAddress => ErrorKind::InvalidInput,
            },
            WorkgridError::Strategy(e) => match e {
                StrategyError::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
                StrategyError::InvalidMultiplier => ErrorKind::InvalidMultiplier,
                StrategyError::DuplicateStrategy { .. } => ErrorKind::DuplicateStrategy,
                StrategyError::DuplicateIndex { .. } => ErrorKind::DuplicateIndex,
                StrategyError::EmptyInput => ErrorKind::EmptyInput,
            },
            WorkgridError::Selection(e) => match e {
                SelectionError::InsufficientWorkers { .. } => ErrorKind::InsufficientWorkers,
                SelectionError::StaleSnapshot { .. } => ErrorKind::StaleSnapshot,
                SelectionError::InvalidCount => ErrorKind::InvalidCount,
            },
            WorkgridError::Ledger(e) => match e {
                LedgerError::UnknownWorker(_) => ErrorKind::UnknownWorker,
                LedgerError::AlreadyCompleted(_) => ErrorKind::AlreadyCompleted,
                LedgerError::NotFound(_) => ErrorKind::NotFound,
            },
            WorkgridError::Identifier(_) | WorkgridError::Serialization(_) => {
                ErrorKind::InvalidInput
            }
            WorkgridError::Config(_) => ErrorKind::Config,
            WorkgridError::Internal(_) => ErrorKind::Internal,
        }
    }
}

// Implement From for common external error types
impl From<serde_json::Error> for WorkgridError {
    fn from(err: serde_json::Error) -> Self {
        WorkgridError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for WorkgridError {
    fn from(err: anyhow::Error) -> Self {
        WorkgridError::Internal(err.to_string())
    }
}
