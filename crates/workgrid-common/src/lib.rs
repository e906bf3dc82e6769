//! # Workgrid Common
//!
//! Shared identifiers, records, errors, and hashing primitives for the
//! Workgrid worker registry.
//!
//! ## Core Types
//!
//! - [`Address`]: 20-byte account identity used for payouts and signing
//! - [`WorkerId`]: 32-byte identifier derived at registration
//! - [`StrategyId`]: identifier of a stake-bearing strategy
//! - [`Worker`]: registered worker record
//! - [`StrategyParams`]/[`StrategyEntry`]: weighted strategy list entries
//! - [`TaskCompletionRecord`]: completion tuple kept per task
//!
//! ## Crypto
//!
//! - [`crypto::hash`]: BLAKE3 derivations for worker ids and selection seeds
//! - [`crypto::merkle`]: Merkle tree for the completion audit trail

pub mod crypto;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{
    ErrorKind, LedgerError, RegistryError, Result, SelectionError, StrategyError, WorkgridError,
};
pub use types::{
    address::{Address, StrategyId},
    ids::{TaskId, WorkerId},
    strategy::{StrategyEntry, StrategyParams},
    task::{TaskCompletionRecord, TaskStatus},
    worker::Worker,
};

/// Workgrid version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Small non-negative integer identifying a quorum
pub type QuorumNumber = u8;

/// Raw amount of shares an operator holds in a strategy
pub type Shares = u128;

/// Weight multiplier applied to the raw shares of a strategy
pub type Multiplier = u128;
