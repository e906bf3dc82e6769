//! Task completion ledger with Merkle audit trail

pub mod completion;

pub use completion::{OpenOutcome, TaskCompletionLedger};
