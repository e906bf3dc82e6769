//! Worker registry - whitelist gate and worker records
//!
//! This module provides:
//! - The whitelist of addresses allowed to register
//! - Worker records keyed by derived worker id
//! - A revision counter bumped whenever the active worker set changes

pub mod workers;

pub use workers::{WhitelistOutcome, WorkerDirectory, WorkerRegistry};
