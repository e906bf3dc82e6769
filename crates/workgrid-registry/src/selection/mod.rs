//! Worker selection - nonce-guarded randomized draws
//!
//! This module provides:
//! - Injectable entropy sources
//! - The selection engine owning the nonce
//! - The pure weighted draw used for verification

pub mod engine;
pub mod entropy;

pub use engine::{draw, Candidate, Draw, SelectionEngine, SelectionState};
pub use entropy::{EntropySource, FixedEntropy, OsEntropy, SeededEntropy};
