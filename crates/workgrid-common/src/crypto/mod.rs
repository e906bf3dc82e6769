//! Cryptographic primitives for Workgrid
//!
//! This module provides:
//! - BLAKE3 derivations for worker ids and selection seeds
//! - Merkle tree operations for the completion audit trail

pub mod hash;
pub mod merkle;

// Re-export commonly used items
pub use hash::{derive_seed, derive_sub_seed, derive_worker_id, seed_to_u128};
pub use merkle::{MerkleProof, MerkleTree};
