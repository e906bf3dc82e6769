//! Deterministic BLAKE3 derivations
//!
//! Each derivation is domain-separated so a worker id can never collide
//! with a selection seed built from the same bytes.

use crate::types::address::Address;
use crate::types::ids::WorkerId;

const WORKER_ID_DOMAIN: &[u8] = b"workgrid.worker-id.v1";
const SEED_DOMAIN: &[u8] = b"workgrid.selection-seed.v1";
const SUB_SEED_DOMAIN: &[u8] = b"workgrid.selection-draw.v1";

/// Derive a worker id from its address and registration sequence
pub fn derive_worker_id(address: &Address, sequence: u64) -> WorkerId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(WORKER_ID_DOMAIN);
    hasher.update(address.as_bytes());
    hasher.update(&sequence.to_le_bytes());
    WorkerId(*hasher.finalize().as_bytes())
}

/// Derive a selection seed from external entropy and the current nonce
pub fn derive_seed(entropy: &[u8], nonce: u64) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SEED_DOMAIN);
    hasher.update(&(entropy.len() as u64).to_le_bytes());
    hasher.update(entropy);
    hasher.update(&nonce.to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Derive the sub-seed for one draw of a selection
pub fn derive_sub_seed(seed: &[u8; 32], draw_index: u32) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(SUB_SEED_DOMAIN);
    hasher.update(seed);
    hasher.update(&draw_index.to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// Interpret the first 16 bytes of a seed as a little-endian integer
#[inline]
pub fn seed_to_u128(seed: &[u8; 32]) -> u128 {
    let mut buf = [0u8; 16];
    buf.copy_from_slice(&seed[..16]);
    u128::from_le_bytes(buf)
}
