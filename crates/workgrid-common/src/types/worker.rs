//! Worker records owned by the worker registry

use crate::types::address::Address;
use crate::types::ids::WorkerId;
use serde::{Deserialize, Serialize};

/// A worker known to the registry
///
/// `worker_id` is fixed at registration. `address` is unique among active
/// workers; a deregistered worker keeps its record but frees the address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    /// Opaque identifier derived from address and registration sequence
    pub worker_id: WorkerId,

    /// Payout/signing account
    pub address: Address,

    /// Pointer to off-system descriptive data, opaque to the registry
    pub metadata_ref: String,

    /// True while the worker is active
    pub registered: bool,

    /// Whitelist status of the address at the time the record was read
    pub whitelisted: bool,

    /// Registration sequence number (0-based, never reused)
    pub sequence: u64,

    /// Registration timestamp (Unix milliseconds)
    pub registered_at: i64,
}

impl Worker {
    /// Build a freshly registered worker record
    pub fn new(worker_id: WorkerId, address: Address, metadata_ref: String, sequence: u64) -> Self {
        Self {
            worker_id,
            address,
            metadata_ref,
            registered: true,
            whitelisted: true,
            sequence,
            registered_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.registered
    }
}
