//! Worker records and whitelist

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use workgrid_common::crypto::derive_worker_id;
use workgrid_common::{Address, RegistryError, Worker, WorkerId};

/// Result of a whitelist insertion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhitelistOutcome {
    Added,
    /// Repeat calls are harmless
    AlreadyWhitelisted,
}

/// Read access to the set of registered workers
///
/// The completion ledger validates submitters through this seam without
/// owning or mutating worker records.
pub trait WorkerDirectory {
    fn is_registered(&self, worker_id: &WorkerId) -> bool;
}

/// Registry of whitelisted addresses and registered workers
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    /// Every worker ever registered, by id
    workers: HashMap<WorkerId, Worker>,
    /// Registration order of all worker ids
    order: Vec<WorkerId>,
    /// Active worker per address
    by_address: HashMap<Address, WorkerId>,
    /// Addresses allowed to register
    whitelist: HashSet<Address>,
    /// Next registration sequence number
    next_sequence: u64,
    /// Bumped whenever the active worker set changes
    revision: u64,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address to the whitelist
    pub fn add_to_whitelist(&mut self, address: Address) -> Result<WhitelistOutcome, RegistryError> {
        if address.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        if self.whitelist.insert(address) {
            debug!(%address, "Address whitelisted");
            Ok(WhitelistOutcome::Added)
        } else {
            Ok(WhitelistOutcome::AlreadyWhitelisted)
        }
    }

    /// Remove an address from the whitelist
    ///
    /// Only future registrations are affected; an active worker stays active.
    pub fn remove_from_whitelist(&mut self, address: &Address) -> bool {
        self.whitelist.remove(address)
    }

    pub fn is_whitelisted(&self, address: &Address) -> bool {
        self.whitelist.contains(address)
    }

    /// Register a whitelisted address as a new worker
    pub fn register_worker(
        &mut self,
        address: Address,
        metadata_ref: String,
    ) -> Result<WorkerId, RegistryError> {
        self.check_can_register(&address)?;

        let sequence = self.next_sequence;
        let worker_id = derive_worker_id(&address, sequence);
        if self.workers.contains_key(&worker_id) {
            return Err(RegistryError::AlreadyRegistered { address, worker_id });
        }

        self.next_sequence += 1;
        self.workers
            .insert(worker_id, Worker::new(worker_id, address, metadata_ref, sequence));
        self.order.push(worker_id);
        self.by_address.insert(address, worker_id);
        self.revision += 1;

        debug!(%address, %worker_id, sequence, "Worker registered");
        Ok(worker_id)
    }

    /// Check registration preconditions without mutating anything
    pub fn check_can_register(&self, address: &Address) -> Result<(), RegistryError> {
        if !self.whitelist.contains(address) {
            return Err(RegistryError::NotWhitelisted(*address));
        }
        if let Some(worker_id) = self.by_address.get(address) {
            return Err(RegistryError::AlreadyRegistered {
                address: *address,
                worker_id: *worker_id,
            });
        }
        Ok(())
    }

    /// Deactivate a worker and free its address
    pub fn deregister_worker(&mut self, worker_id: &WorkerId) -> Result<Worker, RegistryError> {
        let worker = self
            .workers
            .get_mut(worker_id)
            .filter(|w| w.registered)
            .ok_or(RegistryError::NotFound(*worker_id))?;

        worker.registered = false;
        let address = worker.address;
        let snapshot = worker.clone();
        self.by_address.remove(&address);
        self.revision += 1;

        debug!(%address, %worker_id, "Worker deregistered");
        Ok(self.with_whitelist_flag(snapshot))
    }

    /// All active workers in registration order
    pub fn get_workers(&self) -> Vec<Worker> {
        self.active()
            .map(|w| self.with_whitelist_flag(w.clone()))
            .collect()
    }

    /// Ids of all active workers in registration order
    pub fn get_worker_ids(&self) -> Vec<WorkerId> {
        self.active().map(|w| w.worker_id).collect()
    }

    /// Look up a worker record, active or not
    pub fn get_worker_by_id(&self, worker_id: &WorkerId) -> Result<Worker, RegistryError> {
        self.workers
            .get(worker_id)
            .map(|w| self.with_whitelist_flag(w.clone()))
            .ok_or(RegistryError::NotFound(*worker_id))
    }

    pub fn check_worker_registered(&self, worker_id: &WorkerId) -> bool {
        self.workers.get(worker_id).map_or(false, |w| w.registered)
    }

    /// Active worker id for an address
    pub fn worker_id_of(&self, address: &Address) -> Option<WorkerId> {
        self.by_address.get(address).copied()
    }

    /// Iterate active workers in registration order
    pub fn active(&self) -> impl Iterator<Item = &Worker> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.workers.get(id))
            .filter(|w| w.registered)
    }

    pub fn active_count(&self) -> usize {
        self.by_address.len()
    }

    pub fn whitelist_len(&self) -> usize {
        self.whitelist.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn with_whitelist_flag(&self, mut worker: Worker) -> Worker {
        worker.whitelisted = self.whitelist.contains(&worker.address);
        worker
    }
}

impl WorkerDirectory for WorkerRegistry {
    fn is_registered(&self, worker_id: &WorkerId) -> bool {
        self.check_worker_registered(worker_id)
    }
}
