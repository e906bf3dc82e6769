//! Quorum coordinator
//!
//! Owns the registry, strategy table, operator stakes and selection engine
//! and is the only path through which they are mutated, so quorum phases and
//! snapshot versions are always re-evaluated after a change.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use workgrid_common::types::encoding::hex_hash;
use workgrid_common::{
    Address, QuorumNumber, RegistryError, SelectionError, StrategyEntry, StrategyError,
    StrategyId, StrategyParams, Worker, WorkerId,
};

use super::phase::{PhaseChange, QuorumPhase};
use crate::registry::{WhitelistOutcome, WorkerRegistry};
use crate::selection::{draw, Candidate, EntropySource, SelectionEngine};
use crate::strategy::{OperatorStakes, RestakeableScope, ShareUpdate, StakeUpdate, StrategyTable};

/// Coordinator policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Quorums drawing by stake weight; all others draw uniformly
    pub weighted_quorums: BTreeSet<QuorumNumber>,
    pub detect_stale_snapshots: bool,
    pub restakeable_scope: RestakeableScope,
    pub worker_mgt_address: Option<Address>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            weighted_quorums: BTreeSet::new(),
            detect_stale_snapshots: true,
            restakeable_scope: RestakeableScope::AllQuorums,
            worker_mgt_address: None,
        }
    }
}

/// Revisions of every input to candidate computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotVersion {
    pub registry: u64,
    pub strategies: u64,
    pub stakes: u64,
}

impl fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "registry={} strategies={} stakes={}",
            self.registry, self.strategies, self.stakes
        )
    }
}

/// Candidate list captured for a later draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    pub quorum: QuorumNumber,
    pub version: SnapshotVersion,
    pub candidates: Vec<Candidate>,
}

/// Result of a successful selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub quorum: QuorumNumber,
    #[serde(with = "hex_hash")]
    pub seed: [u8; 32],
    /// Nonce consumed by this selection
    pub nonce: u64,
    pub worker_ids: Vec<WorkerId>,
    /// Worker management address in effect when the draw happened
    pub worker_mgt: Option<Address>,
}

/// Operator newly registered by a stake notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredOperator {
    pub address: Address,
    pub worker_id: WorkerId,
}

/// How each notified operator was handled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorUpdateReport {
    pub registered: Vec<RegisteredOperator>,
    pub already_registered: Vec<Address>,
    pub without_stake: Vec<Address>,
}

/// Central state machine over registry, strategies, stakes and nonce
#[derive(Debug, Clone, Default)]
pub struct QuorumCoordinator {
    registry: WorkerRegistry,
    strategies: StrategyTable,
    stakes: OperatorStakes,
    engine: SelectionEngine,
    settings: CoordinatorSettings,
    phases: BTreeMap<QuorumNumber, QuorumPhase>,
    /// Transitions not yet taken by the caller
    phase_changes: Vec<PhaseChange>,
}

impl QuorumCoordinator {
    pub fn new(settings: CoordinatorSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    // ---- Registry ----

    pub fn add_to_whitelist(&mut self, address: Address) -> Result<WhitelistOutcome, RegistryError> {
        self.registry.add_to_whitelist(address)
    }

    pub fn remove_from_whitelist(&mut self, address: &Address) -> bool {
        self.registry.remove_from_whitelist(address)
    }

    pub fn register_worker(
        &mut self,
        address: Address,
        metadata_ref: String,
    ) -> Result<WorkerId, RegistryError> {
        let worker_id = self.registry.register_worker(address, metadata_ref)?;
        self.refresh_phases();
        Ok(worker_id)
    }

    pub fn deregister_worker(&mut self, worker_id: &WorkerId) -> Result<Worker, RegistryError> {
        let worker = self.registry.deregister_worker(worker_id)?;
        self.refresh_phases();
        Ok(worker)
    }

    // ---- Strategies ----

    pub fn add_strategies(
        &mut self,
        quorum: QuorumNumber,
        params: &[StrategyParams],
    ) -> Result<Range<usize>, StrategyError> {
        let range = self.strategies.add_strategies(quorum, params)?;
        self.refresh_phases();
        Ok(range)
    }

    pub fn remove_strategies(
        &mut self,
        quorum: QuorumNumber,
        indices: &[usize],
    ) -> Result<Vec<StrategyEntry>, StrategyError> {
        let removed = self.strategies.remove_strategies(quorum, indices)?;
        self.refresh_phases();
        Ok(removed)
    }

    /// Flat strategy list, using the configured scope unless one is given
    pub fn restakeable_strategies(&self, scope: Option<RestakeableScope>) -> Vec<StrategyId> {
        self.strategies
            .restakeable_strategies(scope.unwrap_or(self.settings.restakeable_scope))
    }

    // ---- Stakes ----

    pub fn set_operator_shares(&mut self, operator: Address, updates: &[ShareUpdate]) {
        self.stakes.set_operator_shares(operator, updates);
        self.refresh_phases();
    }

    /// Register every listed operator that now carries stake
    ///
    /// Already registered operators and operators without stake in any
    /// quorum's strategies are reported, not registered. If any operator
    /// that would be registered is not whitelisted the whole call fails and
    /// nothing is registered.
    pub fn update_operators(
        &mut self,
        operators: &[Address],
    ) -> Result<OperatorUpdateReport, RegistryError> {
        let mut seen = HashSet::new();
        let known_strategies = self.strategies.all_strategies();
        let mut report = OperatorUpdateReport::default();
        let mut to_register = Vec::new();

        for &operator in operators.iter().filter(|a| seen.insert(**a)) {
            if self.registry.worker_id_of(&operator).is_some() {
                report.already_registered.push(operator);
            } else if !self.stakes.has_stake_in(&operator, &known_strategies) {
                report.without_stake.push(operator);
            } else {
                if let Err(e) = self.registry.check_can_register(&operator) {
                    debug!(%operator, "Staked operator cannot be registered");
                    return Err(e);
                }
                to_register.push(operator);
            }
        }

        for operator in to_register {
            let worker_id = self.registry.register_worker(operator, String::new())?;
            report.registered.push(RegisteredOperator {
                address: operator,
                worker_id,
            });
        }
        self.refresh_phases();

        debug!(
            registered = report.registered.len(),
            already_registered = report.already_registered.len(),
            without_stake = report.without_stake.len(),
            "Operators reconciled"
        );
        Ok(report)
    }

    /// Apply share updates then reconcile the touched operators
    ///
    /// Stakes are restored if reconciliation fails.
    pub fn apply_stake_updates(
        &mut self,
        updates: &[StakeUpdate],
    ) -> Result<OperatorUpdateReport, RegistryError> {
        let saved = self.stakes.clone();
        for update in updates {
            self.stakes.set_operator_shares(update.operator, &update.shares);
        }

        let operators: Vec<Address> = updates.iter().map(|u| u.operator).collect();
        match self.update_operators(&operators) {
            Ok(report) => Ok(report),
            Err(e) => {
                self.stakes = saved;
                self.refresh_phases();
                Err(e)
            }
        }
    }

    // ---- Worker management ----

    pub fn worker_mgt_address(&self) -> Option<Address> {
        self.settings.worker_mgt_address
    }

    /// Replace the worker management address, returning the previous one
    ///
    /// Applies to selections made after this call only.
    pub fn set_worker_mgt_address(
        &mut self,
        address: Address,
    ) -> Result<Option<Address>, RegistryError> {
        if address.is_zero() {
            return Err(RegistryError::ZeroAddress);
        }
        let old = self.settings.worker_mgt_address.replace(address);
        info!(old = ?old, new = %address, "Worker management address changed");
        Ok(old)
    }

    // ---- Selection ----

    pub fn is_weighted(&self, quorum: QuorumNumber) -> bool {
        self.settings.weighted_quorums.contains(&quorum)
    }

    /// Eligible workers of a quorum in registration order
    ///
    /// A quorum without strategies has no eligible workers. Under weighted
    /// selection workers without stake in the quorum are excluded.
    pub fn candidates(&self, quorum: QuorumNumber) -> Vec<Candidate> {
        if self.strategies.strategy_count(quorum) == 0 {
            return Vec::new();
        }

        let weighted = self.is_weighted(quorum);
        self.registry
            .active()
            .map(|worker| {
                if weighted {
                    let weight = self
                        .strategies
                        .weight_of(quorum, |s| self.stakes.shares_of(&worker.address, s));
                    Candidate::new(worker.worker_id, weight)
                } else {
                    Candidate::uniform(worker.worker_id)
                }
            })
            .filter(|c| c.weight > 0)
            .collect()
    }

    pub fn version(&self) -> SnapshotVersion {
        SnapshotVersion {
            registry: self.registry.revision(),
            strategies: self.strategies.revision(),
            stakes: self.stakes.revision(),
        }
    }

    pub fn snapshot(&self, quorum: QuorumNumber) -> SelectionSnapshot {
        SelectionSnapshot {
            quorum,
            version: self.version(),
            candidates: self.candidates(quorum),
        }
    }

    /// Draw from the live state of a quorum
    pub fn select_workers(
        &mut self,
        entropy: &dyn EntropySource,
        quorum: QuorumNumber,
        count: usize,
    ) -> Result<Selection, SelectionError> {
        let candidates = self.candidates(quorum);
        let result = self.engine.select(entropy, &candidates, count)?;
        Ok(Selection {
            quorum,
            seed: result.seed,
            nonce: result.nonce,
            worker_ids: result.worker_ids,
            worker_mgt: self.settings.worker_mgt_address,
        })
    }

    /// Draw from a previously taken snapshot
    ///
    /// The nonce advances first. The draw always runs over the live
    /// candidates; the snapshot only pins what the caller expects them to be.
    /// A snapshot whose version or candidate list no longer matches fails
    /// with `StaleSnapshot` when detection is on; otherwise the live
    /// candidates are used as is.
    pub fn select_from_snapshot(
        &mut self,
        entropy: &dyn EntropySource,
        snapshot: &SelectionSnapshot,
        count: usize,
    ) -> Result<Selection, SelectionError> {
        let (seed, nonce) = self.engine.next_seed(entropy);

        let current = self.version();
        let live = self.candidates(snapshot.quorum);
        let matches = snapshot.version == current && snapshot.candidates == live;
        if !matches && self.settings.detect_stale_snapshots {
            if snapshot.version == current {
                debug!(quorum = snapshot.quorum, "Snapshot candidates differ from registry");
            }
            return Err(SelectionError::StaleSnapshot {
                snapshot: snapshot.version.to_string(),
                current: current.to_string(),
            });
        }

        let worker_ids = draw(&seed, &live, count)?;
        Ok(Selection {
            quorum: snapshot.quorum,
            seed,
            nonce,
            worker_ids,
            worker_mgt: self.settings.worker_mgt_address,
        })
    }

    pub fn nonce(&self) -> u64 {
        self.engine.nonce()
    }

    // ---- Phases ----

    pub fn quorum_phase(&self, quorum: QuorumNumber) -> QuorumPhase {
        self.phases.get(&quorum).copied().unwrap_or_default()
    }

    /// Transitions recorded since the last call
    pub fn take_phase_changes(&mut self) -> Vec<PhaseChange> {
        std::mem::take(&mut self.phase_changes)
    }

    fn refresh_phases(&mut self) {
        let quorums: BTreeSet<QuorumNumber> = self
            .strategies
            .quorum_numbers()
            .into_iter()
            .chain(self.phases.keys().copied())
            .collect();

        for quorum in quorums {
            let from = self.quorum_phase(quorum);
            let has_strategies = self.strategies.strategy_count(quorum) > 0;
            // Eligibility only matters while not yet active
            let has_eligible = from != QuorumPhase::Active
                && has_strategies
                && !self.candidates(quorum).is_empty();
            let to = from.next(has_strategies, has_eligible);

            if to == QuorumPhase::Empty {
                self.phases.remove(&quorum);
            } else {
                self.phases.insert(quorum, to);
            }
            if from != to {
                debug!(quorum, %from, %to, "Quorum phase changed");
                self.phase_changes.push(PhaseChange { quorum, from, to });
            }
        }
    }

    // ---- Read access ----

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn strategies(&self) -> &StrategyTable {
        &self.strategies
    }

    pub fn stakes(&self) -> &OperatorStakes {
        &self.stakes
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }
}
