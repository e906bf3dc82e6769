//! Workgrid service facade
//!
//! Every operation funnels through one mutex, giving a single total order
//! over mutations. Entropy is fetched and the nonce advanced inside the same
//! critical section as the draw, so concurrent selections can never observe
//! the same nonce.

use std::ops::Range;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};
use workgrid_common::crypto::MerkleProof;
use workgrid_common::{
    Address, QuorumNumber, Result, Shares, StrategyEntry, StrategyId, StrategyParams,
    TaskCompletionRecord, TaskId, Worker, WorkerId, WorkgridError,
};

use crate::config::WorkgridConfig;
use crate::coordinator::{
    OperatorUpdateReport, QuorumCoordinator, QuorumPhase, Selection, SelectionSnapshot,
};
use crate::events::RegistryEvent;
use crate::ledger::{OpenOutcome, TaskCompletionLedger};
use crate::metrics::{encode_text, RegistryMetrics};
use crate::registry::WhitelistOutcome;
use crate::selection::EntropySource;
use crate::strategy::{RestakeableScope, ShareUpdate, StakeUpdate};

/// State guarded by the service lock
struct WorkgridState {
    coordinator: QuorumCoordinator,
    ledger: TaskCompletionLedger,
}

/// Serialized entry point to the registry, selection and ledger
pub struct Workgrid {
    state: Mutex<WorkgridState>,
    entropy: Arc<dyn EntropySource>,
    events: broadcast::Sender<RegistryEvent>,
    metrics: Arc<RegistryMetrics>,
    metrics_registry: prometheus::Registry,
    config: WorkgridConfig,
}

impl Workgrid {
    pub fn new(config: WorkgridConfig, entropy: Arc<dyn EntropySource>) -> Result<Self> {
        let metrics = RegistryMetrics::new().map_err(|e| WorkgridError::Internal(e.to_string()))?;
        let metrics_registry = prometheus::Registry::new();
        metrics
            .register(&metrics_registry)
            .map_err(|e| WorkgridError::Internal(e.to_string()))?;

        let (events, _) = broadcast::channel(config.events.channel_capacity.max(1));

        Ok(Self {
            state: Mutex::new(WorkgridState {
                coordinator: QuorumCoordinator::new(config.coordinator_settings()),
                ledger: TaskCompletionLedger::new(),
            }),
            entropy,
            events,
            metrics: Arc::new(metrics),
            metrics_registry,
            config,
        })
    }

    /// Whitelist the configured bootstrap addresses
    pub fn apply_bootstrap(&self) -> Result<usize> {
        let mut added = 0;
        for address in self.config.bootstrap.whitelist.clone() {
            if self.add_to_whitelist(address)? == WhitelistOutcome::Added {
                added += 1;
            }
        }
        info!(added, "Bootstrap whitelist applied");
        Ok(added)
    }

    /// Receive events for every committed change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &WorkgridConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<RegistryMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Metrics in the Prometheus text format
    pub fn metrics_text(&self) -> Result<String> {
        encode_text(&self.metrics_registry).map_err(|e| WorkgridError::Internal(e.to_string()))
    }

    // ---- Worker registry ----

    #[instrument(skip(self))]
    pub fn add_to_whitelist(&self, address: Address) -> Result<WhitelistOutcome> {
        let mut state = self.state.lock();
        let outcome = state
            .coordinator
            .add_to_whitelist(address)
            .map_err(|e| rejected("add_to_whitelist", e))?;

        if outcome == WhitelistOutcome::Added {
            info!(%address, "Address whitelisted");
            self.publish(&mut state, [RegistryEvent::WorkerWhitelisted { address }]);
        }
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub fn remove_from_whitelist(&self, address: Address) -> bool {
        let mut state = self.state.lock();
        let removed = state.coordinator.remove_from_whitelist(&address);
        if removed {
            info!(%address, "Address removed from whitelist");
            self.publish(&mut state, [RegistryEvent::WorkerUnwhitelisted { address }]);
        }
        removed
    }

    pub fn is_whitelisted(&self, address: &Address) -> bool {
        self.state.lock().coordinator.registry().is_whitelisted(address)
    }

    #[instrument(skip(self))]
    pub fn register_worker(&self, address: Address, metadata_ref: String) -> Result<WorkerId> {
        let mut state = self.state.lock();
        let worker_id = state
            .coordinator
            .register_worker(address, metadata_ref)
            .map_err(|e| rejected("register_worker", e))?;

        info!(%address, %worker_id, "Worker registered");
        self.publish(
            &mut state,
            [RegistryEvent::WorkerRegistered { worker_id, address }],
        );
        Ok(worker_id)
    }

    #[instrument(skip(self))]
    pub fn deregister_worker(&self, worker_id: WorkerId) -> Result<Worker> {
        let mut state = self.state.lock();
        let worker = state
            .coordinator
            .deregister_worker(&worker_id)
            .map_err(|e| rejected("deregister_worker", e))?;

        info!(%worker_id, address = %worker.address, "Worker deregistered");
        self.publish(
            &mut state,
            [RegistryEvent::WorkerDeregistered {
                worker_id,
                address: worker.address,
            }],
        );
        Ok(worker)
    }

    pub fn get_workers(&self) -> Vec<Worker> {
        self.state.lock().coordinator.registry().get_workers()
    }

    pub fn get_worker_ids(&self) -> Vec<WorkerId> {
        self.state.lock().coordinator.registry().get_worker_ids()
    }

    pub fn get_worker_by_id(&self, worker_id: &WorkerId) -> Result<Worker> {
        Ok(self.state.lock().coordinator.registry().get_worker_by_id(worker_id)?)
    }

    pub fn check_worker_registered(&self, worker_id: &WorkerId) -> bool {
        self.state
            .lock()
            .coordinator
            .registry()
            .check_worker_registered(worker_id)
    }

    // ---- Strategy table ----

    #[instrument(skip(self))]
    pub fn add_strategies(
        &self,
        quorum: QuorumNumber,
        strategies: Vec<StrategyParams>,
    ) -> Result<Range<usize>> {
        let mut state = self.state.lock();
        let range = state
            .coordinator
            .add_strategies(quorum, &strategies)
            .map_err(|e| rejected("add_strategies", e))?;

        info!(quorum, first_index = range.start, count = range.len(), "Strategies added");
        self.publish(
            &mut state,
            [RegistryEvent::StrategiesAdded {
                quorum,
                first_index: range.start,
                strategies,
            }],
        );
        Ok(range)
    }

    /// Remove strategies by their indices before this call
    ///
    /// Later entries shift down; indices read earlier must be re-fetched.
    #[instrument(skip(self))]
    pub fn remove_strategies(
        &self,
        quorum: QuorumNumber,
        indices: Vec<usize>,
    ) -> Result<Vec<StrategyEntry>> {
        let mut state = self.state.lock();
        let removed = state
            .coordinator
            .remove_strategies(quorum, &indices)
            .map_err(|e| rejected("remove_strategies", e))?;

        info!(quorum, count = removed.len(), "Strategies removed");
        self.publish(
            &mut state,
            [RegistryEvent::StrategiesRemoved {
                quorum,
                removed: removed.clone(),
            }],
        );
        Ok(removed)
    }

    pub fn strategy_params_by_index(
        &self,
        quorum: QuorumNumber,
        index: usize,
    ) -> Result<StrategyEntry> {
        Ok(self
            .state
            .lock()
            .coordinator
            .strategies()
            .strategy_params_by_index(quorum, index)?)
    }

    pub fn strategies(&self, quorum: QuorumNumber) -> Vec<StrategyEntry> {
        self.state.lock().coordinator.strategies().strategies(quorum)
    }

    /// Flat restakeable list; `None` uses the configured scope
    pub fn get_restakeable_strategies(&self, scope: Option<RestakeableScope>) -> Vec<StrategyId> {
        self.state.lock().coordinator.restakeable_strategies(scope)
    }

    // ---- Stakes and operators ----

    #[instrument(skip(self))]
    pub fn set_operator_shares(&self, operator: Address, shares: Vec<ShareUpdate>) {
        let mut state = self.state.lock();
        state.coordinator.set_operator_shares(operator, &shares);
        self.publish(
            &mut state,
            [RegistryEvent::OperatorSharesUpdated { operator, shares }],
        );
    }

    pub fn get_operator_shares(&self, operator: &Address, strategies: &[StrategyId]) -> Vec<Shares> {
        self.state
            .lock()
            .coordinator
            .stakes()
            .get_operator_shares(operator, strategies)
    }

    /// Register listed operators that now carry stake
    #[instrument(skip(self))]
    pub fn update_operators(&self, operators: Vec<Address>) -> Result<OperatorUpdateReport> {
        let mut state = self.state.lock();
        let report = state
            .coordinator
            .update_operators(&operators)
            .map_err(|e| rejected("update_operators", e))?;

        info!(
            registered = report.registered.len(),
            without_stake = report.without_stake.len(),
            "Operators updated"
        );
        let events = registered_events(&report);
        self.publish(&mut state, events);
        Ok(report)
    }

    /// Apply a stake notification and reconcile as one atomic step
    #[instrument(skip(self, updates), fields(operators = updates.len()))]
    pub fn apply_stake_updates(&self, updates: &[StakeUpdate]) -> Result<OperatorUpdateReport> {
        let mut state = self.state.lock();
        let report = state
            .coordinator
            .apply_stake_updates(updates)
            .map_err(|e| rejected("apply_stake_updates", e))?;

        let mut events: Vec<RegistryEvent> = updates
            .iter()
            .map(|u| RegistryEvent::OperatorSharesUpdated {
                operator: u.operator,
                shares: u.shares.clone(),
            })
            .collect();
        events.extend(registered_events(&report));
        self.publish(&mut state, events);
        Ok(report)
    }

    pub fn get_worker_mgt_address(&self) -> Option<Address> {
        self.state.lock().coordinator.worker_mgt_address()
    }

    #[instrument(skip(self))]
    pub fn set_worker_mgt_address(&self, address: Address) -> Result<Option<Address>> {
        let mut state = self.state.lock();
        let old = state
            .coordinator
            .set_worker_mgt_address(address)
            .map_err(|e| rejected("set_worker_mgt_address", e))?;
        self.publish(
            &mut state,
            [RegistryEvent::WorkerMgtChanged { old, new: address }],
        );
        Ok(old)
    }

    // ---- Selection ----

    /// Select from the default quorum
    pub fn select_workers(&self, count: usize) -> Result<Selection> {
        self.select_workers_for_quorum(self.config.selection.default_quorum, count)
    }

    #[instrument(skip(self))]
    pub fn select_workers_for_quorum(&self, quorum: QuorumNumber, count: usize) -> Result<Selection> {
        let mut state = self.state.lock();
        let result = state
            .coordinator
            .select_workers(self.entropy.as_ref(), quorum, count);
        self.finish_selection(&mut state, result)
    }

    pub fn snapshot(&self, quorum: QuorumNumber) -> SelectionSnapshot {
        self.state.lock().coordinator.snapshot(quorum)
    }

    #[instrument(skip(self, snapshot), fields(quorum = snapshot.quorum))]
    pub fn select_from_snapshot(
        &self,
        snapshot: &SelectionSnapshot,
        count: usize,
    ) -> Result<Selection> {
        let mut state = self.state.lock();
        let result = state
            .coordinator
            .select_from_snapshot(self.entropy.as_ref(), snapshot, count);
        self.finish_selection(&mut state, result)
    }

    pub fn get_nonce(&self) -> u64 {
        self.state.lock().coordinator.nonce()
    }

    pub fn quorum_phase(&self, quorum: QuorumNumber) -> QuorumPhase {
        self.state.lock().coordinator.quorum_phase(quorum)
    }

    // ---- Task ledger ----

    #[instrument(skip(self))]
    pub fn open_task(&self, task_id: TaskId) -> Result<TaskCompletionRecord> {
        let mut state = self.state.lock();
        let outcome = state
            .ledger
            .open_task(task_id)
            .map_err(|e| rejected("open_task", e))?;

        match outcome {
            OpenOutcome::Opened(record) => {
                self.publish(&mut state, [RegistryEvent::TaskOpened { task_id }]);
                Ok(record)
            }
            OpenOutcome::Existing(record) => Ok(record),
        }
    }

    #[instrument(skip(self, result_payload), fields(payload_len = result_payload.len()))]
    pub fn submit_completion(
        &self,
        task_id: TaskId,
        submitter: WorkerId,
        result_payload: Vec<u8>,
    ) -> Result<TaskCompletionRecord> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let record = state
            .ledger
            .submit_completion(state.coordinator.registry(), task_id, submitter, result_payload)
            .map_err(|e| rejected("submit_completion", e))?;

        info!(%task_id, %submitter, audit_index = ?record.audit_index, "Task completed");
        self.metrics.tasks_completed_total.inc();
        let event =
            RegistryEvent::for_task_status(task_id, record.status, submitter, record.audit_index);
        self.publish(state, event);
        Ok(record)
    }

    #[instrument(skip(self, result_payload), fields(payload_len = result_payload.len()))]
    pub fn submit_failure(
        &self,
        task_id: TaskId,
        submitter: WorkerId,
        result_payload: Vec<u8>,
    ) -> Result<TaskCompletionRecord> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let record = state
            .ledger
            .submit_failure(state.coordinator.registry(), task_id, submitter, result_payload)
            .map_err(|e| rejected("submit_failure", e))?;

        info!(%task_id, %submitter, "Task failed");
        self.metrics.tasks_failed_total.inc();
        let event = RegistryEvent::for_task_status(task_id, record.status, submitter, None);
        self.publish(state, event);
        Ok(record)
    }

    pub fn get_completed_task_by_id(&self, task_id: &TaskId) -> Result<TaskCompletionRecord> {
        Ok(self.state.lock().ledger.get_completed_task_by_id(task_id)?)
    }

    pub fn get_task(&self, task_id: &TaskId) -> Result<TaskCompletionRecord> {
        Ok(self.state.lock().ledger.get_task(task_id)?)
    }

    pub fn completion_root(&self) -> Option<[u8; 32]> {
        self.state.lock().ledger.completion_root()
    }

    pub fn completion_proof(&self, task_id: &TaskId) -> Result<MerkleProof> {
        Ok(self.state.lock().ledger.completion_proof(task_id)?)
    }

    // ---- Internals ----

    fn finish_selection(
        &self,
        state: &mut WorkgridState,
        result: std::result::Result<Selection, workgrid_common::SelectionError>,
    ) -> Result<Selection> {
        let nonce = state.coordinator.nonce();
        match result {
            Ok(selection) => {
                self.metrics
                    .observe_selection(Some(selection.worker_ids.len()), nonce);
                info!(
                    quorum = selection.quorum,
                    nonce = selection.nonce,
                    selected = selection.worker_ids.len(),
                    "Workers selected"
                );
                self.publish(
                    state,
                    [RegistryEvent::WorkersSelected {
                        quorum: selection.quorum,
                        seed: selection.seed,
                        nonce: selection.nonce,
                        worker_ids: selection.worker_ids.clone(),
                    }],
                );
                Ok(selection)
            }
            Err(e) => {
                self.metrics.observe_selection(None, nonce);
                Err(rejected("select_workers", e))
            }
        }
    }

    /// Send events for a committed change, then any phase transitions
    ///
    /// Called with the lock held so events keep commit order.
    fn publish<I>(&self, state: &mut WorkgridState, events: I)
    where
        I: IntoIterator<Item = RegistryEvent>,
    {
        let phase_events = state
            .coordinator
            .take_phase_changes()
            .into_iter()
            .map(|p| RegistryEvent::QuorumPhaseChanged {
                quorum: p.quorum,
                from: p.from,
                to: p.to,
            });

        for event in events.into_iter().chain(phase_events) {
            // No subscribers is not an error
            let _ = self.events.send(event);
        }

        let registry = state.coordinator.registry();
        self.metrics
            .whitelisted
            .set(registry.whitelist_len() as i64);
        self.metrics
            .workers_registered
            .set(registry.active_count() as i64);
    }
}

fn registered_events(report: &OperatorUpdateReport) -> Vec<RegistryEvent> {
    report
        .registered
        .iter()
        .map(|r| RegistryEvent::WorkerRegistered {
            worker_id: r.worker_id,
            address: r.address,
        })
        .collect()
}

fn rejected<E: Into<WorkgridError>>(operation: &'static str, err: E) -> WorkgridError {
    let err = err.into();
    warn!(operation, kind = ?err.kind(), error = %err, "Operation rejected");
    err
}
