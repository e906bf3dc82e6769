//! Weighted draw without replacement
//!
//! A selection derives `seed = H(entropy, nonce)` and advances the nonce
//! before anything can fail, so a retried request never reuses a seed. Draw
//! `i` maps `H(seed, i)` into the residual weight range and binary-searches
//! the cumulative table of the workers still in the pool. Identical
//! candidates, nonce and entropy reproduce the same draw exactly.

use serde::{Deserialize, Serialize};
use tracing::debug;
use workgrid_common::crypto::{derive_seed, derive_sub_seed, seed_to_u128};
use workgrid_common::{SelectionError, WorkerId};

use super::entropy::EntropySource;

/// Nonce and last consumed seed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub nonce: u64,
    /// Audit only
    pub last_random_seed: Option<[u8; 32]>,
}

/// Eligible worker with its selection weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub worker_id: WorkerId,
    #[serde(with = "workgrid_common::types::encoding::u128_string")]
    pub weight: u128,
}

impl Candidate {
    pub fn new(worker_id: WorkerId, weight: u128) -> Self {
        Self { worker_id, weight }
    }

    /// Equal-weight candidate for uniform selection
    pub fn uniform(worker_id: WorkerId) -> Self {
        Self::new(worker_id, 1)
    }
}

/// Outcome of a successful draw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draw {
    pub seed: [u8; 32],
    /// Nonce consumed by this draw
    pub nonce: u64,
    pub worker_ids: Vec<WorkerId>,
}

/// Owner and sole mutator of the selection nonce
#[derive(Debug, Clone, Default)]
pub struct SelectionEngine {
    state: SelectionState,
}

impl SelectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a known nonce
    pub fn with_nonce(nonce: u64) -> Self {
        Self {
            state: SelectionState {
                nonce,
                last_random_seed: None,
            },
        }
    }

    pub fn nonce(&self) -> u64 {
        self.state.nonce
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    /// Consume entropy and the current nonce, then advance the nonce
    pub fn next_seed(&mut self, entropy: &dyn EntropySource) -> ([u8; 32], u64) {
        let nonce = self.state.nonce;
        let seed = derive_seed(&entropy.next_entropy(), nonce);
        self.state.nonce = nonce.wrapping_add(1);
        self.state.last_random_seed = Some(seed);
        (seed, nonce)
    }

    /// Draw `count` distinct workers
    ///
    /// The nonce advances exactly once whether or not the draw succeeds.
    pub fn select(
        &mut self,
        entropy: &dyn EntropySource,
        candidates: &[Candidate],
        count: usize,
    ) -> Result<Draw, SelectionError> {
        let (seed, nonce) = self.next_seed(entropy);
        let worker_ids = draw(&seed, candidates, count)?;
        debug!(nonce, selected = worker_ids.len(), "Workers drawn");
        Ok(Draw {
            seed,
            nonce,
            worker_ids,
        })
    }
}

/// Deterministic draw of `count` distinct candidates from a seed
///
/// Zero-weight candidates are not eligible. Never returns a partial result.
pub fn draw(
    seed: &[u8; 32],
    candidates: &[Candidate],
    count: usize,
) -> Result<Vec<WorkerId>, SelectionError> {
    if count == 0 {
        return Err(SelectionError::InvalidCount);
    }

    let mut pool: Vec<Candidate> = candidates.iter().filter(|c| c.weight > 0).copied().collect();
    if count > pool.len() {
        return Err(SelectionError::InsufficientWorkers {
            requested: count,
            eligible: pool.len(),
        });
    }

    let mut selected = Vec::with_capacity(count);
    for draw_index in 0..count {
        let cumulative = cumulative_weights(&pool);
        let total = cumulative.last().copied().unwrap_or(0);
        if total == 0 {
            return Err(SelectionError::InsufficientWorkers {
                requested: count,
                eligible: selected.len(),
            });
        }

        let target = seed_to_u128(&derive_sub_seed(seed, draw_index as u32)) % total;
        let position = cumulative.partition_point(|&bound| bound <= target);
        selected.push(pool.remove(position).worker_id);
    }

    Ok(selected)
}

/// Running sums of weights
///
/// When the pool total does not fit in a `u128`, every weight is shifted
/// right by the smallest amount that makes it fit. Non-zero weights never
/// drop below 1, so every candidate stays drawable and proportions are kept
/// up to rounding.
fn cumulative_weights(pool: &[Candidate]) -> Vec<u128> {
    (0..u128::BITS)
        .find_map(|shift| {
            pool.iter().try_fold(Vec::<u128>::with_capacity(pool.len()), |mut sums, c| {
                let scaled = if c.weight == 0 { 0 } else { (c.weight >> shift).max(1) };
                let total = sums.last().copied().unwrap_or(0).checked_add(scaled)?;
                sums.push(total);
                Some(sums)
            })
        })
        .unwrap_or_default()
}
