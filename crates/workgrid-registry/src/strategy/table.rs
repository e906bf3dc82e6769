//! Strategy table
//!
//! Each quorum owns an ordered list of `(strategy, multiplier)` pairs with
//! contiguous indices `[0, len)`. Removal shifts every later entry down by
//! one, so an index read before a removal call must be re-fetched after it.
//! Within a single `remove_strategies` call all indices refer to the list as
//! it was before the call; they are applied highest first so earlier
//! removals cannot disturb later ones.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;
use workgrid_common::{
    QuorumNumber, Shares, StrategyEntry, StrategyError, StrategyId, StrategyParams,
};

/// Which quorums `restakeable_strategies` covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestakeableScope {
    /// Flatten every quorum's list into one
    #[default]
    AllQuorums,
    Quorum(QuorumNumber),
}

impl From<Option<QuorumNumber>> for RestakeableScope {
    fn from(quorum: Option<QuorumNumber>) -> Self {
        quorum.map_or(RestakeableScope::AllQuorums, RestakeableScope::Quorum)
    }
}

/// Per-quorum ordered strategy lists
#[derive(Debug, Clone, Default)]
pub struct StrategyTable {
    quorums: BTreeMap<QuorumNumber, Vec<StrategyParams>>,
    revision: u64,
}

impl StrategyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append strategies at the next contiguous indices
    ///
    /// Returns the index range assigned. Nothing is inserted unless every
    /// entry is valid.
    pub fn add_strategies(
        &mut self,
        quorum: QuorumNumber,
        params: &[StrategyParams],
    ) -> Result<Range<usize>, StrategyError> {
        if params.is_empty() {
            return Err(StrategyError::EmptyInput);
        }

        let existing = self.quorums.get(&quorum);
        let mut seen: HashSet<StrategyId> = existing
            .map(|list| list.iter().map(|p| p.strategy).collect())
            .unwrap_or_default();

        for p in params {
            if p.multiplier == 0 {
                return Err(StrategyError::InvalidMultiplier);
            }
            if !seen.insert(p.strategy) {
                return Err(StrategyError::DuplicateStrategy {
                    quorum,
                    strategy: p.strategy.to_string(),
                });
            }
        }

        let list = self.quorums.entry(quorum).or_default();
        let start = list.len();
        list.extend_from_slice(params);
        let end = list.len();
        self.revision += 1;

        debug!(quorum, added = params.len(), len = end, "Strategies added");
        Ok(start..end)
    }

    /// Remove entries at the given pre-call indices
    ///
    /// Returns the removed entries, each tagged with the index it had before
    /// the call, in the order the caller listed them.
    pub fn remove_strategies(
        &mut self,
        quorum: QuorumNumber,
        indices: &[usize],
    ) -> Result<Vec<StrategyEntry>, StrategyError> {
        if indices.is_empty() {
            return Err(StrategyError::EmptyInput);
        }

        let len = self.strategy_count(quorum);
        let mut unique = BTreeSet::new();
        for &index in indices {
            if index >= len {
                return Err(StrategyError::IndexOutOfRange { quorum, index, len });
            }
            if !unique.insert(index) {
                return Err(StrategyError::DuplicateIndex { index });
            }
        }

        let removed: Vec<StrategyEntry> = indices
            .iter()
            .map(|&index| self.entry_at(quorum, index))
            .collect::<Result<_, _>>()?;

        if let Some(list) = self.quorums.get_mut(&quorum) {
            // Highest first: lower indices stay valid until their turn
            for &index in unique.iter().rev() {
                list.remove(index);
            }
            if list.is_empty() {
                self.quorums.remove(&quorum);
            }
        }
        self.revision += 1;

        debug!(
            quorum,
            removed = removed.len(),
            len = self.strategy_count(quorum),
            "Strategies removed"
        );
        Ok(removed)
    }

    /// Entry at a position of a quorum's list
    pub fn strategy_params_by_index(
        &self,
        quorum: QuorumNumber,
        index: usize,
    ) -> Result<StrategyEntry, StrategyError> {
        self.entry_at(quorum, index)
    }

    /// Current list of a quorum with indices
    pub fn strategies(&self, quorum: QuorumNumber) -> Vec<StrategyEntry> {
        self.quorums
            .get(&quorum)
            .map(|list| {
                list.iter()
                    .enumerate()
                    .map(|(index, p)| to_entry(quorum, index, p))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn strategy_count(&self, quorum: QuorumNumber) -> usize {
        self.quorums.get(&quorum).map_or(0, Vec::len)
    }

    /// Quorums holding at least one strategy
    pub fn quorum_numbers(&self) -> Vec<QuorumNumber> {
        self.quorums.keys().copied().collect()
    }

    /// Flat list of strategy ids within the scope
    ///
    /// Quorum order then index order; a strategy listed by several quorums
    /// appears once, at its first occurrence.
    pub fn restakeable_strategies(&self, scope: RestakeableScope) -> Vec<StrategyId> {
        let mut seen = HashSet::new();
        let lists: Box<dyn Iterator<Item = &Vec<StrategyParams>> + '_> = match scope {
            RestakeableScope::AllQuorums => Box::new(self.quorums.values()),
            RestakeableScope::Quorum(q) => Box::new(self.quorums.get(&q).into_iter()),
        };
        lists
            .flatten()
            .map(|p| p.strategy)
            .filter(|s| seen.insert(*s))
            .collect()
    }

    /// Every strategy that appears in any quorum
    pub fn all_strategies(&self) -> HashSet<StrategyId> {
        self.quorums
            .values()
            .flatten()
            .map(|p| p.strategy)
            .collect()
    }

    /// Stake-weighted power for a quorum
    ///
    /// Sum of `shares(strategy) * multiplier` over the quorum's list,
    /// saturating at `u128::MAX`.
    pub fn weight_of<F>(&self, quorum: QuorumNumber, shares_of: F) -> u128
    where
        F: Fn(&StrategyId) -> Shares,
    {
        self.quorums.get(&quorum).map_or(0, |list| {
            list.iter().fold(0u128, |acc, p| {
                acc.saturating_add(shares_of(&p.strategy).saturating_mul(p.multiplier))
            })
        })
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn entry_at(&self, quorum: QuorumNumber, index: usize) -> Result<StrategyEntry, StrategyError> {
        let list = self.quorums.get(&quorum);
        list.and_then(|l| l.get(index))
            .map(|p| to_entry(quorum, index, p))
            .ok_or(StrategyError::IndexOutOfRange {
                quorum,
                index,
                len: list.map_or(0, Vec::len),
            })
    }
}

fn to_entry(quorum: QuorumNumber, index: usize, p: &StrategyParams) -> StrategyEntry {
    StrategyEntry {
        quorum_number: quorum,
        index,
        strategy: p.strategy,
        multiplier: p.multiplier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strategy(b: u8) -> StrategyId {
        StrategyId::from_bytes([b; 20])
    }

    fn params(bytes: &[u8]) -> Vec<StrategyParams> {
        bytes
            .iter()
            .map(|&b| StrategyParams::new(strategy(b), 1000))
            .collect()
    }

    #[test]
    fn test_add_assigns_contiguous_indices() {
        let mut table = StrategyTable::new();
        assert_eq!(table.add_strategies(0, &params(&[1, 2])).unwrap(), 0..2);
        assert_eq!(table.add_strategies(0, &params(&[3])).unwrap(), 2..3);

        let entries = table.strategies(0);
        let indices: Vec<_> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(entries[2].strategy, strategy(3));
    }

    #[test]
    fn test_zero_multiplier_rejected_atomically() {
        let mut table = StrategyTable::new();
        let mut batch = params(&[1, 2]);
        batch[1].multiplier = 0;

        assert_eq!(
            table.add_strategies(0, &batch),
            Err(StrategyError::InvalidMultiplier)
        );
        assert_eq!(table.strategy_count(0), 0);
        assert_eq!(table.revision(), 0);
    }

    #[test]
    fn test_duplicate_strategy_rejected() {
        let mut table = StrategyTable::new();
        table.add_strategies(0, &params(&[1])).unwrap();
        assert!(matches!(
            table.add_strategies(0, &params(&[2, 1])),
            Err(StrategyError::DuplicateStrategy { quorum: 0, .. })
        ));
        assert!(matches!(
            table.add_strategies(1, &params(&[4, 4])),
            Err(StrategyError::DuplicateStrategy { quorum: 1, .. })
        ));
        // Same strategy in another quorum is fine
        table.add_strategies(1, &params(&[1])).unwrap();
    }

    #[test]
    fn test_remove_shifts_later_entries() {
        let mut table = StrategyTable::new();
        table.add_strategies(0, &params(&[10, 11, 12, 13, 14])).unwrap();

        let removed = table.remove_strategies(0, &[3]).unwrap();
        assert_eq!(removed[0].strategy, strategy(13));

        // The entry formerly at index 4 is now at index 3
        let now_at_3 = table.strategy_params_by_index(0, 3).unwrap();
        assert_eq!(now_at_3.strategy, strategy(14));

        let removed_again = table.remove_strategies(0, &[3]).unwrap();
        assert_eq!(removed_again[0].strategy, strategy(14));
        assert_ne!(removed[0].strategy, removed_again[0].strategy);
        assert_eq!(table.strategy_count(0), 3);
    }

    #[test]
    fn test_remove_uses_pre_call_indices() {
        let mut table = StrategyTable::new();
        table.add_strategies(0, &params(&[10, 11, 12, 13, 14])).unwrap();

        let removed = table.remove_strategies(0, &[1, 3]).unwrap();
        assert_eq!(removed[0].strategy, strategy(11));
        assert_eq!(removed[1].strategy, strategy(13));

        let left: Vec<_> = table.strategies(0).iter().map(|e| e.strategy).collect();
        assert_eq!(left, vec![strategy(10), strategy(12), strategy(14)]);
    }

    #[test]
    fn test_remove_out_of_range_is_atomic() {
        let mut table = StrategyTable::new();
        table.add_strategies(0, &params(&[1, 2, 3])).unwrap();

        assert_eq!(
            table.remove_strategies(0, &[0, 3]),
            Err(StrategyError::IndexOutOfRange {
                quorum: 0,
                index: 3,
                len: 3
            })
        );
        assert_eq!(table.strategy_count(0), 3);
        assert_eq!(
            table.remove_strategies(0, &[1, 1]),
            Err(StrategyError::DuplicateIndex { index: 1 })
        );
        assert_eq!(table.remove_strategies(0, &[]), Err(StrategyError::EmptyInput));
        assert!(matches!(
            table.remove_strategies(7, &[0]),
            Err(StrategyError::IndexOutOfRange { len: 0, .. })
        ));
    }

    #[test]
    fn test_removing_all_empties_quorum() {
        let mut table = StrategyTable::new();
        table.add_strategies(2, &params(&[1, 2])).unwrap();
        table.remove_strategies(2, &[0, 1]).unwrap();
        assert!(table.quorum_numbers().is_empty());
    }

    #[test]
    fn test_restakeable_scopes() {
        let mut table = StrategyTable::new();
        table.add_strategies(0, &params(&[1, 2])).unwrap();
        table.add_strategies(1, &params(&[2, 3])).unwrap();

        assert_eq!(
            table.restakeable_strategies(RestakeableScope::AllQuorums),
            vec![strategy(1), strategy(2), strategy(3)]
        );
        assert_eq!(
            table.restakeable_strategies(RestakeableScope::Quorum(1)),
            vec![strategy(2), strategy(3)]
        );
        assert!(table
            .restakeable_strategies(RestakeableScope::Quorum(9))
            .is_empty());
    }

    #[test]
    fn test_weight_of_applies_multipliers() {
        let mut table = StrategyTable::new();
        table
            .add_strategies(
                0,
                &[
                    StrategyParams::new(strategy(1), 1000),
                    StrategyParams::new(strategy(2), 3),
                ],
            )
            .unwrap();

        let weight = table.weight_of(0, |s| if *s == strategy(1) { 2 } else { 5 });
        assert_eq!(weight, 2 * 1000 + 5 * 3);
        assert_eq!(table.weight_of(1, |_| 100), 0);
        assert_eq!(table.weight_of(0, |_| u128::MAX), u128::MAX);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(Vec<u8>),
        Remove(Vec<usize>),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            prop::collection::vec(any::<u8>(), 1..4).prop_map(Op::Add),
            prop::collection::vec(0usize..8, 1..3).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_length_tracks_adds_minus_removes(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let mut table = StrategyTable::new();
            let mut expected = 0usize;

            for op in ops {
                match op {
                    Op::Add(bytes) => {
                        if let Ok(range) = table.add_strategies(0, &params(&bytes)) {
                            prop_assert_eq!(range.start, expected);
                            expected += bytes.len();
                        }
                    }
                    Op::Remove(indices) => {
                        if let Ok(removed) = table.remove_strategies(0, &indices) {
                            expected -= removed.len();
                        }
                    }
                }

                prop_assert_eq!(table.strategy_count(0), expected);
                let indices: Vec<usize> = table.strategies(0).iter().map(|e| e.index).collect();
                prop_assert_eq!(indices, (0..expected).collect::<Vec<_>>());
            }
        }
    }
}
