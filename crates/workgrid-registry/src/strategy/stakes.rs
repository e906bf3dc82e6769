//! Operator shares per strategy
//!
//! Raw delegated shares as reported by the external stake source. The
//! strategy table turns them into selection weight.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;
use workgrid_common::types::encoding::u128_string;
use workgrid_common::{Address, Shares, StrategyId};

/// New share amount for one strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareUpdate {
    pub strategy: StrategyId,
    #[serde(with = "u128_string")]
    pub shares: Shares,
}

impl ShareUpdate {
    pub fn new(strategy: StrategyId, shares: Shares) -> Self {
        Self { strategy, shares }
    }
}

/// Share changes reported for one operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeUpdate {
    pub operator: Address,
    pub shares: Vec<ShareUpdate>,
}

/// Shares held by each operator in each strategy
#[derive(Debug, Clone, Default)]
pub struct OperatorStakes {
    shares: HashMap<Address, BTreeMap<StrategyId, Shares>>,
    revision: u64,
}

impl OperatorStakes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the operator's shares for the listed strategies
    ///
    /// A zero amount clears the entry.
    pub fn set_operator_shares(&mut self, operator: Address, updates: &[ShareUpdate]) {
        if updates.is_empty() {
            return;
        }

        let entry = self.shares.entry(operator).or_default();
        for update in updates {
            if update.shares == 0 {
                entry.remove(&update.strategy);
            } else {
                entry.insert(update.strategy, update.shares);
            }
        }
        if entry.is_empty() {
            self.shares.remove(&operator);
        }
        self.revision += 1;

        debug!(%operator, strategies = updates.len(), "Operator shares updated");
    }

    /// Shares for each requested strategy, zero when unknown
    pub fn get_operator_shares(&self, operator: &Address, strategies: &[StrategyId]) -> Vec<Shares> {
        strategies
            .iter()
            .map(|s| self.shares_of(operator, s))
            .collect()
    }

    pub fn shares_of(&self, operator: &Address, strategy: &StrategyId) -> Shares {
        self.shares
            .get(operator)
            .and_then(|m| m.get(strategy))
            .copied()
            .unwrap_or(0)
    }

    /// Whether the operator holds shares in any of the given strategies
    pub fn has_stake_in<'a, I>(&self, operator: &Address, strategies: I) -> bool
    where
        I: IntoIterator<Item = &'a StrategyId>,
    {
        match self.shares.get(operator) {
            Some(held) => strategies.into_iter().any(|s| held.contains_key(s)),
            None => false,
        }
    }

    /// Number of operators holding any shares
    pub fn operator_count(&self) -> usize {
        self.shares.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(b: u8) -> StrategyId {
        StrategyId::from_bytes([b; 20])
    }

    #[test]
    fn test_get_operator_shares_defaults_to_zero() {
        let mut stakes = OperatorStakes::new();
        let op = Address([1u8; 20]);
        stakes.set_operator_shares(op, &[ShareUpdate::new(strategy(7), 250)]);

        assert_eq!(
            stakes.get_operator_shares(&op, &[strategy(7), strategy(8)]),
            vec![250, 0]
        );
        assert_eq!(
            stakes.get_operator_shares(&Address([2u8; 20]), &[strategy(7)]),
            vec![0]
        );
    }

    #[test]
    fn test_zero_clears_stake() {
        let mut stakes = OperatorStakes::new();
        let op = Address([1u8; 20]);
        stakes.set_operator_shares(op, &[ShareUpdate::new(strategy(7), 250)]);
        assert!(stakes.has_stake_in(&op, [strategy(7)].iter()));

        stakes.set_operator_shares(op, &[ShareUpdate::new(strategy(7), 0)]);
        assert!(!stakes.has_stake_in(&op, [strategy(7)].iter()));
        assert_eq!(stakes.revision(), 2);
    }

    #[test]
    fn test_has_stake_only_in_listed_strategies() {
        let mut stakes = OperatorStakes::new();
        let op = Address([1u8; 20]);
        stakes.set_operator_shares(op, &[ShareUpdate::new(strategy(7), 1)]);
        assert!(!stakes.has_stake_in(&op, [strategy(8)].iter()));
    }
}
