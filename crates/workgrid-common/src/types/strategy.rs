//! Strategy weighting entries

use crate::types::address::StrategyId;
use crate::{Multiplier, QuorumNumber};
use serde::{Deserialize, Serialize};

/// A strategy and the multiplier applied to its raw shares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub strategy: StrategyId,
    #[serde(with = "crate::types::encoding::u128_string")]
    pub multiplier: Multiplier,
}

impl StrategyParams {
    pub fn new(strategy: StrategyId, multiplier: Multiplier) -> Self {
        Self {
            strategy,
            multiplier,
        }
    }
}

/// A strategy as seen at a given position of a quorum's list
///
/// `index` is only meaningful against the list it was read from: removing
/// any lower index shifts this entry down by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyEntry {
    pub quorum_number: QuorumNumber,
    pub index: usize,
    pub strategy: StrategyId,
    #[serde(with = "crate::types::encoding::u128_string")]
    pub multiplier: Multiplier,
}

impl StrategyEntry {
    pub fn params(&self) -> StrategyParams {
        StrategyParams::new(self.strategy, self.multiplier)
    }
}
