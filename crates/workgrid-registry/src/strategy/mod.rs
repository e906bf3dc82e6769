//! Stake weighting - per-quorum strategy lists and operator shares

pub mod stakes;
pub mod table;

pub use stakes::{OperatorStakes, ShareUpdate, StakeUpdate};
pub use table::{RestakeableScope, StrategyTable};
