//! Quorum lifecycle
//!
//! ```text
//!   Empty ──(first strategy)──► Populated ──(first eligible worker)──► Active
//!     ▲                                                                  │
//!     └──────────────────────(all strategies removed)────────────────────┘
//! ```
//!
//! Worker churn never demotes an `Active` quorum. It may hold zero eligible
//! workers, in which case selection fails with `InsufficientWorkers`.

use serde::{Deserialize, Serialize};
use workgrid_common::QuorumNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumPhase {
    /// No strategy entries
    #[default]
    Empty,
    /// Strategies present, no eligible worker seen yet
    Populated,
    /// Has had at least one eligible worker
    Active,
}

impl QuorumPhase {
    /// Phase after re-evaluation
    pub fn next(self, has_strategies: bool, has_eligible: bool) -> Self {
        match (self, has_strategies, has_eligible) {
            (_, false, _) => QuorumPhase::Empty,
            (QuorumPhase::Active, true, _) => QuorumPhase::Active,
            (_, true, true) => QuorumPhase::Active,
            (_, true, false) => QuorumPhase::Populated,
        }
    }
}

impl std::fmt::Display for QuorumPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuorumPhase::Empty => write!(f, "empty"),
            QuorumPhase::Populated => write!(f, "populated"),
            QuorumPhase::Active => write!(f, "active"),
        }
    }
}

/// Recorded phase transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub quorum: QuorumNumber,
    pub from: QuorumPhase,
    pub to: QuorumPhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use QuorumPhase::*;
        assert_eq!(Empty.next(true, false), Populated);
        assert_eq!(Populated.next(true, true), Active);
        assert_eq!(Empty.next(true, true), Active);
        // Worker churn keeps an active quorum active
        assert_eq!(Active.next(true, false), Active);
        assert_eq!(Active.next(false, true), Empty);
        assert_eq!(Populated.next(false, false), Empty);
    }
}
