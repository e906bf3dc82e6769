//! Quorum coordination - the single serialization point for mutations

pub mod phase;
pub mod quorum;

pub use phase::{PhaseChange, QuorumPhase};
pub use quorum::{
    CoordinatorSettings, OperatorUpdateReport, QuorumCoordinator, RegisteredOperator, Selection,
    SelectionSnapshot, SnapshotVersion,
};
