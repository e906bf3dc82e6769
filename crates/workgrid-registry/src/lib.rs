//! # Workgrid Registry
//!
//! Stake-weighted worker registry and randomized worker selection.
//!
//! ## Components
//!
//! - **Registry**: whitelist gate and worker records
//! - **Strategy**: per-quorum strategy lists and operator shares
//! - **Selection**: nonce-guarded weighted draw from injected entropy
//! - **Coordinator**: quorum phases, snapshots, operator reconciliation
//! - **Ledger**: task completion records with a Merkle audit trail
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Workgrid (single mutex, events)              │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────────────────────┐  ┌──────────────┐  │
//! │  │          QuorumCoordinator           │  │  Completion  │  │
//! │  │  ┌──────────┐ ┌──────────┐ ┌───────┐ │  │    Ledger    │  │
//! │  │  │ Worker   │ │ Strategy │ │ Stakes│ │  │   (Merkle)   │  │
//! │  │  │ Registry │ │  Table   │ │       │ │  └──────┬───────┘  │
//! │  │  └────┬─────┘ └────┬─────┘ └───┬───┘ │         │          │
//! │  │       └────────────┼───────────┘     │   WorkerDirectory  │
//! │  │     SelectionEngine ◄── entropy      │                    │
//! │  └──────────────────────────────────────┘                    │
//! └──────────────────────────────────────────────────────────────┘
//!        ▲ JSON Request/Response         ▲ OperatorFeed (mpsc)
//! ```

pub mod api;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod feed;
pub mod ledger;
pub mod metrics;
pub mod registry;
pub mod selection;
pub mod service;
pub mod strategy;

pub use api::{Reply, Request, Response};
pub use config::WorkgridConfig;
pub use coordinator::{
    CoordinatorSettings, OperatorUpdateReport, QuorumCoordinator, QuorumPhase, Selection,
    SelectionSnapshot,
};
pub use events::RegistryEvent;
pub use feed::{FeedOutcome, NotificationSource, OperatorFeed, OperatorNotification};
pub use ledger::TaskCompletionLedger;
pub use registry::{WhitelistOutcome, WorkerDirectory, WorkerRegistry};
pub use selection::{EntropySource, FixedEntropy, OsEntropy, SeededEntropy, SelectionEngine};
pub use service::Workgrid;
pub use strategy::{OperatorStakes, RestakeableScope, ShareUpdate, StakeUpdate, StrategyTable};
