//! Operator stake notification feed
//!
//! Consumes stake-change notifications from an external source and applies
//! each one as a single atomic step: share updates first, then operator
//! reconciliation. Every outcome, success or failure, is reported on the
//! outcome channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use workgrid_common::{Address, WorkgridError};

use crate::coordinator::OperatorUpdateReport;
use crate::service::Workgrid;
use crate::strategy::StakeUpdate;

/// Batch of stake changes delivered together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorNotification {
    pub updates: Vec<StakeUpdate>,
}

impl OperatorNotification {
    pub fn operators(&self) -> Vec<Address> {
        self.updates.iter().map(|u| u.operator).collect()
    }
}

/// Result of applying one notification
#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    Applied {
        report: OperatorUpdateReport,
    },
    Rejected {
        error: WorkgridError,
        operators: Vec<Address>,
    },
}

/// Where notifications come from
#[async_trait]
pub trait NotificationSource: Send {
    /// Next notification, `None` once the source is closed
    async fn next_notification(&mut self) -> Option<OperatorNotification>;
}

#[async_trait]
impl NotificationSource for mpsc::Receiver<OperatorNotification> {
    async fn next_notification(&mut self) -> Option<OperatorNotification> {
        self.recv().await
    }
}

/// Applies notifications from a source to the service
pub struct OperatorFeed<S> {
    source: S,
    workgrid: Arc<Workgrid>,
    outcomes: mpsc::Sender<FeedOutcome>,
}

impl<S: NotificationSource + 'static> OperatorFeed<S> {
    pub fn new(source: S, workgrid: Arc<Workgrid>, outcomes: mpsc::Sender<FeedOutcome>) -> Self {
        Self {
            source,
            workgrid,
            outcomes,
        }
    }

    /// Process notifications until the source closes
    ///
    /// Returns the number of notifications processed.
    pub async fn run(mut self) -> u64 {
        let mut processed = 0u64;

        while let Some(notification) = self.source.next_notification().await {
            let outcome = self.apply(&notification);
            processed += 1;

            if self.outcomes.send(outcome).await.is_err() {
                warn!(processed, "Feed outcome receiver dropped");
            }
        }

        info!(processed, "Operator feed closed");
        processed
    }

    /// Run on the tokio runtime
    pub fn spawn(self) -> tokio::task::JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    fn apply(&self, notification: &OperatorNotification) -> FeedOutcome {
        match self.workgrid.apply_stake_updates(&notification.updates) {
            Ok(report) => {
                debug!(
                    updates = notification.updates.len(),
                    registered = report.registered.len(),
                    "Notification applied"
                );
                FeedOutcome::Applied { report }
            }
            Err(error) => {
                warn!(error = %error, "Notification rejected");
                FeedOutcome::Rejected {
                    error,
                    operators: notification.operators(),
                }
            }
        }
    }
}

/// Channel pair for feeding notifications
pub fn notification_channel(
    capacity: usize,
) -> (
    mpsc::Sender<OperatorNotification>,
    mpsc::Receiver<OperatorNotification>,
) {
    mpsc::channel(capacity.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkgridConfig;
    use crate::selection::FixedEntropy;
    use crate::strategy::ShareUpdate;
    use workgrid_common::{ErrorKind, StrategyId, StrategyParams};

    fn strategy(b: u8) -> StrategyId {
        StrategyId::from_bytes([b; 20])
    }

    #[tokio::test]
    async fn test_feed_registers_and_reports() {
        let grid = Arc::new(
            Workgrid::new(WorkgridConfig::default(), Arc::new(FixedEntropy::new(vec![1]))).unwrap(),
        );
        grid.add_strategies(0, vec![StrategyParams::new(strategy(1), 1000)])
            .unwrap();
        grid.add_to_whitelist(Address([1u8; 20])).unwrap();

        let (tx, rx) = notification_channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let handle = OperatorFeed::new(rx, Arc::clone(&grid), out_tx).spawn();

        tx.send(OperatorNotification {
            updates: vec![StakeUpdate {
                operator: Address([1u8; 20]),
                shares: vec![ShareUpdate::new(strategy(1), 10)],
            }],
        })
        .await
        .unwrap();
        tx.send(OperatorNotification {
            updates: vec![StakeUpdate {
                operator: Address([2u8; 20]),
                shares: vec![ShareUpdate::new(strategy(1), 10)],
            }],
        })
        .await
        .unwrap();
        drop(tx);

        match out_rx.recv().await.unwrap() {
            FeedOutcome::Applied { report } => assert_eq!(report.registered.len(), 1),
            other => panic!("unexpected outcome {other:?}"),
        }
        match out_rx.recv().await.unwrap() {
            FeedOutcome::Rejected { error, operators } => {
                assert_eq!(error.kind(), ErrorKind::NotWhitelisted);
                assert_eq!(operators, vec![Address([2u8; 20])]);
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        assert_eq!(handle.await.unwrap(), 2);
        assert_eq!(grid.get_workers().len(), 1);
        // Rejected notification left no shares behind
        assert_eq!(
            grid.get_operator_shares(&Address([2u8; 20]), &[strategy(1)]),
            vec![0]
        );
    }
}
