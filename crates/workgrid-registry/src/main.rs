//! Workgrid Service Binary
//!
//! Reads one JSON request per line on stdin and writes one JSON response per
//! line on stdout. Logs go to stderr.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use workgrid_common::VERSION;
use workgrid_registry::{OsEntropy, Workgrid, WorkgridConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = WorkgridConfig::load()?;

    // Initialize tracing; RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!("Starting Workgrid v{}", VERSION);
    info!(
        weighted_quorums = ?config.selection.weighted_quorums,
        detect_stale_snapshots = config.selection.detect_stale_snapshots,
        default_quorum = config.selection.default_quorum,
        "Selection config"
    );

    let workgrid = Arc::new(Workgrid::new(config, Arc::new(OsEntropy))?);
    workgrid.apply_bootstrap()?;

    let handled = workgrid
        .serve_lines(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    if handled == 0 {
        warn!("No requests received");
    }
    info!(handled, "Input closed, shutting down");
    Ok(())
}
