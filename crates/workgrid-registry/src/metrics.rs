//! Prometheus metrics for the registry

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

/// Registry-wide counters and gauges
pub struct RegistryMetrics {
    pub whitelisted: IntGauge,
    pub workers_registered: IntGauge,
    pub selections_total: IntCounter,
    pub selection_failures_total: IntCounter,
    pub selection_size: Histogram,
    pub tasks_completed_total: IntCounter,
    pub tasks_failed_total: IntCounter,
    pub nonce: IntGauge,
}

impl RegistryMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            whitelisted: IntGauge::new(
                "workgrid_whitelisted_addresses",
                "Addresses currently whitelisted",
            )?,
            workers_registered: IntGauge::new(
                "workgrid_workers_registered",
                "Currently registered workers",
            )?,
            selections_total: IntCounter::new(
                "workgrid_selections_total",
                "Successful worker selections",
            )?,
            selection_failures_total: IntCounter::new(
                "workgrid_selection_failures_total",
                "Failed worker selections (nonce still consumed)",
            )?,
            selection_size: Histogram::with_opts(
                HistogramOpts::new("workgrid_selection_size", "Workers drawn per selection")
                    .buckets(vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0]),
            )?,
            tasks_completed_total: IntCounter::new(
                "workgrid_tasks_completed_total",
                "Tasks recorded as completed",
            )?,
            tasks_failed_total: IntCounter::new(
                "workgrid_tasks_failed_total",
                "Failed task submissions",
            )?,
            nonce: IntGauge::new("workgrid_selection_nonce", "Current selection nonce")?,
        })
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.whitelisted.clone()))?;
        registry.register(Box::new(self.workers_registered.clone()))?;
        registry.register(Box::new(self.selections_total.clone()))?;
        registry.register(Box::new(self.selection_failures_total.clone()))?;
        registry.register(Box::new(self.selection_size.clone()))?;
        registry.register(Box::new(self.tasks_completed_total.clone()))?;
        registry.register(Box::new(self.tasks_failed_total.clone()))?;
        registry.register(Box::new(self.nonce.clone()))?;
        Ok(())
    }

    /// Record a draw attempt; the nonce moves either way
    pub fn observe_selection(&self, selected: Option<usize>, nonce: u64) {
        match selected {
            Some(n) => {
                self.selections_total.inc();
                self.selection_size.observe(n as f64);
            }
            None => self.selection_failures_total.inc(),
        }
        self.nonce.set(i64::try_from(nonce).unwrap_or(i64::MAX));
    }
}

/// Render a registry in the text exposition format
pub fn encode_text(registry: &Registry) -> prometheus::Result<String> {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buf)?;
    String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
