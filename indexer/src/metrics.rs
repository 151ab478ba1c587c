//! Metrics collection for indexer monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::dispatcher::DispatchOutcome;

/// Indexer metrics.
pub struct Metrics {
    /// Events received from the source.
    pub events_total: AtomicU64,
    /// Transfer events that changed the ledger.
    pub transfers_applied: AtomicU64,
    /// Liquidity events that changed a daily summary.
    pub liquidity_applied: AtomicU64,
    /// Redelivered events skipped by deduplication.
    pub duplicates_skipped: AtomicU64,
    /// Events of no interest to the ledger.
    pub events_ignored: AtomicU64,
    /// Events dropped on an event-local error.
    pub events_failed: AtomicU64,
    /// Retries after transient failures.
    pub retries: AtomicU64,
    /// Balances found to disagree with chain state.
    pub balance_drift: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            transfers_applied: AtomicU64::new(0),
            liquidity_applied: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            events_ignored: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            balance_drift: AtomicU64::new(0),
        }
    }

    pub fn event_received(&self) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count the outcome of a dispatched event.
    pub fn record(&self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::TransferApplied { drifted } => {
                self.transfers_applied.fetch_add(1, Ordering::Relaxed);
                self.balance_drift.fetch_add(drifted as u64, Ordering::Relaxed);
            }
            DispatchOutcome::LiquidityApplied => {
                self.liquidity_applied.fetch_add(1, Ordering::Relaxed);
            }
            DispatchOutcome::Duplicate => {
                self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
            }
            DispatchOutcome::Ignored => {
                self.events_ignored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn event_failed(&self) {
        self.events_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_total: self.events_total.load(Ordering::Relaxed),
            transfers_applied: self.transfers_applied.load(Ordering::Relaxed),
            liquidity_applied: self.liquidity_applied.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            events_failed: self.events_failed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            balance_drift: self.balance_drift.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let counters = [
            ("events_total", "Total events received", snapshot.events_total),
            ("transfers_applied", "Transfer events applied", snapshot.transfers_applied),
            ("liquidity_applied", "Liquidity events applied", snapshot.liquidity_applied),
            ("duplicates_skipped", "Redelivered events skipped", snapshot.duplicates_skipped),
            ("events_ignored", "Events not tracked by the ledger", snapshot.events_ignored),
            ("events_failed", "Events dropped on an event-local error", snapshot.events_failed),
            ("retries", "Retries after transient failures", snapshot.retries),
            ("balance_drift", "Balances disagreeing with chain state", snapshot.balance_drift),
        ];

        counters
            .iter()
            .map(|(name, help, value)| {
                format!(
                    "# HELP chainledger_{name} {help}\n# TYPE chainledger_{name} counter\nchainledger_{name} {value}\n"
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub events_total: u64,
    pub transfers_applied: u64,
    pub liquidity_applied: u64,
    pub duplicates_skipped: u64,
    pub events_ignored: u64,
    pub events_failed: u64,
    pub retries: u64,
    pub balance_drift: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let metrics = Metrics::new();

        metrics.event_received();
        metrics.event_received();
        metrics.record(DispatchOutcome::TransferApplied { drifted: 2 });
        metrics.record(DispatchOutcome::Duplicate);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_total, 2);
        assert_eq!(snapshot.transfers_applied, 1);
        assert_eq!(snapshot.duplicates_skipped, 1);
        assert_eq!(snapshot.balance_drift, 2);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.record(DispatchOutcome::LiquidityApplied);

        let output = metrics.to_prometheus();
        assert!(output.contains("chainledger_liquidity_applied 1"));
        assert!(output.contains("# TYPE chainledger_retries counter"));
    }
}
