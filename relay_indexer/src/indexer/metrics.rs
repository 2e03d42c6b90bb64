use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running counters for the indexer. Share a single instance between workers with an `Arc`.
#[derive(Debug, Default)]
pub struct IndexerMetrics {
    orders_indexed: AtomicU64,
    fills_applied: AtomicU64,
    overfills: AtomicU64,
    stale_fills: AtomicU64,
    spends_checked: AtomicU64,
    status_changes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub orders_indexed: u64,
    pub fills_applied: u64,
    pub overfills: u64,
    pub stale_fills: u64,
    pub spends_checked: u64,
    pub status_changes: u64,
}

impl IndexerMetrics {
    pub fn inc_orders_indexed(&self) {
        self.orders_indexed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fills_applied(&self) {
        self.fills_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_overfills(&self) {
        self.overfills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stale_fills(&self) {
        self.stale_fills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_spends_checked(&self) {
        self.spends_checked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_status_changes(&self, n: u64) {
        self.status_changes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            orders_indexed: self.orders_indexed.load(Ordering::Relaxed),
            fills_applied: self.fills_applied.load(Ordering::Relaxed),
            overfills: self.overfills.load(Ordering::Relaxed),
            stale_fills: self.stale_fills.load(Ordering::Relaxed),
            spends_checked: self.spends_checked.load(Ordering::Relaxed),
            status_changes: self.status_changes.load(Ordering::Relaxed),
        }
    }
}
