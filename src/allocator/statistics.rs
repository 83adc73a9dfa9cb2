//! # Allocation counters.
//!
//! [`AllocatorStatistics`] is a set of monotonically increasing atomic counters
//! updated on every allocation. Readers take a [`AllocatorStatisticsSnapshot`]
//! and report the delta between two snapshots with
//! [`diff_from`](AllocatorStatisticsSnapshot::diff_from).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Live allocation counters.
#[derive(Debug, Default)]
pub struct AllocatorStatistics {
    allocation_count: AtomicU64,
    success_immediate_total: AtomicU64,
    success_after_wait_total: AtomicU64,
    timeout_total: AtomicU64,
    wait_duration_ms_sum: AtomicU64,
    workers_available_percentage: AtomicU64,
}

impl AllocatorStatistics {
    pub(crate) fn record_attempt(&self) {
        self.allocation_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_immediate_success(&self) {
        self.success_immediate_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success_after_wait(&self, waited: Duration) {
        self.success_after_wait_total.fetch_add(1, Ordering::Relaxed);
        let ms = waited.as_millis().min(u128::from(u64::MAX)) as u64;
        self.wait_duration_ms_sum.fetch_add(ms, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeout_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds an instantaneous "percent of workers available" sample.
    ///
    /// Samples are summed, not averaged.
    pub(crate) fn record_available_percentage(&self, percent: u64) {
        self.workers_available_percentage
            .fetch_add(percent, Ordering::Relaxed);
    }

    /// Reads every counter.
    pub fn snapshot(&self) -> AllocatorStatisticsSnapshot {
        AllocatorStatisticsSnapshot {
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
            success_immediate_total: self.success_immediate_total.load(Ordering::Relaxed),
            success_after_wait_total: self.success_after_wait_total.load(Ordering::Relaxed),
            timeout_total: self.timeout_total.load(Ordering::Relaxed),
            wait_duration_ms_sum: self.wait_duration_ms_sum.load(Ordering::Relaxed),
            workers_available_percentage: self
                .workers_available_percentage
                .load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`AllocatorStatistics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocatorStatisticsSnapshot {
    /// Allocation attempts.
    pub allocation_count: u64,
    /// Allocations that found a free worker right away.
    pub success_immediate_total: u64,
    /// Allocations that succeeded after waiting for a release.
    pub success_after_wait_total: u64,
    /// Allocations that gave up.
    pub timeout_total: u64,
    /// Total time spent waiting by allocations that succeeded after a wait.
    pub wait_duration_ms_sum: u64,
    /// Sum of "percent of workers available" samples taken at allocation time.
    pub workers_available_percentage: u64,
}

impl AllocatorStatisticsSnapshot {
    /// Counter deltas since `prev`, clamped at zero.
    #[must_use]
    pub fn diff_from(&self, prev: &Self) -> Self {
        Self {
            allocation_count: self.allocation_count.saturating_sub(prev.allocation_count),
            success_immediate_total: self
                .success_immediate_total
                .saturating_sub(prev.success_immediate_total),
            success_after_wait_total: self
                .success_after_wait_total
                .saturating_sub(prev.success_after_wait_total),
            timeout_total: self.timeout_total.saturating_sub(prev.timeout_total),
            wait_duration_ms_sum: self
                .wait_duration_ms_sum
                .saturating_sub(prev.wait_duration_ms_sum),
            workers_available_percentage: self
                .workers_available_percentage
                .saturating_sub(prev.workers_available_percentage),
        }
    }
}
