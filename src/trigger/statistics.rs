//! # Per-trigger event counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::allocator::AllocatorStatisticsSnapshot;

/// Live success/failure counters of one trigger.
#[derive(Debug, Default)]
pub struct TriggerStatistics {
    success_total: AtomicU64,
    failure_total: AtomicU64,
}

impl TriggerStatistics {
    pub(crate) fn record_success(&self) {
        self.success_total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failure_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads the counters together with the allocator's.
    pub fn snapshot(&self, allocator: AllocatorStatisticsSnapshot) -> TriggerStatisticsSnapshot {
        TriggerStatisticsSnapshot {
            events_handled_success_total: self.success_total.load(Ordering::Relaxed),
            events_handled_failure_total: self.failure_total.load(Ordering::Relaxed),
            allocator,
        }
    }
}

/// Point-in-time copy of a trigger's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStatisticsSnapshot {
    /// Events whose user code returned a response.
    pub events_handled_success_total: u64,
    /// Events that failed for any reason (allocation, envelope, panic, abort, user error).
    pub events_handled_failure_total: u64,
    /// Counters of the trigger's allocator.
    pub allocator: AllocatorStatisticsSnapshot,
}

impl TriggerStatisticsSnapshot {
    /// Counter deltas since `prev`, clamped at zero.
    #[must_use]
    pub fn diff_from(&self, prev: &Self) -> Self {
        Self {
            events_handled_success_total: self
                .events_handled_success_total
                .saturating_sub(prev.events_handled_success_total),
            events_handled_failure_total: self
                .events_handled_failure_total
                .saturating_sub(prev.events_handled_failure_total),
            allocator: self.allocator.diff_from(&prev.allocator),
        }
    }
}
