//! # Runtime notices emitted by triggers, the timeout watcher and the processor.
//!
//! The [`NoticeKind`] enum classifies notices across four categories:
//! - **Dispatch notices**: faults recovered by the submission pipeline
//! - **Timeout notices**: stuck worker detection and its resolution
//! - **Lifecycle notices**: trigger start/stop/restart and process stop
//! - **Subscriber notices**: overflow and panics of notice subscribers
//!
//! ## Ordering guarantees
//! Each notice has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use eventvisor::{Notice, NoticeKind};
//!
//! let n = Notice::new(NoticeKind::WorkerTimedOut)
//!     .with_trigger("http")
//!     .with_worker(3)
//!     .with_elapsed(Duration::from_secs(31))
//!     .with_timeout(Duration::from_secs(30));
//!
//! assert_eq!(n.worker, Some(3));
//! assert_eq!(n.timeout_ms, Some(30_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for notice ordering.
static NOTICE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    // === Dispatch ===
    /// A dispatch panicked and was recovered at the pipeline boundary.
    ///
    /// Sets `trigger`, `worker` (if allocated), `reason` (panic message).
    SubmitPanicked,

    // === Timeout supervision ===
    /// A worker exceeded the event timeout.
    ///
    /// Sets `trigger`, `worker`, `elapsed_ms`, `timeout_ms`.
    WorkerTimedOut,

    /// A timed-out worker was restarted in place.
    ///
    /// Sets `trigger`, `worker`.
    WorkerRestarted,

    /// Restarting a timed-out worker failed (not escalated).
    ///
    /// Sets `trigger`, `worker`, `reason`.
    WorkerRestartFailed,

    /// A stuck worker cannot be restarted; the whole process is shutting down.
    ///
    /// Sets `trigger`, `worker` (the offending worker).
    GracefulShutdownStarted,

    /// A worker was still busy past the timeout during graceful shutdown and is no longer waited on.
    ///
    /// Sets `trigger`, `worker`, `elapsed_ms`.
    WorkerAbandoned,

    /// Every tracked in-flight worker finished during graceful shutdown.
    AllDrainedWithin,

    /// The graceful shutdown deadline passed with workers still tracked.
    ///
    /// Sets `timeout_ms` (the deadline), `reason` (remaining workers).
    DrainDeadlineExceeded,

    // === Lifecycle ===
    /// Process stop requested (OS signal, explicit stop, or escalation).
    StopRequested,

    /// A trigger started.
    TriggerStarted,

    /// A trigger stopped.
    TriggerStopped,

    /// Stopping a trigger failed.
    ///
    /// Sets `trigger`, `reason`.
    TriggerStopFailed,

    /// A trigger asked the process to restart it.
    RestartRequested,

    /// A trigger restart (stop + start) completed.
    TriggerRestarted,

    /// A trigger restart failed.
    ///
    /// Sets `trigger`, `reason`.
    TriggerRestartFailed,

    // === Subscribers ===
    /// Subscriber panicked during notice processing.
    ///
    /// Sets `trigger` (subscriber name), `reason` (panic info).
    SubscriberPanicked,

    /// Subscriber dropped a notice (queue full or worker closed).
    ///
    /// Sets `trigger` (subscriber name), `reason` (`full` / `closed`).
    SubscriberOverflow,
}

/// Runtime notice with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`NoticeKind`]
#[derive(Clone, Debug)]
pub struct Notice {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Notice classification.
    pub kind: NoticeKind,
    /// Trigger (or subscriber) the notice refers to.
    pub trigger: Option<Arc<str>>,
    /// Worker index the notice refers to.
    pub worker: Option<usize>,
    /// Time the worker had been busy, in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Relevant timeout or deadline, in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Human-readable reason (errors, panic messages, overflow details).
    pub reason: Option<Arc<str>>,
}

impl Notice {
    /// Creates a new notice of the given kind with current timestamp and next sequence number.
    pub fn new(kind: NoticeKind) -> Self {
        Self {
            seq: NOTICE_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            trigger: None,
            worker: None,
            elapsed_ms: None,
            timeout_ms: None,
            reason: None,
        }
    }

    /// Attaches a trigger (or subscriber) name.
    #[inline]
    pub fn with_trigger(mut self, trigger: impl Into<Arc<str>>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    /// Attaches a worker index.
    #[inline]
    pub fn with_worker(mut self, index: usize) -> Self {
        self.worker = Some(index);
        self
    }

    /// Attaches an elapsed duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(millis(d));
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(millis(d));
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow notice.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Notice::new(NoticeKind::SubscriberOverflow)
            .with_trigger(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic notice.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Notice::new(NoticeKind::SubscriberPanicked)
            .with_trigger(subscriber)
            .with_reason(info)
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
