//! # Event source capability set.
//!
//! A [`Trigger`] is an event source (HTTP server, stream consumer, timer, ...).
//! Protocol handling lives in the implementation; the shared dispatch logic is
//! the [`TriggerBase`](crate::TriggerBase) helper that implementations hold and
//! delegate to.
//!
//! The timeout watcher and the processor only talk to triggers through this trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TriggerError;
use crate::trigger::{TriggerConfig, TriggerStatisticsSnapshot};
use crate::worker::Worker;

/// Opaque position a stream source can resume from.
pub type Checkpoint = String;

/// Result of asking a trigger to time out a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// The in-flight event was aborted after running for `elapsed`.
    Aborted {
        /// How long the event had been running.
        elapsed: Duration,
    },
    /// The worker already responded; nothing was done.
    AlreadyResponded,
}

/// # An event source.
#[async_trait]
pub trait Trigger: Send + Sync + 'static {
    /// User given identifier.
    fn id(&self) -> &str;

    /// Kind of source (`http`, `kafka`, ...).
    fn kind(&self) -> &str;

    /// Starts producing events, optionally resuming from `checkpoint`.
    async fn start(&self, checkpoint: Option<Checkpoint>) -> Result<(), TriggerError>;

    /// Stops producing events. `force` skips waiting for in-flight work.
    ///
    /// Returns the position to resume from, if the source has one.
    async fn stop(&self, force: bool) -> Result<Option<Checkpoint>, TriggerError>;

    /// Workers this trigger dispatches to.
    fn workers(&self) -> &[Arc<Worker>];

    /// Aborts the event in flight on `worker`, if it is still running.
    fn timeout_worker(&self, worker: &Worker) -> TimeoutOutcome;

    /// Configuration the trigger was built with.
    fn config(&self) -> &TriggerConfig;

    /// Current counters.
    fn statistics(&self) -> TriggerStatisticsSnapshot;
}
