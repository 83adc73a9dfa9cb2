//! # Event sources and the shared submission pipeline.
//!
//! - [`Trigger`] the capability set every event source implements
//! - [`TriggerBase`] the dispatch helper sources delegate to
//! - [`TriggerConfig`] / [`BatchConfig`] per-source settings
//! - [`Batcher`] accumulation stage for sources that dispatch in groups
//! - [`TriggerStatisticsSnapshot`] success/failure counters plus the allocator's
//!
//! ## Flow
//! ```text
//! source receives event ─► (Batcher::add / wait_for_batch) ─► TriggerBase
//!                                                                 │
//!                     allocate ─► prepare ─► Worker::process_event ─► release
//! ```

mod base;
mod batcher;
mod config;
mod statistics;
#[allow(clippy::module_inception)]
mod trigger;

pub use base::{RestartQueue, RestartRequest, TriggerBase, TriggerBaseBuilder};
pub use batcher::{Batch, Batcher};
pub use config::{BatchConfig, DEFAULT_WORKER_AVAILABILITY_TIMEOUT, TriggerConfig};
pub use statistics::{TriggerStatistics, TriggerStatisticsSnapshot};
pub use trigger::{Checkpoint, TimeoutOutcome, Trigger};
