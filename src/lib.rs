//! # eventvisor
//!
//! **Eventvisor** is the concurrency core of a serverless event processor.
//!
//! It provides the pieces that sit between event sources (HTTP servers,
//! stream consumers, timers) and user code: a bounded worker allocator, a
//! submission pipeline that turns every dispatch into a definitive outcome,
//! a timeout watcher that restarts or escalates on stuck workers, and a
//! batcher for sources that dispatch in groups.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   Trigger    │   │   Trigger    │   │   Trigger    │
//!     │   (http)     │   │   (kafka)    │   │   (cron)     │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ TriggerBase  │   │ TriggerBase  │   │ TriggerBase  │
//!     │ (pipeline)   │   │ (+ Batcher)  │   │ (pipeline)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────────────────────────┐
//!     │  Singleton   │   │  FixedPool (shared by name via   │
//!     │              │   │  AllocatorFactory)               │
//!     └──────┬───────┘   └───────┬──────────────────┬───────┘
//!            ▼                   ▼                  ▼
//!        Worker #0           Worker #0   ...    Worker #N-1
//!        (Runtime)           (Runtime)          (Runtime)
//!
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Processor                                                        │
//! │  - starts / stops / restarts triggers                             │
//! │  - EventTimeoutWatcher (inspects every worker each timeout)       │
//! │  - Bus ──► NoticeRouter ──► LogWriter, custom subscribers         │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Dispatch
//! ```text
//! TriggerBase::allocate_worker_and_submit_event(event, span, timeout)
//!   ├─► allocator.allocate(timeout)
//!   │     └─ Err ─► failure counted, Err(SubmitError::Allocation)
//!   ├─► prepare: unwrap cloud event envelope / assign id, attach TriggerInfo
//!   ├─► worker.process_event(event)       (panic caught, span attached)
//!   │     ├─ Ok(Ok(resp))  ─► success counted
//!   │     ├─ Ok(Err(e))    ─► failure counted (application error)
//!   │     └─ Err(..)       ─► failure counted (panic / aborted)
//!   └─► allocator.release(worker)          (always)
//! ```
//!
//! ## Features
//! | Area               | Description                                                    | Key types / traits                         |
//! |--------------------|----------------------------------------------------------------|--------------------------------------------|
//! | **Allocation**     | Bounded access to workers with backpressure.                   | [`Allocator`], [`FixedPool`], [`Singleton`] |
//! | **Dispatch**       | Panic-safe submission pipeline with per-trigger statistics.     | [`TriggerBase`], [`Submission`]            |
//! | **Supervision**    | Stuck worker detection, restart, graceful shutdown.             | [`EventTimeoutWatcher`], [`Processor`]     |
//! | **Batching**       | Accumulate events up to a size or a deadline.                  | [`Batcher`], [`BatchConfig`]               |
//! | **Subscriber API** | Hook into runtime notices (logging, metrics, alerts).           | [`Subscribe`], [`Notice`]                  |
//! | **Errors**         | Typed errors for allocation, dispatch and lifecycle.            | [`SubmitError`], [`AllocatorError`]        |
//!
//! ## Optional features
//! - `logging` (default): exports the [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use eventvisor::{
//!     Allocator, Event, FixedPool, ProcessError, Response, Runtime, RuntimeFn, TriggerBase,
//!     TriggerConfig,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = FixedPool::with_runtimes(4, |_| {
//!         let rt: Arc<dyn Runtime> = RuntimeFn::arc(|event: Event| async move {
//!             Ok::<_, ProcessError>(Response::text(String::from_utf8_lossy(&event.body)))
//!         });
//!         Ok(rt)
//!     })?;
//!     let pool: Arc<dyn Allocator> = Arc::new(pool);
//!
//!     let trigger = TriggerBase::builder(TriggerConfig::new("http", "http"), pool).build()?;
//!
//!     let response = trigger
//!         .allocate_worker_and_submit_event(Event::new("hello"), None, Duration::from_secs(1))
//!         .await??;
//!     assert_eq!(response.body, b"hello");
//!     assert_eq!(trigger.statistics().events_handled_success_total, 1);
//!     Ok(())
//! }
//! ```
pub mod allocator;
mod config;
mod core;
mod error;
pub mod event;
mod notices;
mod subscribers;
pub mod trigger;
pub mod worker;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use allocator::{
    Allocator, AllocatorFactory, AllocatorStatistics, AllocatorStatisticsSnapshot, FixedPool,
    PartitionAllocator, PartitionCookie, PooledPartitionAllocator, Singleton,
    StaticPartitionAllocator,
};
pub use config::Config;
pub use crate::core::{
    EventTimeoutWatcher, Process, Processor, ProcessorBuilder, wait_for_shutdown_signal,
};
pub use error::{
    AllocatorError, CloudEventError, ProcessError, ProcessorError, RuntimeError, SignalError,
    SubmitError, TriggerError,
};
pub use event::{CloudEventAttributes, CloudEventMode, Event, EventId, Response, TriggerInfo};
pub use notices::{Bus, Notice, NoticeKind};
pub use subscribers::{NoticeRouter, NoticeScope, RouteStats, Subscribe};
pub use trigger::{
    Batch, BatchConfig, Batcher, Checkpoint, DEFAULT_WORKER_AVAILABILITY_TIMEOUT, RestartQueue,
    RestartRequest, TimeoutOutcome, Trigger, TriggerBase, TriggerBaseBuilder, TriggerConfig,
    TriggerStatistics, TriggerStatisticsSnapshot,
};
pub use worker::{
    ControlMessage, ControlMessageBroker, ControlMessageKind, ControlMessageQueue, Runtime,
    RuntimeFn, Submission, Worker,
};

// Built-in subscriber rendering notices through `tracing`.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
