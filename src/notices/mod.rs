//! Runtime notices: types and broadcast bus.
//!
//! This module groups the notice **data model** and the **bus** used to
//! publish/subscribe to lifecycle notices emitted by the submission pipeline,
//! the timeout watcher, the processor and subscriber workers.
//!
//! ## Contents
//! - [`NoticeKind`], [`Notice`] notice classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `TriggerBase` (panics, restart requests), `EventTimeoutWatcher`,
//!   `Processor`, `NoticeRouter` (subscriber overflow/panic).
//! - **Consumers**: the processor's subscriber listener (routes to subscribers via `NoticeRouter`)
//!   and any caller holding [`Bus::subscribe`].

mod bus;
mod notice;

pub use bus::Bus;
pub use notice::{Notice, NoticeKind};
