//! # Notice subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`NoticeScope`] a subscriber
//! narrows its notices with, and the [`NoticeRouter`] delivering runtime
//! [`Notice`](crate::Notice)s to each subscriber.
//!
//! ## Architecture
//! ```text
//! Notice flow:
//!   Watcher/TriggerBase ── publish(Notice) ──► Bus ──► processor listener
//!                                                          │
//!                                                   NoticeRouter::route
//!                                                ┌─────────┼─────────┐
//!                                             scope?    scope?    scope?
//!                                                ▼         ▼         ▼
//!                                            LogWriter  Metrics   Custom
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use eventvisor::{Notice, NoticeKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct Alerts;
//!
//! #[async_trait]
//! impl Subscribe for Alerts {
//!     async fn on_notice(&self, notice: &Notice) {
//!         if notice.kind == NoticeKind::GracefulShutdownStarted {
//!             // page someone
//!         }
//!     }
//!     fn name(&self) -> &'static str { "alerts" }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod router;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use router::{NoticeRouter, RouteStats};
pub use subscribe::{NoticeScope, Subscribe};
