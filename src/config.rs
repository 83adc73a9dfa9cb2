//! # Global processor configuration.
//!
//! Provides [`Config`], the centralized settings of a [`Processor`](crate::Processor)
//! and its [`EventTimeoutWatcher`](crate::EventTimeoutWatcher).
//!
//! Per-trigger settings live in [`TriggerConfig`](crate::TriggerConfig).
//!
//! ## Sentinel values
//! - `event_timeout = 0s` → no timeout watcher is started
//! - `bus_capacity` is clamped to a minimum of 1
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use eventvisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.event_timeout = Duration::from_secs(30);
//!
//! assert_eq!(cfg.event_timeout(), Some(Duration::from_secs(30)));
//! assert_eq!(cfg.shutdown_deadline(Duration::from_secs(30)), Duration::from_secs(300));
//! ```

use std::time::Duration;

/// Global configuration for the processor runtime.
///
/// ## Field semantics
/// - `event_timeout`: Maximum time a worker may spend on one event (`0s` = unsupervised)
/// - `shutdown_poll_interval`: How often a graceful shutdown re-checks in-flight workers
/// - `shutdown_deadline_factor`: Graceful shutdown waits at most `factor × event_timeout`
/// - `bus_capacity`: Notice bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct Config {
    /// Per-event processing deadline enforced by the timeout watcher.
    ///
    /// The watcher wakes up every `event_timeout` and inspects all workers.
    /// `Duration::ZERO` disables the watcher entirely.
    pub event_timeout: Duration,

    /// Polling period of the graceful-shutdown wait phase.
    pub shutdown_poll_interval: Duration,

    /// Multiplier applied to `event_timeout` to bound the graceful-shutdown wait phase.
    pub shutdown_deadline_factor: u32,

    /// Capacity of the notice bus broadcast channel ring buffer.
    ///
    /// Slow receivers that lag behind more than `bus_capacity` notices will
    /// receive `Lagged` and skip older items.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the event timeout as an `Option`.
    ///
    /// - `None` → no timeout watcher
    /// - `Some(d)` → workers busy for longer than `d` are timed out
    #[inline]
    pub fn event_timeout(&self) -> Option<Duration> {
        if self.event_timeout == Duration::ZERO {
            None
        } else {
            Some(self.event_timeout)
        }
    }

    /// Returns how long a graceful shutdown may wait for in-flight workers.
    #[inline]
    pub fn shutdown_deadline(&self, timeout: Duration) -> Duration {
        timeout.saturating_mul(self.shutdown_deadline_factor.max(1))
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `event_timeout = 0s` (no watcher)
    /// - `shutdown_poll_interval = 100ms`
    /// - `shutdown_deadline_factor = 10`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            event_timeout: Duration::ZERO,
            shutdown_poll_interval: Duration::from_millis(100),
            shutdown_deadline_factor: 10,
            bus_capacity: 1024,
        }
    }
}
