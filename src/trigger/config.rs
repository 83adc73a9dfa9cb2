//! # Per-trigger configuration.
//!
//! ## Sentinel values
//! - `max_workers = 0` → the trigger gets a [`Singleton`](crate::Singleton) allocator
//! - `worker_allocator_name = None` → the allocator is private to the trigger
//! - `worker_availability_timeout = 0s` → allocation fails immediately when no worker is free
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use eventvisor::TriggerConfig;
//!
//! let cfg = TriggerConfig::new("orders", "kafka")
//!     .with_max_workers(8)
//!     .with_allocator_name("shared-pool");
//!
//! assert_eq!(cfg.max_workers, 8);
//! assert_eq!(cfg.worker_availability_timeout, Duration::from_secs(10));
//! ```

use std::collections::HashMap;
use std::time::Duration;

/// Default time to wait for a free worker.
pub const DEFAULT_WORKER_AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of one event source.
#[derive(Clone, Debug)]
pub struct TriggerConfig {
    /// User given identifier, unique within a process.
    pub id: String,
    /// Specific kind of source (`http`, `kafka`, `cron`, ...).
    pub kind: String,
    /// Class of source (`sync` for request/response, `async` for streams and timers).
    pub class: String,
    /// Number of workers; `0` selects a single, non-shareable worker.
    pub max_workers: usize,
    /// How long a dispatch waits for a free worker.
    pub worker_availability_timeout: Duration,
    /// Name under which the allocator is shared with other triggers.
    pub worker_allocator_name: Option<String>,
    /// Batching settings.
    pub batch: BatchConfig,
    /// Source specific attributes, passed through untouched.
    pub attributes: HashMap<String, serde_json::Value>,
}

impl TriggerConfig {
    /// Creates a configuration with defaults for everything but the identity.
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            class: "async".to_string(),
            max_workers: 1,
            worker_availability_timeout: DEFAULT_WORKER_AVAILABILITY_TIMEOUT,
            worker_allocator_name: None,
            batch: BatchConfig::default(),
            attributes: HashMap::new(),
        }
    }

    /// Sets the class.
    #[must_use]
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    /// Sets the number of workers.
    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the worker availability timeout.
    #[must_use]
    pub fn with_worker_availability_timeout(mut self, timeout: Duration) -> Self {
        self.worker_availability_timeout = timeout;
        self
    }

    /// Shares the allocator with other triggers using the same name.
    #[must_use]
    pub fn with_allocator_name(mut self, name: impl Into<String>) -> Self {
        self.worker_allocator_name = Some(name.into());
        self
    }

    /// Sets the batching settings.
    #[must_use]
    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    /// Adds a source specific attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

/// Batching settings of a trigger.
///
/// - `batch_size`: a batch is flushed as soon as it holds this many events (min 1)
/// - `timeout`: a non-empty batch is flushed after this long even if not full
/// - `empty_poll_interval`: how often an empty batch is re-checked
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Whether the trigger batches at all.
    pub enabled: bool,
    /// Capacity of one batch.
    pub batch_size: usize,
    /// Flush deadline once the first event is in.
    pub timeout: Duration,
    /// Re-check period while the batch is empty.
    pub empty_poll_interval: Duration,
}

impl BatchConfig {
    /// Enabled batching with the given size and timeout.
    pub fn enabled(batch_size: usize, timeout: Duration) -> Self {
        Self {
            enabled: true,
            batch_size,
            timeout,
            ..Self::default()
        }
    }

    /// Returns a batch size clamped to a minimum of 1.
    #[inline]
    pub fn batch_size_clamped(&self) -> usize {
        self.batch_size.max(1)
    }
}

impl Default for BatchConfig {
    /// Disabled, size 1, `1s` timeout, `10ms` empty poll interval.
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: 1,
            timeout: Duration::from_secs(1),
            empty_poll_interval: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = TriggerConfig::new("t", "cron");
        assert_eq!(cfg.class, "async");
        assert_eq!(cfg.max_workers, 1);
        assert!(cfg.worker_allocator_name.is_none());
        assert!(!cfg.batch.enabled);
    }

    #[test]
    fn batch_size_is_clamped() {
        let batch = BatchConfig::enabled(0, Duration::from_millis(50));
        assert!(batch.enabled);
        assert_eq!(batch.batch_size_clamped(), 1);
    }
}
