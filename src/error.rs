//! Error types used by the worker pool, the submission pipeline and the processor.
//!
//! The taxonomy follows how callers are expected to react:
//!
//! - [`AllocatorError`] backpressure (`NoAvailableWorkers`) or a pool that is gone for good.
//! - [`ProcessError`] a normal application-level failure returned by user code.
//! - [`SubmitError`] anything that kept an event from reaching (or finishing on) a worker.
//! - [`RuntimeError`] failures of the execution engine behind a worker.
//! - [`SignalError`] aggregated failures of a lifecycle signal fanned out to workers.
//! - [`TriggerError`] / [`ProcessorError`] event source and process level failures.
//!
//! Every enum provides `as_label` (stable snake_case, for logs/metrics) and `as_message`.

use std::time::Duration;

use thiserror::Error;

/// # Errors produced by worker allocators.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocatorError {
    /// No worker became available within the allocation timeout.
    ///
    /// This is expected under load and should be handled as backpressure.
    #[error("no available workers")]
    NoAvailableWorkers,

    /// The allocator was terminated; it will never hand out a worker again.
    #[error("all workers are terminated")]
    AllWorkersTerminated,

    /// An allocator was requested with zero workers.
    #[error("allocator requires at least one worker")]
    NoWorkers,

    /// The runtime backing a worker could not be created.
    #[error("failed to create runtime for worker {index}: {error}")]
    RuntimeCreation {
        /// Index of the worker being created.
        index: usize,
        /// Underlying error message.
        error: String,
    },
}

impl AllocatorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventvisor::AllocatorError;
    ///
    /// assert_eq!(AllocatorError::NoAvailableWorkers.as_label(), "allocator_no_available_workers");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            AllocatorError::NoAvailableWorkers => "allocator_no_available_workers",
            AllocatorError::AllWorkersTerminated => "allocator_all_workers_terminated",
            AllocatorError::NoWorkers => "allocator_no_workers",
            AllocatorError::RuntimeCreation { .. } => "allocator_runtime_creation",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// True for the recoverable, load-induced case.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, AllocatorError::NoAvailableWorkers)
    }
}

/// # Errors raised by the execution engine behind a worker.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The runtime cannot be restarted in place.
    #[error("runtime does not support restart")]
    RestartUnsupported,

    /// The runtime failed to carry out a request.
    #[error("runtime failure: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },
}

impl RuntimeError {
    /// Shorthand for [`RuntimeError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        RuntimeError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::RestartUnsupported => "runtime_restart_unsupported",
            RuntimeError::Fail { .. } => "runtime_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::RestartUnsupported => "restart unsupported".to_string(),
            RuntimeError::Fail { error } => format!("error: {error}"),
        }
    }
}

/// # Aggregated failure of a signal broadcast to many workers.
///
/// The broadcast is best effort: every worker is signaled, and each failure is
/// collected here together with the index of the worker that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to signal {signal} to {} worker(s): {failures:?}", failures.len())]
pub struct SignalError {
    /// Name of the signal (`draining`, `continue`, `termination`, ...).
    pub signal: &'static str,
    /// Per-worker failures as `(worker index, error)`.
    pub failures: Vec<(usize, RuntimeError)>,
}

impl SignalError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        "signal_failed"
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        let indices: Vec<usize> = self.failures.iter().map(|(index, _)| *index).collect();
        format!("signal {} failed on workers {indices:?}", self.signal)
    }
}

/// # Application-level failure returned by user code.
///
/// This is a normal outcome of invoking a function: it is recorded in the
/// statistics and returned to the caller, never treated as an infrastructure fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProcessError {
    /// Description of the failure.
    pub message: String,
    /// Optional status code the event source may translate for its protocol.
    pub status_code: Option<u16>,
}

impl ProcessError {
    /// Creates a process error without a status code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
        }
    }

    /// Attaches a status code.
    #[must_use]
    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// # Errors decoding a cloud event envelope.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudEventError {
    /// A structured cloud event body was not valid JSON of the expected shape.
    #[error("invalid structured cloud event: {error}")]
    InvalidStructured {
        /// Decoder error message.
        error: String,
    },

    /// An `eventTime` attribute could not be parsed as RFC 3339.
    #[error("invalid cloud event time {value:?}: {error}")]
    InvalidTime {
        /// The offending value.
        value: String,
        /// Parser error message.
        error: String,
    },
}

impl CloudEventError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CloudEventError::InvalidStructured { .. } => "cloud_event_invalid_structured",
            CloudEventError::InvalidTime { .. } => "cloud_event_invalid_time",
        }
    }
}

/// # Errors produced by the submission pipeline.
///
/// These describe why an event did not produce an application outcome.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// A worker could not be allocated.
    #[error("failed to allocate worker: {0}")]
    Allocation(#[from] AllocatorError),

    /// The event declared a cloud event envelope that could not be decoded.
    #[error("failed to wrap cloud event: {0}")]
    Envelope(#[from] CloudEventError),

    /// The dispatch panicked; the worker was recovered and returned to its pool.
    #[error("caught panic: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },

    /// The in-flight event was aborted by the timeout watcher.
    #[error("event aborted after {elapsed:?}")]
    EventAborted {
        /// How long the event had been running.
        elapsed: Duration,
    },
}

impl SubmitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use eventvisor::{AllocatorError, SubmitError};
    ///
    /// let err = SubmitError::from(AllocatorError::NoAvailableWorkers);
    /// assert_eq!(err.as_label(), "submit_allocation");
    /// assert!(err.is_backpressure());
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SubmitError::Allocation(_) => "submit_allocation",
            SubmitError::Envelope(_) => "submit_envelope",
            SubmitError::Panicked { .. } => "submit_panicked",
            SubmitError::EventAborted { .. } => "submit_event_aborted",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SubmitError::Allocation(e) => format!("allocation: {}", e.as_message()),
            SubmitError::Envelope(e) => format!("envelope: {e}"),
            SubmitError::Panicked { message } => format!("panic: {message}"),
            SubmitError::EventAborted { elapsed } => format!("aborted after {elapsed:?}"),
        }
    }

    /// True when the caller should treat this as load shedding (e.g. reject the request).
    pub fn is_backpressure(&self) -> bool {
        matches!(self, SubmitError::Allocation(e) if e.is_backpressure())
    }
}

/// # Errors produced by event sources (triggers).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// The trigger dispatches concurrently and needs a shareable allocator.
    #[error("trigger {trigger} requires a shareable worker allocator")]
    NotShareable {
        /// Trigger identifier.
        trigger: String,
    },

    /// Allocator failure.
    #[error(transparent)]
    Allocator(#[from] AllocatorError),

    /// A lifecycle signal failed on some workers.
    #[error(transparent)]
    Signal(#[from] SignalError),

    /// The restart-request queue has no consumer anymore.
    #[error("restart queue closed")]
    RestartQueueClosed,

    /// The trigger failed to start.
    #[error("failed to start trigger: {error}")]
    Start {
        /// Underlying error message.
        error: String,
    },

    /// The trigger failed to stop.
    #[error("failed to stop trigger: {error}")]
    Stop {
        /// Underlying error message.
        error: String,
    },
}

impl TriggerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TriggerError::NotShareable { .. } => "trigger_not_shareable",
            TriggerError::Allocator(_) => "trigger_allocator",
            TriggerError::Signal(_) => "trigger_signal",
            TriggerError::RestartQueueClosed => "trigger_restart_queue_closed",
            TriggerError::Start { .. } => "trigger_start",
            TriggerError::Stop { .. } => "trigger_stop",
        }
    }
}

/// # Errors produced by the owning processor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProcessorError {
    /// OS signal listeners could not be registered.
    #[error("failed to listen for shutdown signals: {0}")]
    ShutdownSignal(#[from] std::io::Error),

    /// A trigger failed to start.
    #[error("trigger {trigger} failed: {error}")]
    Trigger {
        /// Trigger identifier.
        trigger: String,
        /// Underlying trigger error.
        error: TriggerError,
    },

    /// `run` was called twice.
    #[error("processor already running")]
    AlreadyRunning,
}

impl ProcessorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessorError::ShutdownSignal(_) => "processor_shutdown_signal",
            ProcessorError::Trigger { .. } => "processor_trigger",
            ProcessorError::AlreadyRunning => "processor_already_running",
        }
    }
}

/// Renders a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
