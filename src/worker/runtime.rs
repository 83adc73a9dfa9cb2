//! # The execution engine behind a worker.
//!
//! A [`Runtime`] runs user code for one event at a time. The worker pool never
//! looks inside it: it only invokes [`Runtime::process_event`] and forwards
//! lifecycle signals. Everything except `process_event` has a default, so a
//! plain function only needs that one method (see [`RuntimeFn`](crate::RuntimeFn)).

use async_trait::async_trait;

use crate::error::{ProcessError, RuntimeError};
use crate::event::{Event, Response};
use crate::worker::control::{ControlMessageKind, ControlMessageQueue};

/// # Opaque callable that executes user code.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use eventvisor::{Event, ProcessError, Response, Runtime};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Runtime for Echo {
///     async fn process_event(&self, event: &Event) -> Result<Response, ProcessError> {
///         Ok(Response::text(String::from_utf8_lossy(&event.body)))
///     }
/// }
/// ```
#[async_trait]
pub trait Runtime: Send + Sync + 'static {
    /// Runs user code for one event.
    ///
    /// A returned [`ProcessError`] is a normal application outcome.
    async fn process_event(&self, event: &Event) -> Result<Response, ProcessError>;

    /// Whether the runtime can be restarted in place after getting stuck.
    fn supports_restart(&self) -> bool {
        false
    }

    /// Restarts the runtime.
    async fn restart(&self) -> Result<(), RuntimeError> {
        Err(RuntimeError::RestartUnsupported)
    }

    /// Asks the runtime to finish or abandon its current work and accept no new work.
    async fn drain(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Resumes processing after a drain.
    async fn continue_processing(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Tells the runtime the process is going away.
    async fn terminate(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Routes control messages of `kind` to `queue`.
    async fn subscribe_to_control_message_kind(
        &self,
        _kind: ControlMessageKind,
        _queue: ControlMessageQueue,
    ) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Stops routing control messages of `kind` to `queue`.
    async fn unsubscribe_from_control_message_kind(
        &self,
        _kind: ControlMessageKind,
        _queue: &ControlMessageQueue,
    ) -> Result<(), RuntimeError> {
        Ok(())
    }
}
