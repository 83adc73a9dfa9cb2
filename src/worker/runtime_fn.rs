//! # Function-backed runtime (`RuntimeFn`)
//!
//! [`RuntimeFn`] wraps a closure `F: Fn(Event) -> Fut`, producing a fresh
//! future per event. The closure receives its own copy of the event, so the
//! returned future owns everything it touches.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use eventvisor::{Event, ProcessError, Response, Runtime, RuntimeFn};
//!
//! let rt: Arc<dyn Runtime> = RuntimeFn::arc(|event: Event| async move {
//!     Ok::<_, ProcessError>(Response::text(format!("{} bytes", event.body.len())))
//! });
//! assert!(!rt.supports_restart());
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProcessError;
use crate::event::{Event, Response};
use crate::worker::runtime::Runtime;

/// Function-backed runtime implementation.
#[derive(Debug)]
pub struct RuntimeFn<F> {
    f: F,
}

impl<F> RuntimeFn<F> {
    /// Creates a new function-backed runtime.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the runtime and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Runtime for RuntimeFn<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, ProcessError>> + Send + 'static,
{
    async fn process_event(&self, event: &Event) -> Result<Response, ProcessError> {
        (self.f)(event.clone()).await
    }
}
