//! # Workers and the runtimes behind them.
//!
//! - [`Worker`] an execution slot with a stable index and an in-flight marker
//! - [`Runtime`] the opaque callable that runs user code
//! - [`RuntimeFn`] closure-backed [`Runtime`]
//! - [`ControlMessage`] out-of-band messages from user code to its event source

mod control;
mod runtime;
mod runtime_fn;
#[allow(clippy::module_inception)]
mod worker;

pub use control::{ControlMessage, ControlMessageBroker, ControlMessageKind, ControlMessageQueue};
pub use runtime::Runtime;
pub use runtime_fn::RuntimeFn;
pub use worker::{Submission, Worker};
