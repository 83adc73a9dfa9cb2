//! Runtime core: timeout supervision and process lifecycle.
//!
//! - [`timeout`]: the event timeout watcher and its graceful-shutdown escalation;
//! - [`process`]: the [`Process`] seam the watcher drives;
//! - [`processor`]: the concrete process owning triggers, watcher and notice delivery;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod process;
mod processor;
mod shutdown;
mod timeout;

pub use builder::ProcessorBuilder;
pub use process::Process;
pub use processor::Processor;
pub use shutdown::wait_for_shutdown_signal;
pub use timeout::EventTimeoutWatcher;
