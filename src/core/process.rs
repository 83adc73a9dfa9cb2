//! # The process owning a set of triggers.
//!
//! The timeout watcher only needs two things from its owner: the triggers to
//! inspect, and a way to shut everything down. [`Processor`](crate::Processor)
//! is the full implementation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::trigger::Trigger;

/// # Owner of the triggers supervised by the timeout watcher.
#[async_trait]
pub trait Process: Send + Sync + 'static {
    /// Every trigger of the process.
    fn triggers(&self) -> Vec<Arc<dyn Trigger>>;

    /// Shuts the whole process down.
    async fn stop(&self);
}
