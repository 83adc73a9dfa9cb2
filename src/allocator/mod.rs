//! # Worker allocators.
//!
//! An [`Allocator`] owns a fixed set of [`Worker`]s and gates access to them.
//!
//! | Allocator     | Workers | Shareable | `allocate(timeout)`                                  |
//! |---------------|---------|-----------|------------------------------------------------------|
//! | [`Singleton`] | 1       | no        | always the one worker (timeout ignored)              |
//! | [`FixedPool`] | N       | yes       | free worker, or wait up to `timeout` for a release   |
//!
//! Failure semantics:
//! - [`AllocatorError::NoAvailableWorkers`] is backpressure; callers shed load.
//! - [`AllocatorError::AllWorkersTerminated`] is final for the allocator.
//!
//! Lifecycle signals (`draining`, `continue`, `termination`) are delivered to all
//! workers concurrently; one worker's failure never stops the others from being
//! signaled. Failures come back together as a [`SignalError`].
//!
//! Stream sources that pin partitions to workers layer a [`PartitionAllocator`]
//! on top of an allocator.

mod factory;
mod fixed_pool;
mod partition;
mod singleton;
mod statistics;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::{AllocatorError, RuntimeError, SignalError};
use crate::worker::Worker;

pub use factory::AllocatorFactory;
pub use fixed_pool::FixedPool;
pub use partition::{
    PartitionAllocator, PartitionCookie, PooledPartitionAllocator, StaticPartitionAllocator,
};
pub use singleton::Singleton;
pub use statistics::{AllocatorStatistics, AllocatorStatisticsSnapshot};

/// # Bounded access to a set of workers.
#[async_trait]
pub trait Allocator: Send + Sync + 'static {
    /// Takes a worker, waiting at most `timeout` for one to be released.
    ///
    /// A zero `timeout` fails immediately when no worker is free.
    async fn allocate(&self, timeout: Duration) -> Result<Arc<Worker>, AllocatorError>;

    /// Returns a worker taken with [`allocate`](Self::allocate).
    fn release(&self, worker: Arc<Worker>);

    /// Whether independent callers may allocate and release concurrently.
    fn shareable(&self) -> bool;

    /// Every worker owned by the allocator, in index order.
    fn workers(&self) -> &[Arc<Worker>];

    /// Current allocation counters.
    fn statistics(&self) -> AllocatorStatisticsSnapshot;

    /// Asks every worker to drain.
    async fn signal_draining(&self) -> Result<(), SignalError> {
        broadcast_signal("draining", self.workers(), |w| async move { w.drain().await }).await
    }

    /// Tells every worker to resume after a drain.
    async fn signal_continue(&self) -> Result<(), SignalError> {
        broadcast_signal("continue", self.workers(), |w| async move {
            w.continue_processing().await
        })
        .await
    }

    /// Terminates every worker; afterwards no allocation succeeds.
    async fn signal_termination(&self) -> Result<(), SignalError>;

    /// True once [`signal_termination`](Self::signal_termination) has completed.
    fn is_terminated(&self) -> bool;
}

/// Sends a signal to every worker concurrently and joins the failures.
pub(crate) async fn broadcast_signal<F, Fut>(
    signal: &'static str,
    workers: &[Arc<Worker>],
    f: F,
) -> Result<(), SignalError>
where
    F: Fn(Arc<Worker>) -> Fut,
    Fut: Future<Output = Result<(), RuntimeError>> + Send,
{
    let results = join_all(workers.iter().map(|w| {
        let index = w.index();
        let fut = f(Arc::clone(w));
        async move { (index, fut.await) }
    }))
    .await;

    let failures: Vec<(usize, RuntimeError)> = results
        .into_iter()
        .filter_map(|(index, res)| res.err().map(|e| (index, e)))
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        tracing::warn!(signal, failed = failures.len(), "signal failed on some workers");
        Err(SignalError { signal, failures })
    }
}
