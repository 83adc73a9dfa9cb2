//! # Single-worker allocator.
//!
//! Hands the same worker to every caller. At most one caller is expected at a
//! time, by convention of the event source using it, so [`Singleton`] reports
//! itself as not shareable and sources that dispatch concurrently refuse it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{Allocator, AllocatorStatistics, AllocatorStatisticsSnapshot, broadcast_signal};
use crate::error::{AllocatorError, SignalError};
use crate::worker::{Runtime, Worker};

/// Allocator over exactly one worker.
pub struct Singleton {
    worker: [Arc<Worker>; 1],
    closed: AtomicBool,
    terminated: AtomicBool,
    stats: AllocatorStatistics,
}

impl Singleton {
    /// Wraps an existing worker.
    pub fn new(worker: Arc<Worker>) -> Self {
        Self {
            worker: [worker],
            closed: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            stats: AllocatorStatistics::default(),
        }
    }

    /// Creates worker 0 over `runtime`.
    pub fn with_runtime(runtime: Arc<dyn Runtime>) -> Self {
        Self::new(Arc::new(Worker::new(0, runtime)))
    }
}

#[async_trait]
impl Allocator for Singleton {
    async fn allocate(&self, _timeout: Duration) -> Result<Arc<Worker>, AllocatorError> {
        self.stats.record_attempt();
        if self.closed.load(Ordering::Acquire) {
            return Err(AllocatorError::AllWorkersTerminated);
        }
        self.stats.record_immediate_success();
        Ok(Arc::clone(&self.worker[0]))
    }

    fn release(&self, _worker: Arc<Worker>) {}

    fn shareable(&self) -> bool {
        false
    }

    fn workers(&self) -> &[Arc<Worker>] {
        &self.worker
    }

    fn statistics(&self) -> AllocatorStatisticsSnapshot {
        self.stats.snapshot()
    }

    async fn signal_termination(&self) -> Result<(), SignalError> {
        // refuse allocations before the workers start terminating
        self.closed.store(true, Ordering::Release);
        let res = broadcast_signal("termination", &self.worker, |w| async move {
            w.terminate().await
        })
        .await;
        self.terminated.store(true, Ordering::Release);
        res
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProcessError, RuntimeError};
    use crate::event::{Event, Response};
    use crate::worker::RuntimeFn;

    struct SlowTermination;

    #[async_trait]
    impl Runtime for SlowTermination {
        async fn process_event(&self, _event: &Event) -> Result<Response, ProcessError> {
            Ok(Response::default())
        }

        async fn terminate(&self) -> Result<(), RuntimeError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        }
    }

    fn singleton() -> Singleton {
        Singleton::with_runtime(RuntimeFn::arc(|_ev: Event| async {
            Ok::<_, ProcessError>(Response::default())
        }))
    }

    #[tokio::test]
    async fn always_returns_the_same_worker() {
        let s = singleton();
        assert!(!s.shareable());
        let a = s.allocate(Duration::ZERO).await.unwrap();
        let b = s.allocate(Duration::ZERO).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        s.release(a);
        assert_eq!(s.statistics().success_immediate_total, 2);
    }

    #[tokio::test]
    async fn terminated_singleton_refuses_allocation() {
        let s = singleton();
        s.signal_termination().await.unwrap();
        assert!(s.is_terminated());
        assert_eq!(
            s.allocate(Duration::ZERO).await.unwrap_err(),
            AllocatorError::AllWorkersTerminated
        );
    }

    #[tokio::test(start_paused = true)]
    async fn allocation_fails_while_termination_is_in_progress() {
        let s = Arc::new(Singleton::with_runtime(Arc::new(SlowTermination)));
        let terminating = tokio::spawn({
            let s = Arc::clone(&s);
            async move { s.signal_termination().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!s.is_terminated());
        assert_eq!(
            s.allocate(Duration::ZERO).await.unwrap_err(),
            AllocatorError::AllWorkersTerminated
        );

        terminating.await.unwrap().unwrap();
        assert!(s.is_terminated());
    }
}
