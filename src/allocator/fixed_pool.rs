//! # Fixed-size, shareable worker pool.
//!
//! ```text
//! allocate(timeout):
//!   ├─ try_acquire()            ── ok ──► success (immediate)
//!   ├─ closed                   ───────► AllWorkersTerminated
//!   ├─ timeout == 0             ───────► NoAvailableWorkers
//!   └─ acquire() within timeout ── ok ──► success (after wait, wait time recorded)
//!                               ── ✗ ──► NoAvailableWorkers
//!   then: permit.forget(), pop a worker from the available queue
//!
//! release(worker):
//!   push worker back ─► add_permits(1)
//! ```
//!
//! The semaphore holds exactly one permit per worker in the available queue, so
//! a caller holding a permit always finds a worker to pop. Termination closes the
//! semaphore: waiting and future allocations fail with `AllWorkersTerminated`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, TryAcquireError};
use tokio::time::Instant;

use super::{Allocator, AllocatorStatistics, AllocatorStatisticsSnapshot, broadcast_signal};
use crate::error::{AllocatorError, RuntimeError, SignalError};
use crate::worker::{Runtime, Worker};

/// A pool of N workers handed out to concurrent callers.
pub struct FixedPool {
    workers: Vec<Arc<Worker>>,
    available: Mutex<VecDeque<Arc<Worker>>>,
    permits: Semaphore,
    terminated: AtomicBool,
    stats: AllocatorStatistics,
}

impl FixedPool {
    /// Creates a pool over the given workers.
    pub fn new(workers: Vec<Arc<Worker>>) -> Result<Self, AllocatorError> {
        if workers.is_empty() {
            return Err(AllocatorError::NoWorkers);
        }
        Ok(Self {
            available: Mutex::new(workers.iter().cloned().collect()),
            permits: Semaphore::new(workers.len()),
            workers,
            terminated: AtomicBool::new(false),
            stats: AllocatorStatistics::default(),
        })
    }

    /// Creates `size` workers, asking `new_runtime` for each worker's runtime.
    pub fn with_runtimes<F>(size: usize, mut new_runtime: F) -> Result<Self, AllocatorError>
    where
        F: FnMut(usize) -> Result<Arc<dyn Runtime>, RuntimeError>,
    {
        let workers = (0..size)
            .map(|index| {
                new_runtime(index)
                    .map(|rt| Arc::new(Worker::new(index, rt)))
                    .map_err(|e| AllocatorError::RuntimeCreation {
                        index,
                        error: e.as_message(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(workers)
    }

    /// Number of workers currently free.
    pub fn available_count(&self) -> usize {
        self.lock_available().len()
    }

    fn take(&self) -> Result<Arc<Worker>, AllocatorError> {
        let mut available = self.lock_available();
        let worker = available
            .pop_front()
            .ok_or(AllocatorError::NoAvailableWorkers)?;
        let percent = available.len() * 100 / self.workers.len();
        drop(available);

        self.stats.record_available_percentage(percent as u64);
        worker.check_out();
        Ok(worker)
    }

    fn owns(&self, worker: &Arc<Worker>) -> bool {
        self.workers.iter().any(|w| Arc::ptr_eq(w, worker))
    }

    fn lock_available(&self) -> MutexGuard<'_, VecDeque<Arc<Worker>>> {
        self.available.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Allocator for FixedPool {
    async fn allocate(&self, timeout: Duration) -> Result<Arc<Worker>, AllocatorError> {
        self.stats.record_attempt();

        let permit = match self.permits.try_acquire() {
            Ok(permit) => {
                self.stats.record_immediate_success();
                permit
            }
            Err(TryAcquireError::Closed) => return Err(AllocatorError::AllWorkersTerminated),
            Err(TryAcquireError::NoPermits) => {
                if timeout.is_zero() {
                    self.stats.record_timeout();
                    return Err(AllocatorError::NoAvailableWorkers);
                }
                let started = Instant::now();
                match tokio::time::timeout(timeout, self.permits.acquire()).await {
                    Ok(Ok(permit)) => {
                        self.stats.record_success_after_wait(started.elapsed());
                        permit
                    }
                    Ok(Err(_closed)) => return Err(AllocatorError::AllWorkersTerminated),
                    Err(_elapsed) => {
                        self.stats.record_timeout();
                        return Err(AllocatorError::NoAvailableWorkers);
                    }
                }
            }
        };

        permit.forget();
        self.take()
    }

    fn release(&self, worker: Arc<Worker>) {
        if !self.owns(&worker) {
            tracing::warn!(worker = worker.index(), "released worker does not belong to this pool");
            return;
        }
        if !worker.check_in() {
            tracing::warn!(worker = worker.index(), "worker released twice");
            return;
        }
        self.lock_available().push_back(worker);
        self.permits.add_permits(1);
    }

    fn shareable(&self) -> bool {
        true
    }

    fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    fn statistics(&self) -> AllocatorStatisticsSnapshot {
        self.stats.snapshot()
    }

    async fn signal_termination(&self) -> Result<(), SignalError> {
        self.permits.close();
        let res = broadcast_signal("termination", &self.workers, |w| async move {
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
    use std::collections::HashSet;

    use super::*;
    use crate::error::ProcessError;
    use crate::event::{Event, Response};
    use crate::worker::RuntimeFn;

    fn pool(size: usize) -> Arc<FixedPool> {
        Arc::new(
            FixedPool::with_runtimes(size, |_| {
                Ok(RuntimeFn::arc(|_ev: Event| async {
                    Ok::<_, ProcessError>(Response::default())
                }) as Arc<dyn Runtime>)
            })
            .unwrap(),
        )
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(matches!(FixedPool::new(Vec::new()), Err(AllocatorError::NoWorkers)));
    }

    #[test]
    fn runtime_creation_failure_names_the_worker() {
        let res = FixedPool::with_runtimes(3, |index| {
            if index == 2 {
                Err(RuntimeError::fail("no socket"))
            } else {
                Ok(RuntimeFn::arc(|_ev: Event| async {
                    Ok::<_, ProcessError>(Response::default())
                }) as Arc<dyn Runtime>)
            }
        });
        assert!(matches!(
            res,
            Err(AllocatorError::RuntimeCreation { index: 2, .. })
        ));
    }

    #[tokio::test]
    async fn never_hands_out_more_than_pool_size() {
        let pool = pool(3);
        let mut held = Vec::new();
        for _ in 0..3 {
            held.push(pool.allocate(Duration::ZERO).await.unwrap());
        }
        let distinct: HashSet<usize> = held.iter().map(|w| w.index()).collect();
        assert_eq!(distinct.len(), 3);

        assert_eq!(
            pool.allocate(Duration::ZERO).await.unwrap_err(),
            AllocatorError::NoAvailableWorkers
        );

        let w = held.pop().unwrap();
        let index = w.index();
        pool.release(w);
        assert_eq!(pool.allocate(Duration::ZERO).await.unwrap().index(), index);
    }

    #[tokio::test(start_paused = true)]
    async fn allocate_waits_for_the_full_timeout() {
        let pool = pool(1);
        let _held = pool.allocate(Duration::ZERO).await.unwrap();

        let started = Instant::now();
        let err = pool.allocate(Duration::from_millis(200)).await.unwrap_err();
        assert_eq!(err, AllocatorError::NoAvailableWorkers);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(200));
        assert!(waited < Duration::from_millis(210));
        assert_eq!(pool.statistics().timeout_total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_allocation_gets_the_released_worker() {
        let pool = pool(1);
        let held = pool.allocate(Duration::ZERO).await.unwrap();

        let releaser = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                pool.release(held);
            })
        };

        let w = pool.allocate(Duration::from_secs(1)).await.unwrap();
        assert_eq!(w.index(), 0);
        releaser.await.unwrap();

        let stats = pool.statistics();
        assert_eq!(stats.allocation_count, 2);
        assert_eq!(stats.success_immediate_total, 1);
        assert_eq!(stats.success_after_wait_total, 1);
        assert_eq!(stats.wait_duration_ms_sum, 50);
    }

    #[tokio::test]
    async fn double_release_does_not_duplicate_a_worker() {
        let pool = pool(2);
        let w = pool.allocate(Duration::ZERO).await.unwrap();
        pool.release(Arc::clone(&w));
        pool.release(w);
        assert_eq!(pool.available_count(), 2);

        let a = pool.allocate(Duration::ZERO).await.unwrap();
        let b = pool.allocate(Duration::ZERO).await.unwrap();
        assert_ne!(a.index(), b.index());
        assert!(pool.allocate(Duration::ZERO).await.is_err());
    }

    #[tokio::test]
    async fn available_percentage_is_summed() {
        let pool = pool(4);
        let _a = pool.allocate(Duration::ZERO).await.unwrap();
        let _b = pool.allocate(Duration::ZERO).await.unwrap();
        // 3/4 then 2/4 left after each allocation
        assert_eq!(pool.statistics().workers_available_percentage, 75 + 50);
    }

    #[tokio::test]
    async fn termination_fails_later_allocations() {
        let pool = pool(2);
        assert!(!pool.is_terminated());
        pool.signal_termination().await.unwrap();
        assert!(pool.is_terminated());
        assert!(pool.workers().iter().all(|w| w.is_termination_signaled()));
        assert_eq!(
            pool.allocate(Duration::from_secs(1)).await.unwrap_err(),
            AllocatorError::AllWorkersTerminated
        );
    }

    #[tokio::test(start_paused = true)]
    async fn termination_wakes_waiting_allocations() {
        let pool = pool(1);
        let _held = pool.allocate(Duration::ZERO).await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.allocate(Duration::from_secs(60)).await })
        };
        tokio::task::yield_now().await;
        pool.signal_termination().await.unwrap();

        assert_eq!(
            waiter.await.unwrap().unwrap_err(),
            AllocatorError::AllWorkersTerminated
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_never_share_a_worker() {
        use std::sync::atomic::AtomicUsize;

        let pool = pool(3);
        let owners: Arc<Vec<AtomicUsize>> = Arc::new((0..3).map(|_| AtomicUsize::new(0)).collect());

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let owners = Arc::clone(&owners);
                tokio::spawn(async move {
                    for _ in 0..20 {
                        let w = pool.allocate(Duration::from_secs(5)).await.unwrap();
                        let prev = owners[w.index()].fetch_add(1, Ordering::SeqCst);
                        assert_eq!(prev, 0, "worker {} shared", w.index());
                        tokio::task::yield_now().await;
                        owners[w.index()].fetch_sub(1, Ordering::SeqCst);
                        pool.release(w);
                    }
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(pool.available_count(), 3);
    }
}
