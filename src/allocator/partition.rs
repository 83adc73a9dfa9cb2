//! # Partition-aware allocation for stream sources.
//!
//! Stream sources (Kafka, Kinesis, v3io streams, ...) read many partitions and
//! dispatch each partition's messages to a worker. Two strategies:
//!
//! - [`PooledPartitionAllocator`]: any free worker serves any partition; best throughput.
//! - [`StaticPartitionAllocator`]: every partition is pinned to one worker so
//!   in-order state stays on that worker; a busy worker holds up its partitions
//!   even when other workers are idle.
//!
//! ```text
//! topic "orders", partitions [0, 1, 2, 7], 2 workers:
//!
//!   partition index:  0     1     2     3
//!   partition id:     0     1     2     7
//!   slot:             0     1     0     1     (index % workers)
//! ```
//!
//! Allocation returns a [`PartitionCookie`] that must be handed back on release.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, TryAcquireError};

use super::Allocator;
use crate::error::AllocatorError;
use crate::worker::Worker;

/// Ties an allocated worker to the slot it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionCookie(Option<usize>);

/// # Worker allocation keyed by topic and partition.
#[async_trait]
pub trait PartitionAllocator: Send + Sync + 'static {
    /// Takes the worker for `topic`/`partition`, waiting at most `timeout`.
    async fn allocate(
        &self,
        topic: &str,
        partition: i32,
        timeout: Duration,
    ) -> Result<(Arc<Worker>, PartitionCookie), AllocatorError>;

    /// Returns a worker taken with [`allocate`](Self::allocate).
    fn release(&self, cookie: PartitionCookie, worker: Arc<Worker>);

    /// Gives every worker back to the underlying allocator.
    async fn stop(&self);
}

/// Serves every partition from a shared allocator.
pub struct PooledPartitionAllocator {
    allocator: Arc<dyn Allocator>,
}

impl PooledPartitionAllocator {
    /// Wraps `allocator`.
    pub fn new(allocator: Arc<dyn Allocator>) -> Self {
        Self { allocator }
    }
}

#[async_trait]
impl PartitionAllocator for PooledPartitionAllocator {
    async fn allocate(
        &self,
        _topic: &str,
        _partition: i32,
        timeout: Duration,
    ) -> Result<(Arc<Worker>, PartitionCookie), AllocatorError> {
        let worker = self.allocator.allocate(timeout).await?;
        Ok((worker, PartitionCookie(None)))
    }

    fn release(&self, _cookie: PartitionCookie, worker: Arc<Worker>) {
        self.allocator.release(worker);
    }

    async fn stop(&self) {}
}

struct Slot {
    worker: Mutex<Option<Arc<Worker>>>,
    permit: Semaphore,
}

impl Slot {
    fn new(worker: Arc<Worker>) -> Self {
        Self {
            worker: Mutex::new(Some(worker)),
            permit: Semaphore::new(1),
        }
    }

    fn take(&self) -> Option<Arc<Worker>> {
        self.worker.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    fn put(&self, worker: Arc<Worker>) {
        *self.worker.lock().unwrap_or_else(|p| p.into_inner()) = Some(worker);
        self.permit.add_permits(1);
    }
}

/// Pins every partition to one worker.
pub struct StaticPartitionAllocator {
    allocator: Arc<dyn Allocator>,
    slots: Vec<Slot>,
    assignments: HashMap<String, HashMap<i32, usize>>,
}

impl StaticPartitionAllocator {
    /// Takes every free worker out of `allocator` and spreads `partitions` over them.
    ///
    /// `partitions` maps a topic to its partition ids; the n-th partition of a
    /// topic goes to slot `n % workers`.
    pub async fn new(
        allocator: Arc<dyn Allocator>,
        partitions: &HashMap<String, Vec<i32>>,
    ) -> Result<Self, AllocatorError> {
        let mut slots = Vec::new();
        loop {
            match allocator.allocate(Duration::ZERO).await {
                Ok(worker) => slots.push(Slot::new(worker)),
                Err(AllocatorError::NoAvailableWorkers) => break,
                Err(e) => return Err(e),
            }
            if !allocator.shareable() {
                break;
            }
        }
        if slots.is_empty() {
            return Err(AllocatorError::NoAvailableWorkers);
        }

        let assignments = partitions
            .iter()
            .map(|(topic, ids)| {
                let by_id = ids
                    .iter()
                    .enumerate()
                    .map(|(position, id)| (*id, position % slots.len()))
                    .collect();
                (topic.clone(), by_id)
            })
            .collect();

        tracing::debug!(workers = slots.len(), topics = partitions.len(), "assigned partitions to workers");
        Ok(Self {
            allocator,
            slots,
            assignments,
        })
    }

    /// Index of the slot serving `topic`/`partition`.
    pub fn slot_of(&self, topic: &str, partition: i32) -> Option<usize> {
        self.assignments.get(topic)?.get(&partition).copied()
    }
}

#[async_trait]
impl PartitionAllocator for StaticPartitionAllocator {
    async fn allocate(
        &self,
        topic: &str,
        partition: i32,
        timeout: Duration,
    ) -> Result<(Arc<Worker>, PartitionCookie), AllocatorError> {
        let index = self
            .slot_of(topic, partition)
            .ok_or(AllocatorError::NoAvailableWorkers)?;
        let slot = &self.slots[index];

        let permit = match slot.permit.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(AllocatorError::AllWorkersTerminated),
            Err(TryAcquireError::NoPermits) if timeout.is_zero() => {
                return Err(AllocatorError::NoAvailableWorkers);
            }
            Err(TryAcquireError::NoPermits) => {
                match tokio::time::timeout(timeout, slot.permit.acquire()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_closed)) => return Err(AllocatorError::AllWorkersTerminated),
                    Err(_elapsed) => return Err(AllocatorError::NoAvailableWorkers),
                }
            }
        };
        permit.forget();

        let worker = slot.take().ok_or(AllocatorError::NoAvailableWorkers)?;
        Ok((worker, PartitionCookie(Some(index))))
    }

    fn release(&self, cookie: PartitionCookie, worker: Arc<Worker>) {
        match cookie.0.and_then(|index| self.slots.get(index)) {
            Some(slot) => slot.put(worker),
            None => tracing::warn!(worker = worker.index(), "release without a partition slot"),
        }
    }

    async fn stop(&self) {
        for slot in &self.slots {
            if let Ok(permit) = slot.permit.acquire().await {
                permit.forget();
                slot.permit.close();
                if let Some(worker) = slot.take() {
                    self.allocator.release(worker);
                }
            }
        }
        tracing::debug!(workers = self.slots.len(), "released partition workers");
    }
}
