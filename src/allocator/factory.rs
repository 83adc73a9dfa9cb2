//! # Allocator factory with named reuse.
//!
//! Triggers that set [`TriggerConfig::worker_allocator_name`] share one
//! allocator: the first trigger creates it, later ones get the same instance.
//! The named store is an explicit object handed to whoever builds triggers;
//! there is no process-wide registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{Allocator, FixedPool, Singleton};
use crate::error::{AllocatorError, RuntimeError};
use crate::trigger::TriggerConfig;
use crate::worker::Runtime;

/// Creates allocators and keeps the named ones for reuse.
#[derive(Default)]
pub struct AllocatorFactory {
    named: Mutex<HashMap<String, Arc<dyn Allocator>>>,
}

impl AllocatorFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a single-worker allocator.
    pub fn singleton(&self, runtime: Arc<dyn Runtime>) -> Arc<dyn Allocator> {
        Arc::new(Singleton::with_runtime(runtime))
    }

    /// Creates a pool of `size` workers.
    pub fn fixed_pool<F>(
        &self,
        size: usize,
        new_runtime: F,
    ) -> Result<Arc<dyn Allocator>, AllocatorError>
    where
        F: FnMut(usize) -> Result<Arc<dyn Runtime>, RuntimeError>,
    {
        Ok(Arc::new(FixedPool::with_runtimes(size, new_runtime)?))
    }

    /// Returns the allocator stored under `name`, creating it with `create` if absent.
    ///
    /// An empty name is never stored. `create` runs under the store's lock, so
    /// concurrent callers for the same name get one instance.
    pub fn load_or_create<F>(
        &self,
        name: &str,
        create: F,
    ) -> Result<Arc<dyn Allocator>, AllocatorError>
    where
        F: FnOnce() -> Result<Arc<dyn Allocator>, AllocatorError>,
    {
        if name.is_empty() {
            return create();
        }

        let mut named = self.named.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = named.get(name) {
            tracing::debug!(allocator = name, "reusing named allocator");
            return Ok(Arc::clone(existing));
        }

        let allocator = create()?;
        named.insert(name.to_string(), Arc::clone(&allocator));
        tracing::debug!(allocator = name, workers = allocator.workers().len(), "created named allocator");
        Ok(allocator)
    }

    /// The allocator stored under `name`, if any.
    pub fn named(&self, name: &str) -> Option<Arc<dyn Allocator>> {
        let named = self.named.lock().unwrap_or_else(|p| p.into_inner());
        named.get(name).cloned()
    }

    /// Builds (or reuses) the allocator a trigger is configured for.
    ///
    /// `max_workers = 0` gives a [`Singleton`], anything else a [`FixedPool`].
    pub fn for_trigger<F>(
        &self,
        config: &TriggerConfig,
        mut new_runtime: F,
    ) -> Result<Arc<dyn Allocator>, AllocatorError>
    where
        F: FnMut(usize) -> Result<Arc<dyn Runtime>, RuntimeError>,
    {
        let name = config.worker_allocator_name.as_deref().unwrap_or("");
        self.load_or_create(name, || match config.max_workers {
            0 => new_runtime(0)
                .map(|rt| self.singleton(rt))
                .map_err(|e| AllocatorError::RuntimeCreation {
                    index: 0,
                    error: e.as_message(),
                }),
            n => self.fixed_pool(n, new_runtime),
        })
    }
}
