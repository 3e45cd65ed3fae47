use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::device::{GpuBackend, QueueType};

use super::pool::CommandPool;

/// Lazily created command pools, one per `(thread, queue)`.
///
/// Recording pools are not safe for concurrent use, so every thread that
/// records gets its own. The map is only locked on lookup/insert; releasing
/// buffers back into a pool never touches it.
pub struct CommandPoolRegistry {
    pools: Mutex<HashMap<(ThreadId, QueueType), Arc<CommandPool>>>,
}

impl CommandPoolRegistry {
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Calling thread's pool for `queue`, created on first use.
    pub fn pool(&self, backend: &dyn GpuBackend, queue: QueueType) -> Arc<CommandPool> {
        let thread = thread::current().id();
        let mut pools = self.pools.lock();
        pools
            .entry((thread, queue))
            .or_insert_with(|| {
                let id = backend.create_command_pool(queue);
                log::debug!("created command pool {id:?} ({queue:?}) for thread {thread:?}");
                Arc::new(CommandPool::new(id, queue, thread))
            })
            .clone()
    }

    /// Number of live pools across all threads.
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retires every pool of the calling thread.
    ///
    /// Call from a worker before it exits. Pools with no outstanding buffers
    /// are destroyed now; the rest are destroyed by the release that returns
    /// their last buffer. Returns the number of pools retired.
    pub fn release_current_thread(&self, backend: &dyn GpuBackend) -> usize {
        let thread = thread::current().id();
        let retired: Vec<_> = {
            let mut pools = self.pools.lock();
            let keys: Vec<_> = pools.keys().filter(|(t, _)| *t == thread).copied().collect();
            keys.into_iter().filter_map(|k| pools.remove(&k)).collect()
        };
        for pool in &retired {
            pool.retire(backend);
        }
        retired.len()
    }

    /// Destroys every pool regardless of owner. Only valid once the device is idle.
    pub(crate) fn destroy_all(&self, backend: &dyn GpuBackend) {
        let pools: Vec<_> = self.pools.lock().drain().map(|(_, p)| p).collect();
        for pool in pools {
            if pool.outstanding() > 0 {
                log::warn!(
                    "destroying command pool {:?} with {} buffer(s) still held",
                    pool.id(),
                    pool.outstanding()
                );
            }
            pool.destroy(backend);
        }
    }
}

impl Default for CommandPoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
