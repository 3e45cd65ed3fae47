use std::sync::Arc;

use crate::frame::ResizeRegistry;
use crate::pool::{CommandBufferGroup, CommandPool, CommandPoolRegistry};
use crate::tasks::{DeferredTask, TaskContext, TaskSender};

use super::{GpuBackend, QueueType};

/// Shared handle to the device-side services of one frame scheduler.
///
/// Collaborators (resource owners, worker threads) hold a clone instead of
/// reaching for a global. Cloning is cheap.
#[derive(Clone)]
pub struct GpuCtx {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn GpuBackend>,
    frames_in_flight: usize,
    tasks: TaskSender,
    pools: CommandPoolRegistry,
    resize: ResizeRegistry,
}

impl GpuCtx {
    pub(crate) fn new(
        backend: Arc<dyn GpuBackend>,
        frames_in_flight: usize,
        tasks: TaskSender,
    ) -> Self {
        assert!(frames_in_flight > 0, "frames in flight must be at least 1");
        Self {
            inner: Arc::new(Inner {
                backend,
                frames_in_flight,
                tasks,
                pools: CommandPoolRegistry::new(),
                resize: ResizeRegistry::new(),
            }),
        }
    }

    #[inline]
    pub fn backend(&self) -> &dyn GpuBackend {
        &*self.inner.backend
    }

    /// Returns an owned handle to the backend.
    #[inline]
    pub fn backend_arc(&self) -> Arc<dyn GpuBackend> {
        self.inner.backend.clone()
    }

    /// Number of frames whose GPU work may be outstanding at once (N).
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.inner.frames_in_flight
    }

    /// Drain visits after which no in-flight frame can reference an object
    /// released now (N + 1).
    #[inline]
    pub fn release_delay(&self) -> u32 {
        self.inner.frames_in_flight as u32 + 1
    }

    #[inline]
    pub fn command_pools(&self) -> &CommandPoolRegistry {
        &self.inner.pools
    }

    #[inline]
    pub fn resize_registry(&self) -> &ResizeRegistry {
        &self.inner.resize
    }

    /// Returns a producer handle for the deferred task queue.
    #[inline]
    pub fn task_sender(&self) -> TaskSender {
        self.inner.tasks.clone()
    }

    /// Calling thread's command pool for `queue`.
    pub fn command_pool(&self, queue: QueueType) -> Arc<CommandPool> {
        self.inner.pools.pool(self.backend(), queue)
    }

    /// Allocates `count` command buffers from the calling thread's pool.
    pub fn allocate_command_buffers(&self, queue: QueueType, count: usize) -> CommandBufferGroup {
        let pool = self.command_pool(queue);
        let buffers = pool.take(self.backend(), count);
        CommandBufferGroup::new(self.clone(), pool, buffers)
    }

    /// Enqueues a deferred task. Callable from any thread.
    ///
    /// If the scheduler is already gone the device has been drained, so the
    /// task runs immediately with a detached context.
    pub fn defer(&self, task: DeferredTask) {
        if let Err(err) = self.inner.tasks.send(task) {
            log::debug!("deferred task queue closed; running task immediately");
            let mut ctx = TaskContext::detached(self.backend());
            err.into_inner().force(&mut ctx);
        }
    }

    /// Runs `f` once no in-flight frame can still reference what it releases.
    pub fn defer_release<F>(&self, f: F)
    where
        F: FnOnce(&mut TaskContext<'_>) + Send + 'static,
    {
        self.defer(DeferredTask::after(self.release_delay(), f));
    }
}

impl std::fmt::Debug for GpuCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuCtx")
            .field("frames_in_flight", &self.inner.frames_in_flight)
            .finish_non_exhaustive()
    }
}
