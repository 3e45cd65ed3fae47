use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::ThreadId;

use crossbeam::queue::SegQueue;

use crate::device::{CommandBufferId, CommandPoolId, GpuBackend, GpuCtx, QueueType};

/// A command pool owned by one recording thread.
///
/// Buffers handed back by released groups land on a lock-free free list and
/// are reused by the owner. The pool tracks how many of its buffers are still
/// held by groups; a retired pool is destroyed once that count is zero.
pub struct CommandPool {
    id: CommandPoolId,
    queue: QueueType,
    owner: ThreadId,
    free: SegQueue<CommandBufferId>,
    outstanding: AtomicUsize,
    retired: AtomicBool,
    destroyed: AtomicBool,
}

impl CommandPool {
    pub(crate) fn new(id: CommandPoolId, queue: QueueType, owner: ThreadId) -> Self {
        Self {
            id,
            queue,
            owner,
            free: SegQueue::new(),
            outstanding: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> CommandPoolId {
        self.id
    }

    #[inline]
    pub fn queue(&self) -> QueueType {
        self.queue
    }

    /// Thread allowed to allocate from and record on this pool.
    #[inline]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Buffers currently held by live or not-yet-released groups.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Buffers waiting on the free list for reuse.
    #[inline]
    pub fn recycled(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Hands out `count` buffers, recycled ones first.
    pub(crate) fn take(&self, backend: &dyn GpuBackend, count: usize) -> Vec<CommandBufferId> {
        assert_eq!(
            std::thread::current().id(),
            self.owner,
            "command pool {:?} used from a thread that does not own it",
            self.id
        );
        assert!(!self.is_destroyed(), "allocating from destroyed pool {:?}", self.id);

        let mut buffers = Vec::with_capacity(count);
        while buffers.len() < count {
            match self.free.pop() {
                Some(cmd) => buffers.push(cmd),
                None => break,
            }
        }
        let fresh = count - buffers.len();
        if fresh > 0 {
            buffers.extend(backend.allocate_command_buffers(self.id, fresh));
        }

        self.outstanding.fetch_add(count, Ordering::SeqCst);
        buffers
    }

    /// Returns buffers to the free list; destroys the pool if it was retired
    /// and these were the last outstanding buffers.
    pub(crate) fn give_back(&self, backend: &dyn GpuBackend, buffers: Vec<CommandBufferId>) {
        let count = buffers.len();
        for cmd in buffers {
            self.free.push(cmd);
        }
        let before = self.outstanding.fetch_sub(count, Ordering::SeqCst);
        debug_assert!(before >= count);
        if before == count && self.retired.load(Ordering::SeqCst) {
            self.destroy(backend);
        }
    }

    /// Marks the pool as no longer wanted by its owner.
    pub(crate) fn retire(&self, backend: &dyn GpuBackend) {
        self.retired.store(true, Ordering::SeqCst);
        if self.outstanding() == 0 {
            self.destroy(backend);
        }
    }

    pub(crate) fn destroy(&self, backend: &dyn GpuBackend) {
        if !self.destroyed.swap(true, Ordering::SeqCst) {
            log::debug!("destroying command pool {:?} ({:?})", self.id, self.queue);
            backend.destroy_command_pool(self.id);
        }
    }
}

impl std::fmt::Debug for CommandPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandPool")
            .field("id", &self.id)
            .field("queue", &self.queue)
            .field("owner", &self.owner)
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

/// Command buffers allocated together from one pool.
///
/// Dropping the group does not free anything immediately: the buffers go back
/// to their pool `N + 1` drains later, when no in-flight frame can still be
/// executing them.
pub struct CommandBufferGroup {
    ctx: GpuCtx,
    pool: Arc<CommandPool>,
    buffers: Vec<CommandBufferId>,
}

impl CommandBufferGroup {
    pub(crate) fn new(ctx: GpuCtx, pool: Arc<CommandPool>, buffers: Vec<CommandBufferId>) -> Self {
        Self { ctx, pool, buffers }
    }

    #[inline]
    pub fn buffers(&self) -> &[CommandBufferId] {
        &self.buffers
    }

    #[inline]
    pub fn get(&self, index: usize) -> CommandBufferId {
        self.buffers[index]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    #[inline]
    pub fn pool(&self) -> &Arc<CommandPool> {
        &self.pool
    }
}

impl Drop for CommandBufferGroup {
    fn drop(&mut self) {
        if self.buffers.is_empty() {
            return;
        }
        let buffers = std::mem::take(&mut self.buffers);
        let pool = self.pool.clone();
        self.ctx
            .defer_release(move |ctx| pool.give_back(ctx.backend(), buffers));
    }
}
