use crate::device::{CommandBufferId, FenceId, GpuBackend, GpuCtx, QueueType, SemaphoreId};
use crate::pool::CommandBufferGroup;

/// Per-slot synchronization primitives and command buffers.
pub struct FrameSlots {
    fences: Vec<FenceId>,
    image_available: Vec<SemaphoreId>,
    compute_done: Vec<SemaphoreId>,
    // Fence was reset by an acquire and no submission has been issued
    // against it since; waiting on it would never return.
    fence_unsubmitted: Vec<bool>,
    graphics: Option<CommandBufferGroup>,
    compute: Option<CommandBufferGroup>,
}

impl FrameSlots {
    pub(crate) fn new(ctx: &GpuCtx) -> Self {
        let n = ctx.frames_in_flight();
        let backend = ctx.backend();

        // Signaled so the first acquire of each slot does not block.
        let fences = (0..n).map(|_| backend.create_fence(true)).collect();
        let image_available = (0..n).map(|_| backend.create_semaphore()).collect();
        let compute_done = (0..n).map(|_| backend.create_semaphore()).collect();

        Self {
            fences,
            image_available,
            compute_done,
            fence_unsubmitted: vec![false; n],
            graphics: Some(ctx.allocate_command_buffers(QueueType::Graphics, n)),
            compute: Some(ctx.allocate_command_buffers(QueueType::Compute, n)),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    #[inline]
    pub fn fence(&self, slot: usize) -> FenceId {
        self.fences[slot]
    }

    #[inline]
    pub fn image_available(&self, slot: usize) -> SemaphoreId {
        self.image_available[slot]
    }

    #[inline]
    pub fn compute_done(&self, slot: usize) -> SemaphoreId {
        self.compute_done[slot]
    }

    pub fn command_buffer(&self, slot: usize, queue: QueueType) -> CommandBufferId {
        let group = match queue {
            QueueType::Graphics => &self.graphics,
            QueueType::Compute => &self.compute,
        };
        match group {
            Some(group) => group.get(slot),
            None => panic!("frame slots already torn down"),
        }
    }

    #[inline]
    pub(crate) fn fence_unsubmitted(&self, slot: usize) -> bool {
        self.fence_unsubmitted[slot]
    }

    #[inline]
    pub(crate) fn set_fence_unsubmitted(&mut self, slot: usize, value: bool) {
        self.fence_unsubmitted[slot] = value;
    }

    /// Hands the per-slot command buffers back to their pools.
    pub(crate) fn release_command_buffers(&mut self) {
        self.graphics = None;
        self.compute = None;
    }

    /// Destroys fences and semaphores. The device must be idle.
    pub(crate) fn destroy_sync(&mut self, backend: &dyn GpuBackend) {
        for fence in self.fences.drain(..) {
            backend.destroy_fence(fence);
        }
        for semaphore in self.image_available.drain(..).chain(self.compute_done.drain(..)) {
            backend.destroy_semaphore(semaphore);
        }
        self.fence_unsubmitted.clear();
    }
}
