use super::types::{
    AcquireOutcome, BufferId, CommandBufferId, CommandPoolId, Extent, FenceId, MemoryKind,
    PresentOutcome, QueueType, SemaphoreId, Submission,
};

/// Device operations the frame pipelining layer is built on.
///
/// Every object is referred to by an opaque id issued by the backend. Methods
/// take `&self`; implementations synchronize internally so the backend can be
/// shared across recording threads. Object-level external synchronization
/// (one thread per pool, one recorder per command buffer) is the caller's job.
pub trait GpuBackend: Send + Sync {
    // Fences

    fn create_fence(&self, signaled: bool) -> FenceId;

    /// Blocks until the fence is signaled.
    fn wait_for_fence(&self, fence: FenceId);

    fn reset_fence(&self, fence: FenceId);

    fn is_fence_signaled(&self, fence: FenceId) -> bool;

    fn destroy_fence(&self, fence: FenceId);

    // Semaphores

    fn create_semaphore(&self) -> SemaphoreId;

    fn destroy_semaphore(&self, semaphore: SemaphoreId);

    // Command pools and buffers

    fn create_command_pool(&self, queue: QueueType) -> CommandPoolId;

    /// Destroys the pool and every command buffer still allocated from it.
    fn destroy_command_pool(&self, pool: CommandPoolId);

    fn allocate_command_buffers(&self, pool: CommandPoolId, count: usize) -> Vec<CommandBufferId>;

    /// Starts recording. Any previous contents are discarded.
    fn begin_command_buffer(&self, command_buffer: CommandBufferId);

    fn end_command_buffer(&self, command_buffer: CommandBufferId);

    // Queues

    fn submit(&self, queue: QueueType, submission: &Submission);

    /// Blocks until every submitted piece of work has completed.
    fn wait_idle(&self);

    // Buffers

    fn create_buffer(&self, size: u64, memory: MemoryKind) -> BufferId;

    fn destroy_buffer(&self, buffer: BufferId);

    /// Writes host data into a host-visible buffer.
    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]);

    /// Records a buffer-to-buffer copy into a recording command buffer.
    fn copy_buffer(&self, command_buffer: CommandBufferId, src: BufferId, dst: BufferId, size: u64);
}

/// Presentation engine bound to one surface.
pub trait Swapchain {
    /// Requests the next presentable image, signaling `image_available` when
    /// the image can be rendered to.
    fn acquire_next_image(&self, image_available: SemaphoreId) -> AcquireOutcome;

    fn present(&self, image_index: u32) -> PresentOutcome;

    /// Size the surface currently reports.
    fn current_extent(&self) -> Extent;

    /// Number of presentable images.
    fn image_count(&self) -> u32;
}
