use crate::device::{BufferId, GpuCtx, MemoryKind};

/// N physically distinct buffers holding the same logical data.
///
/// Dropping the group defers destruction until no in-flight frame can still
/// read any of the buffers.
pub struct BufferGroup {
    ctx: GpuCtx,
    buffers: Vec<BufferId>,
    size: u64,
    memory: MemoryKind,
}

impl BufferGroup {
    pub fn new(ctx: &GpuCtx, count: usize, size: u64, memory: MemoryKind) -> Self {
        assert!(count > 0, "buffer group needs at least one buffer");
        let buffers = (0..count)
            .map(|_| ctx.backend().create_buffer(size, memory))
            .collect();
        Self {
            ctx: ctx.clone(),
            buffers,
            size,
            memory,
        }
    }

    /// One buffer per frame slot.
    pub fn per_frame(ctx: &GpuCtx, size: u64, memory: MemoryKind) -> Self {
        Self::new(ctx, ctx.frames_in_flight(), size, memory)
    }

    #[inline]
    pub fn ctx(&self) -> &GpuCtx {
        &self.ctx
    }

    #[inline]
    pub fn buffers(&self) -> &[BufferId] {
        &self.buffers
    }

    /// Replica used by `frame_index`.
    #[inline]
    pub fn buffer(&self, frame_index: usize) -> BufferId {
        self.buffers[frame_index % self.buffers.len()]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Size of each buffer in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn memory(&self) -> MemoryKind {
        self.memory
    }
}

impl Drop for BufferGroup {
    fn drop(&mut self) {
        let buffers = std::mem::take(&mut self.buffers);
        self.ctx.defer_release(move |ctx| {
            for buffer in buffers {
                ctx.backend().destroy_buffer(buffer);
            }
        });
    }
}

impl std::fmt::Debug for BufferGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferGroup")
            .field("buffers", &self.buffers)
            .field("size", &self.size)
            .field("memory", &self.memory)
            .finish()
    }
}
