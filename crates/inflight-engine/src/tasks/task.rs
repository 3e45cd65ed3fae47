use crate::device::{CommandBufferId, GpuBackend, QueueType};

/// Continuation returned by a deferred task invocation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TaskControl {
    /// Visit the task again at the next drain.
    Keep,
    /// Drop the task.
    Done,
}

/// State handed to a task when it runs.
///
/// During a frame the context carries the command buffer that was just
/// opened, so tasks may record into it. During teardown (`flush`) or after the
/// owning scheduler is gone the context is detached: no frame, no command
/// buffer, and the device is idle.
pub struct TaskContext<'a> {
    backend: &'a dyn GpuBackend,
    frame_serial: Option<u64>,
    frame_index: Option<usize>,
    image_index: Option<u32>,
    command_buffer: Option<(QueueType, CommandBufferId)>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn in_frame(
        backend: &'a dyn GpuBackend,
        frame_serial: u64,
        frame_index: usize,
        image_index: u32,
        command_buffer: (QueueType, CommandBufferId),
    ) -> Self {
        Self {
            backend,
            frame_serial: Some(frame_serial),
            frame_index: Some(frame_index),
            image_index: Some(image_index),
            command_buffer: Some(command_buffer),
        }
    }

    pub(crate) fn detached(backend: &'a dyn GpuBackend) -> Self {
        Self {
            backend,
            frame_serial: None,
            frame_index: None,
            image_index: None,
            command_buffer: None,
        }
    }

    #[inline]
    pub fn backend(&self) -> &'a dyn GpuBackend {
        self.backend
    }

    /// Serial of the acquired frame being recorded, if any. Every begin of
    /// the same frame shares it.
    #[inline]
    pub fn frame_serial(&self) -> Option<u64> {
        self.frame_serial
    }

    /// Frame slot being recorded, if any.
    #[inline]
    pub fn frame_index(&self) -> Option<usize> {
        self.frame_index
    }

    #[inline]
    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    /// The open command buffer and its queue, if any.
    #[inline]
    pub fn command_buffer(&self) -> Option<(QueueType, CommandBufferId)> {
        self.command_buffer
    }

    /// True outside of frame recording (device is idle).
    #[inline]
    pub fn is_detached(&self) -> bool {
        self.command_buffer.is_none()
    }
}

type TaskFn = Box<dyn FnMut(&mut TaskContext<'_>) -> TaskControl + Send + 'static>;

/// A countdown-guarded closure run from the render thread.
///
/// `remaining` drops by one per frame, on the first visit of that frame; a
/// frame that begins both a compute and a graphics buffer still counts once.
/// Once it has reached zero the closure is invoked on that visit and on every
/// later visit until it returns [`TaskControl::Done`].
pub struct DeferredTask {
    remaining: u32,
    run: TaskFn,
}

impl DeferredTask {
    /// Creates a task whose closure first runs on the `delay`-th frame.
    ///
    /// A delay of 0 or 1 runs on the first visit.
    pub fn new<F>(delay: u32, run: F) -> Self
    where
        F: FnMut(&mut TaskContext<'_>) -> TaskControl + Send + 'static,
    {
        Self {
            remaining: delay,
            run: Box::new(run),
        }
    }

    /// Runs `f` exactly once, on the `delay`-th frame.
    ///
    /// Destruction of GPU objects referenced by in-flight frames uses
    /// `delay = frames_in_flight + 1`.
    pub fn after<F>(delay: u32, f: F) -> Self
    where
        F: FnOnce(&mut TaskContext<'_>) + Send + 'static,
    {
        let mut f = Some(f);
        Self::new(delay, move |ctx| {
            if let Some(f) = f.take() {
                f(ctx);
            }
            TaskControl::Done
        })
    }

    /// Runs `f` on every visit until it returns [`TaskControl::Done`].
    pub fn every_frame<F>(f: F) -> Self
    where
        F: FnMut(&mut TaskContext<'_>) -> TaskControl + Send + 'static,
    {
        Self::new(0, f)
    }

    /// Frames left before the closure first runs.
    #[inline]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// One drain visit. `tick` is set on the first drain of a frame.
    pub(crate) fn visit(&mut self, ctx: &mut TaskContext<'_>, tick: bool) -> TaskControl {
        if tick {
            self.remaining = self.remaining.saturating_sub(1);
        }
        if self.remaining > 0 {
            return TaskControl::Keep;
        }
        (self.run)(ctx)
    }

    /// Invokes the closure regardless of the countdown.
    pub(crate) fn force(mut self, ctx: &mut TaskContext<'_>) -> TaskControl {
        self.remaining = 0;
        (self.run)(ctx)
    }
}

impl std::fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredTask")
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}
