use crate::device::{CommandBufferId, QueueType};

/// Recording state of one acquired frame.
///
/// Returned by a successful acquire and threaded through begin/end/submit
/// and present. A handle is only valid until the next acquire on the same
/// scheduler; using it afterwards is a programming error.
#[derive(Debug)]
pub struct RecordState {
    serial: u64,
    frame_index: usize,
    image_index: u32,
    open: Option<(QueueType, CommandBufferId)>,
    history: Vec<QueueType>,
}

impl RecordState {
    pub(crate) fn new(serial: u64, frame_index: usize, image_index: u32) -> Self {
        Self {
            serial,
            frame_index,
            image_index,
            open: None,
            history: Vec::with_capacity(2),
        }
    }

    #[inline]
    pub(crate) fn serial(&self) -> u64 {
        self.serial
    }

    /// Frame slot in `[0, N)` whose objects this frame uses.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Index of the acquired presentable image.
    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// The command buffer currently recording, if any.
    #[inline]
    pub fn open_command_buffer(&self) -> Option<(QueueType, CommandBufferId)> {
        self.open
    }

    /// Queues whose command buffers were ended this frame, in order.
    #[inline]
    pub fn history(&self) -> &[QueueType] {
        &self.history
    }

    #[inline]
    pub fn has_recorded(&self, queue: QueueType) -> bool {
        self.history.contains(&queue)
    }

    pub(crate) fn open(&mut self, queue: QueueType, command_buffer: CommandBufferId) {
        assert!(
            self.open.is_none(),
            "a command buffer is already recording for frame slot {}",
            self.frame_index
        );
        assert!(
            !self.has_recorded(queue),
            "{queue:?} command buffer already recorded for frame slot {}",
            self.frame_index
        );
        self.open = Some((queue, command_buffer));
    }

    pub(crate) fn close(&mut self) -> (QueueType, CommandBufferId) {
        let Some((queue, command_buffer)) = self.open.take() else {
            panic!("no command buffer is recording for frame slot {}", self.frame_index);
        };
        self.history.push(queue);
        (queue, command_buffer)
    }
}

/// Why an acquire produced no frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SkipReason {
    /// The window is minimized or otherwise invisible.
    Hidden,
    /// The swapchain is waiting for a surface refresh.
    Resized,
    /// The surface reported out-of-date or suboptimal; a refresh was requested.
    SurfaceOutOfDate,
    /// No image became available in time.
    Timeout,
}

/// Outcome of [`FrameScheduler::acquire_frame`](super::FrameScheduler::acquire_frame).
#[derive(Debug)]
pub enum FrameAcquire {
    Ready(RecordState),
    Skipped(SkipReason),
}

impl FrameAcquire {
    /// Returns the frame, if one was acquired.
    pub fn ready(self) -> Option<RecordState> {
        match self {
            FrameAcquire::Ready(record) => Some(record),
            FrameAcquire::Skipped(_) => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, FrameAcquire::Ready(_))
    }
}

/// Presentation state of the swapchain as seen by the scheduler.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SwapchainState {
    Valid,
    Resized,
    Minimized,
}
