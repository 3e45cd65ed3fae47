use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw backend id.
            #[inline]
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

handle!(
    /// CPU-observable GPU completion signal.
    FenceId
);
handle!(
    /// GPU-side ordering primitive between submissions.
    SemaphoreId
);
handle!(
    /// Command buffer allocator owned by exactly one recording thread.
    CommandPoolId
);
handle!(CommandBufferId);
handle!(BufferId);

/// Queue a command buffer is recorded for and submitted to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QueueType {
    Graphics,
    Compute,
}

/// Memory placement of a GPU buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MemoryKind {
    /// CPU-writable memory, visible to the device.
    HostVisible,
    /// Device-only memory, filled through copies.
    DeviceLocal,
}

/// Surface size in physical pixels.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true when either dimension is zero (minimized window).
    #[inline]
    pub const fn is_degenerate(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One queue submission.
///
/// Waits are satisfied before any command buffer executes; signals and the
/// fence fire once every command buffer has completed.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Submission {
    pub command_buffers: Vec<CommandBufferId>,
    pub wait_semaphores: Vec<SemaphoreId>,
    pub signal_semaphores: Vec<SemaphoreId>,
    pub fence: Option<FenceId>,
}

/// Result of asking the presentation engine for the next image.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AcquireOutcome {
    /// An image is available; the semaphore passed in will be signaled.
    Acquired { image_index: u32 },
    /// The image was acquired but the surface no longer matches exactly.
    Suboptimal,
    /// The surface changed and must be refreshed before acquiring again.
    OutOfDate,
    /// No image became available in time.
    Timeout,
    /// The device is gone.
    DeviceLost,
}

/// Result of queueing an image for presentation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
    DeviceLost,
    Failed(String),
}
