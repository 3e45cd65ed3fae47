//! GPU device abstraction.
//!
//! This module is responsible for:
//! - the [`GpuBackend`] / [`Swapchain`] seam the frame layer is written against
//! - the wgpu implementation bound to a window surface ([`Gpu`])
//! - a CPU-only implementation for tests and tools ([`HeadlessGpu`])
//! - the shared [`GpuCtx`] handed to resource owners

mod backend;
mod context;
mod error;
mod gpu;
mod headless;
mod init;
mod surface;
mod types;

pub use backend::{GpuBackend, Swapchain};
pub use context::GpuCtx;
pub use error::FrameError;
pub use gpu::Gpu;
pub use headless::{HeadlessEvent, HeadlessGpu};
pub use init::GpuInit;
pub use types::{
    AcquireOutcome, BufferId, CommandBufferId, CommandPoolId, Extent, FenceId, MemoryKind,
    PresentOutcome, QueueType, SemaphoreId, Submission,
};
