//! Frame pipelining.
//!
//! [`FrameScheduler`] rotates through N frame slots so the CPU records frame
//! `k + 1` while the GPU still executes frame `k`. Each slot owns a fence, an
//! image-available semaphore, a compute-done semaphore, and one command buffer
//! per queue. Surface changes are published through a staged
//! [`ResizeRegistry`].

mod record;
mod resize;
mod scheduler;
mod slots;

pub use record::{FrameAcquire, RecordState, SkipReason, SwapchainState};
pub use resize::{ResizeRegistry, ResizeStage, ResizeToken};
pub use scheduler::FrameScheduler;
pub use slots::FrameSlots;
