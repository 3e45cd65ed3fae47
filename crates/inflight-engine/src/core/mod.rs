//! Core engine-facing contracts.
//!
//! This module defines the interface between the runtime (platform loop)
//! and applications, and the per-frame context that drives the scheduler.

mod app;
mod ctx;

pub use app::{App, AppControl};
pub use ctx::{FrameCtx, RenderTarget, WindowCtx};
