//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and windows, and wires each window to a wgpu
//! device and a frame scheduler.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
