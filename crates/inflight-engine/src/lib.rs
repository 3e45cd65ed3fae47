//! Inflight engine crate.
//!
//! Frame pipelining and GPU resource lifetime management: a frame scheduler
//! that keeps N frames in flight, per-thread command pools, a deferred task
//! queue for releasing objects once no frame can reference them, and buffers
//! replicated per frame slot. A winit/wgpu runtime drives it for windowed
//! applications.

pub mod device;
pub mod frame;
pub mod pool;
pub mod tasks;
pub mod buffer;

pub mod core;
pub mod window;
pub mod logging;
