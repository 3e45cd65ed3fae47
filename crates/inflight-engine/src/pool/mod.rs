//! Per-thread command pool registry.

mod pool;
mod registry;

pub use pool::{CommandBufferGroup, CommandPool};
pub use registry::CommandPoolRegistry;
