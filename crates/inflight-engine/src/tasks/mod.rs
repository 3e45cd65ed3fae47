//! Deferred task queue.
//!
//! Cleanup that must wait until the GPU is provably done with an object is
//! wrapped in a [`DeferredTask`] and drained by the frame scheduler at the top
//! of every command buffer begin. Any thread may enqueue through a
//! [`TaskSender`]; only the render thread executes.

mod queue;
mod task;

pub use queue::{DeferredTaskQueue, TaskSender};
pub use task::{DeferredTask, TaskContext, TaskControl};
