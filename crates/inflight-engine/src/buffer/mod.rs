//! Replicated resource tracking.
//!
//! A [`BufferGroup`] owns one GPU buffer per frame slot. Trackers keep a CPU
//! scratch copy and a dirty counter, and push the latest data into the replica
//! of whichever slot is being recorded, so a replica is never written while a
//! frame in flight may still read it.

mod group;
mod tracker;

pub use group::BufferGroup;
pub use tracker::{BufferTracker, HostVisibleBufferTracker, LocalBufferTracker};
