use std::sync::Arc;

use crate::device::{CommandBufferId, MemoryKind};
use crate::frame::RecordState;

use super::group::BufferGroup;

/// CPU-side data replicated into one GPU buffer per frame slot.
///
/// A write marks every replica dirty; each `update` brings the current
/// frame's replica up to date. After a write followed by one update on each
/// of the N slots, every replica holds the written data.
pub trait BufferTracker {
    /// Copies `data` into the scratch copy. Panics if it exceeds capacity.
    fn set_data(&mut self, data: &[u8]);

    fn data(&self) -> &[u8];

    /// Writable scratch copy. Every replica is conservatively marked dirty.
    fn data_mut(&mut self) -> &mut [u8];

    /// Synchronizes the replica of the frame being recorded, if any are dirty.
    fn update(&mut self, record: &RecordState);

    /// Replicas not yet synchronized with the scratch copy.
    fn dirty_counter(&self) -> usize;
}

/// Replicas live in host-visible memory and are written by the CPU directly.
pub struct HostVisibleBufferTracker {
    group: Arc<BufferGroup>,
    scratch: Vec<u8>,
    dirty: usize,
}

impl HostVisibleBufferTracker {
    pub fn new(group: Arc<BufferGroup>) -> Self {
        assert_eq!(
            group.memory(),
            MemoryKind::HostVisible,
            "host-visible tracker needs host-visible buffers"
        );
        assert_eq!(
            group.len(),
            group.ctx().frames_in_flight(),
            "tracked buffer group needs one replica per frame slot"
        );
        let scratch = vec![0; group.size() as usize];
        Self {
            group,
            scratch,
            dirty: 0,
        }
    }

    /// Creates the tracker and writes `data` into every replica right away.
    pub fn with_data(group: Arc<BufferGroup>, data: &[u8]) -> Self {
        let mut tracker = Self::new(group);
        assert!(data.len() <= tracker.scratch.len(), "initial data exceeds buffer size");
        tracker.scratch[..data.len()].copy_from_slice(data);
        let backend = tracker.group.ctx().backend();
        for &buffer in tracker.group.buffers() {
            backend.write_buffer(buffer, 0, &tracker.scratch);
        }
        tracker
    }

    #[inline]
    pub fn buffer_group(&self) -> &Arc<BufferGroup> {
        &self.group
    }

    /// Synchronizes the replica of `frame_index`.
    pub fn update_slot(&mut self, frame_index: usize) {
        if self.dirty == 0 {
            return;
        }
        let buffer = self.group.buffer(frame_index);
        self.group.ctx().backend().write_buffer(buffer, 0, &self.scratch);
        self.dirty -= 1;
    }
}

impl BufferTracker for HostVisibleBufferTracker {
    fn set_data(&mut self, data: &[u8]) {
        assert!(
            data.len() <= self.scratch.len(),
            "write of {} bytes exceeds tracker capacity {}",
            data.len(),
            self.scratch.len()
        );
        self.scratch[..data.len()].copy_from_slice(data);
        self.dirty = self.group.len();
    }

    fn data(&self) -> &[u8] {
        &self.scratch
    }

    fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = self.group.len();
        &mut self.scratch
    }

    fn update(&mut self, record: &RecordState) {
        self.update_slot(record.frame_index());
    }

    fn dirty_counter(&self) -> usize {
        self.dirty
    }
}

/// Replicas live in device-local memory, fed through per-slot host-visible
/// staging buffers and a copy recorded into the frame's command buffer.
pub struct LocalBufferTracker {
    local: Arc<BufferGroup>,
    staging: Arc<BufferGroup>,
    scratch: Vec<u8>,
    dirty: usize,
}

impl LocalBufferTracker {
    pub fn new(local: Arc<BufferGroup>, staging: Arc<BufferGroup>) -> Self {
        assert_eq!(local.memory(), MemoryKind::DeviceLocal, "local replicas must be device-local");
        assert_eq!(staging.memory(), MemoryKind::HostVisible, "staging replicas must be host-visible");
        assert!(staging.size() >= local.size(), "staging buffers smaller than local buffers");
        assert_eq!(
            local.len(),
            local.ctx().frames_in_flight(),
            "tracked buffer group needs one replica per frame slot"
        );
        assert_eq!(staging.len(), local.len(), "staging and local replica counts differ");
        let scratch = vec![0; local.size() as usize];
        Self {
            local,
            staging,
            scratch,
            dirty: 0,
        }
    }

    /// Creates the tracker with `data` pending for every replica.
    pub fn with_data(local: Arc<BufferGroup>, staging: Arc<BufferGroup>, data: &[u8]) -> Self {
        let mut tracker = Self::new(local, staging);
        tracker.set_data(data);
        tracker
    }

    #[inline]
    pub fn local_buffers(&self) -> &Arc<BufferGroup> {
        &self.local
    }

    #[inline]
    pub fn staging_buffers(&self) -> &Arc<BufferGroup> {
        &self.staging
    }

    /// Writes the slot's staging buffer and records the staging → local copy
    /// into `command_buffer`, which must be recording.
    pub fn update_slot(&mut self, frame_index: usize, command_buffer: CommandBufferId) {
        if self.dirty == 0 {
            return;
        }
        let staging = self.staging.buffer(frame_index);
        let local = self.local.buffer(frame_index);
        let backend = self.local.ctx().backend();
        backend.write_buffer(staging, 0, &self.scratch);
        backend.copy_buffer(command_buffer, staging, local, self.scratch.len() as u64);
        self.dirty -= 1;
    }
}

impl BufferTracker for LocalBufferTracker {
    fn set_data(&mut self, data: &[u8]) {
        assert!(
            data.len() <= self.scratch.len(),
            "write of {} bytes exceeds tracker capacity {}",
            data.len(),
            self.scratch.len()
        );
        self.scratch[..data.len()].copy_from_slice(data);
        self.dirty = self.local.len();
    }

    fn data(&self) -> &[u8] {
        &self.scratch
    }

    fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = self.local.len();
        &mut self.scratch
    }

    fn update(&mut self, record: &RecordState) {
        let Some((_, command_buffer)) = record.open_command_buffer() else {
            panic!("local buffer update needs an open command buffer");
        };
        self.update_slot(record.frame_index(), command_buffer);
    }

    fn dirty_counter(&self) -> usize {
        self.dirty
    }
}
