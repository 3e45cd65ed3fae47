use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;

use super::{
    AcquireOutcome, BufferId, CommandBufferId, CommandPoolId, Extent, FenceId, GpuBackend,
    MemoryKind, PresentOutcome, QueueType, SemaphoreId, Submission, Swapchain,
};

/// Something a [`HeadlessGpu`] was asked to do, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlessEvent {
    WaitFence(FenceId),
    ResetFence(FenceId),
    Submit {
        queue: QueueType,
        submission: Submission,
    },
    Acquire(AcquireOutcome),
    Present(u32),
    WaitIdle,
}

#[derive(Debug, Clone, Copy)]
struct BufferCopy {
    src: BufferId,
    dst: BufferId,
    size: u64,
}

#[derive(Debug)]
struct CommandBufferState {
    pool: CommandPoolId,
    recording: bool,
    copies: Vec<BufferCopy>,
}

#[derive(Debug)]
struct BufferState {
    data: Vec<u8>,
    memory: MemoryKind,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    fences: HashMap<FenceId, bool>,
    semaphores: HashSet<SemaphoreId>,
    pools: HashMap<CommandPoolId, QueueType>,
    command_buffers: HashMap<CommandBufferId, CommandBufferState>,
    buffers: HashMap<BufferId, BufferState>,
    // Submitted and not yet observed as complete, oldest first.
    in_flight: VecDeque<Submission>,
    writes: usize,
    image_count: u32,
    next_image: u32,
    extent: Extent,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    events: Vec<HeadlessEvent>,
}

impl State {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Retires the oldest submission, signaling its fence.
    fn complete_oldest(&mut self) -> bool {
        let Some(submission) = self.in_flight.pop_front() else {
            return false;
        };
        if let Some(fence) = submission.fence {
            if let Some(signaled) = self.fences.get_mut(&fence) {
                *signaled = true;
            }
        }
        true
    }

    fn complete_all(&mut self) {
        while self.complete_oldest() {}
    }

    fn execute(&mut self, command_buffer: CommandBufferId) {
        let copies = match self.command_buffers.get(&command_buffer) {
            Some(state) => {
                assert!(!state.recording, "{command_buffer:?} submitted while still recording");
                state.copies.clone()
            }
            None => panic!("submitting unknown {command_buffer:?}"),
        };
        for copy in copies {
            let size = copy.size as usize;
            let bytes = self.buffers[&copy.src].data[..size].to_vec();
            let dst = self
                .buffers
                .get_mut(&copy.dst)
                .unwrap_or_else(|| panic!("copy into unknown {:?}", copy.dst));
            dst.data[..size].copy_from_slice(&bytes);
        }
    }
}

/// A CPU-only device and presentation engine.
///
/// Work executes at submit time, but completion is only observed when the CPU
/// waits for it (a fence wait or idle wait) or calls
/// [`complete_submitted`](Self::complete_submitted). That keeps submitted
/// frames "in flight" exactly as long as nothing has synchronized with them.
///
/// Waiting on a fence that is unsignaled and carried by no pending submission
/// would hang a real device; here it panics.
#[derive(Debug)]
pub struct HeadlessGpu {
    state: Mutex<State>,
}

impl HeadlessGpu {
    pub fn new() -> Self {
        Self::with_images(3)
    }

    /// Device whose presentation engine cycles through `image_count` images.
    pub fn with_images(image_count: u32) -> Self {
        assert!(image_count > 0, "at least one presentable image is required");
        Self {
            state: Mutex::new(State {
                image_count,
                extent: Extent::new(800, 600),
                ..State::default()
            }),
        }
    }

    /// Makes the next acquire return `outcome` instead of an image.
    pub fn push_acquire_outcome(&self, outcome: AcquireOutcome) {
        self.state.lock().acquire_script.push_back(outcome);
    }

    /// Makes the next present return `outcome`.
    pub fn push_present_outcome(&self, outcome: PresentOutcome) {
        self.state.lock().present_script.push_back(outcome);
    }

    pub fn set_extent(&self, extent: Extent) {
        self.state.lock().extent = extent;
    }

    pub fn events(&self) -> Vec<HeadlessEvent> {
        self.state.lock().events.clone()
    }

    /// Submissions not yet observed as complete.
    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Observes completion of every pending submission.
    pub fn complete_submitted(&self) {
        self.state.lock().complete_all();
    }

    /// Contents of `buffer`. Panics if it does not exist.
    pub fn buffer_data(&self, buffer: BufferId) -> Vec<u8> {
        match self.state.lock().buffers.get(&buffer) {
            Some(state) => state.data.clone(),
            None => panic!("unknown {buffer:?}"),
        }
    }

    /// Host writes issued through [`GpuBackend::write_buffer`].
    pub fn write_count(&self) -> usize {
        self.state.lock().writes
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_pool_count(&self) -> usize {
        self.state.lock().pools.len()
    }

    pub fn live_command_buffer_count(&self) -> usize {
        self.state.lock().command_buffers.len()
    }

    pub fn live_fence_count(&self) -> usize {
        self.state.lock().fences.len()
    }

    pub fn live_semaphore_count(&self) -> usize {
        self.state.lock().semaphores.len()
    }
}

impl Default for HeadlessGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for HeadlessGpu {
    fn create_fence(&self, signaled: bool) -> FenceId {
        let mut state = self.state.lock();
        let fence = FenceId::from_raw(state.next());
        state.fences.insert(fence, signaled);
        fence
    }

    fn wait_for_fence(&self, fence: FenceId) {
        let mut state = self.state.lock();
        state.events.push(HeadlessEvent::WaitFence(fence));
        loop {
            match state.fences.get(&fence) {
                Some(true) => return,
                Some(false) => {}
                None => panic!("waiting on unknown {fence:?}"),
            }
            let pending = state.in_flight.iter().any(|s| s.fence == Some(fence));
            assert!(pending, "waiting on {fence:?}, which no submission will signal");
            state.complete_oldest();
        }
    }

    fn reset_fence(&self, fence: FenceId) {
        let mut state = self.state.lock();
        state.events.push(HeadlessEvent::ResetFence(fence));
        if let Some(signaled) = state.fences.get_mut(&fence) {
            *signaled = false;
        }
    }

    fn is_fence_signaled(&self, fence: FenceId) -> bool {
        self.state.lock().fences.get(&fence).copied().unwrap_or(false)
    }

    fn destroy_fence(&self, fence: FenceId) {
        if self.state.lock().fences.remove(&fence).is_none() {
            log::warn!("destroying unknown {fence:?}");
        }
    }

    fn create_semaphore(&self) -> SemaphoreId {
        let mut state = self.state.lock();
        let semaphore = SemaphoreId::from_raw(state.next());
        state.semaphores.insert(semaphore);
        semaphore
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreId) {
        if !self.state.lock().semaphores.remove(&semaphore) {
            log::warn!("destroying unknown {semaphore:?}");
        }
    }

    fn create_command_pool(&self, queue: QueueType) -> CommandPoolId {
        let mut state = self.state.lock();
        let pool = CommandPoolId::from_raw(state.next());
        state.pools.insert(pool, queue);
        pool
    }

    fn destroy_command_pool(&self, pool: CommandPoolId) {
        let mut state = self.state.lock();
        if state.pools.remove(&pool).is_none() {
            log::warn!("destroying unknown {pool:?}");
        }
        state.command_buffers.retain(|_, cmd| cmd.pool != pool);
    }

    fn allocate_command_buffers(&self, pool: CommandPoolId, count: usize) -> Vec<CommandBufferId> {
        let mut state = self.state.lock();
        assert!(state.pools.contains_key(&pool), "allocating from unknown {pool:?}");
        (0..count)
            .map(|_| {
                let id = CommandBufferId::from_raw(state.next());
                state.command_buffers.insert(
                    id,
                    CommandBufferState {
                        pool,
                        recording: false,
                        copies: Vec::new(),
                    },
                );
                id
            })
            .collect()
    }

    fn begin_command_buffer(&self, command_buffer: CommandBufferId) {
        let mut state = self.state.lock();
        let Some(cmd) = state.command_buffers.get_mut(&command_buffer) else {
            panic!("beginning unknown {command_buffer:?}");
        };
        assert!(!cmd.recording, "{command_buffer:?} is already recording");
        cmd.recording = true;
        cmd.copies.clear();
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferId) {
        let mut state = self.state.lock();
        let Some(cmd) = state.command_buffers.get_mut(&command_buffer) else {
            panic!("ending unknown {command_buffer:?}");
        };
        assert!(cmd.recording, "{command_buffer:?} is not recording");
        cmd.recording = false;
    }

    fn submit(&self, queue: QueueType, submission: &Submission) {
        let mut state = self.state.lock();
        state.events.push(HeadlessEvent::Submit {
            queue,
            submission: submission.clone(),
        });
        for &command_buffer in &submission.command_buffers {
            state.execute(command_buffer);
        }
        state.in_flight.push_back(submission.clone());
    }

    fn wait_idle(&self) {
        let mut state = self.state.lock();
        state.events.push(HeadlessEvent::WaitIdle);
        state.complete_all();
    }

    fn create_buffer(&self, size: u64, memory: MemoryKind) -> BufferId {
        let mut state = self.state.lock();
        let buffer = BufferId::from_raw(state.next());
        state.buffers.insert(
            buffer,
            BufferState {
                data: vec![0; size as usize],
                memory,
            },
        );
        buffer
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        if self.state.lock().buffers.remove(&buffer).is_none() {
            log::warn!("destroying unknown {buffer:?}");
        }
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) {
        let mut state = self.state.lock();
        state.writes += 1;
        let Some(target) = state.buffers.get_mut(&buffer) else {
            panic!("writing unknown {buffer:?}");
        };
        assert_eq!(
            target.memory,
            MemoryKind::HostVisible,
            "host write into device-local {buffer:?}"
        );
        let start = offset as usize;
        let end = start + data.len();
        assert!(end <= target.data.len(), "write past the end of {buffer:?}");
        target.data[start..end].copy_from_slice(data);
    }

    fn copy_buffer(&self, command_buffer: CommandBufferId, src: BufferId, dst: BufferId, size: u64) {
        let mut state = self.state.lock();
        let Some(cmd) = state.command_buffers.get_mut(&command_buffer) else {
            panic!("recording into unknown {command_buffer:?}");
        };
        assert!(cmd.recording, "{command_buffer:?} is not recording");
        cmd.copies.push(BufferCopy { src, dst, size });
    }
}

impl Swapchain for HeadlessGpu {
    fn acquire_next_image(&self, _signal: SemaphoreId) -> AcquireOutcome {
        let mut state = self.state.lock();
        let outcome = match state.acquire_script.pop_front() {
            Some(outcome) => outcome,
            None => {
                let image_index = state.next_image;
                state.next_image = (image_index + 1) % state.image_count;
                AcquireOutcome::Acquired { image_index }
            }
        };
        state.events.push(HeadlessEvent::Acquire(outcome));
        outcome
    }

    fn present(&self, image_index: u32) -> PresentOutcome {
        let mut state = self.state.lock();
        state.events.push(HeadlessEvent::Present(image_index));
        state
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented)
    }

    fn current_extent(&self) -> Extent {
        self.state.lock().extent
    }

    fn image_count(&self) -> u32 {
        self.state.lock().image_count
    }
}
