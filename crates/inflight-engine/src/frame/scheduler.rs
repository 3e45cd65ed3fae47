use std::sync::Arc;

use crate::device::{
    AcquireOutcome, CommandBufferId, Extent, FrameError, GpuBackend, GpuCtx, PresentOutcome,
    QueueType, Submission, Swapchain,
};
use crate::pool::CommandPool;
use crate::tasks::{DeferredTask, DeferredTaskQueue, TaskContext, TaskSender};

use super::record::{FrameAcquire, RecordState, SkipReason, SwapchainState};
use super::resize::ResizeRegistry;
use super::slots::FrameSlots;

/// Drives the acquire → record → submit → present cycle over N frame slots.
///
/// The scheduler owns the per-slot fences, semaphores and command buffers,
/// the deferred task queue, and (through its [`GpuCtx`]) the command pool
/// registry and the resize registry. All methods run on the render thread;
/// other threads interact through [`GpuCtx`] clones.
///
/// The swapchain starts out flagged as resized, so the first
/// [`update`](Self::update) publishes the initial extent to resize
/// subscribers before any frame is acquired.
pub struct FrameScheduler {
    ctx: GpuCtx,
    tasks: DeferredTaskQueue,
    slots: FrameSlots,
    current_frame: usize,
    serial: u64,
    visible: bool,
    resized: bool,
    extent: Extent,
}

impl FrameScheduler {
    pub fn new(backend: Arc<dyn GpuBackend>, frames_in_flight: usize) -> Self {
        let tasks = DeferredTaskQueue::new();
        let ctx = GpuCtx::new(backend, frames_in_flight, tasks.sender());
        let slots = FrameSlots::new(&ctx);

        log::debug!("frame scheduler created with {frames_in_flight} frame(s) in flight");

        Self {
            ctx,
            tasks,
            slots,
            current_frame: 0,
            serial: 0,
            visible: true,
            resized: true,
            extent: Extent::default(),
        }
    }

    /// Creates a scheduler with one frame in flight per presentable image.
    pub fn for_swapchain(backend: Arc<dyn GpuBackend>, surface: &dyn Swapchain) -> Self {
        let frames = surface.image_count().max(1) as usize;
        Self::new(backend, frames)
    }

    #[inline]
    pub fn ctx(&self) -> &GpuCtx {
        &self.ctx
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.ctx.frames_in_flight()
    }

    /// Slot the next successful acquire will use.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn slots(&self) -> &FrameSlots {
        &self.slots
    }

    /// Extent published by the last surface change.
    #[inline]
    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn swapchain_state(&self) -> SwapchainState {
        if !self.visible {
            SwapchainState::Minimized
        } else if self.resized {
            SwapchainState::Resized
        } else {
            SwapchainState::Valid
        }
    }

    #[inline]
    pub fn resize_registry(&self) -> &ResizeRegistry {
        self.ctx.resize_registry()
    }

    #[inline]
    pub fn task_sender(&self) -> TaskSender {
        self.ctx.task_sender()
    }

    /// Enqueues a task from the render thread.
    pub fn add_deferred_task(&mut self, task: DeferredTask) {
        self.tasks.push(task);
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Calling thread's command pool for `queue`.
    pub fn command_pool(&self, queue: QueueType) -> Arc<CommandPool> {
        self.ctx.command_pool(queue)
    }

    // Platform signals

    /// Platform reported a resize. The refresh happens on the next
    /// [`update`](Self::update).
    pub fn notify_resized(&mut self) {
        self.resized = true;
    }

    pub fn set_window_visible(&mut self, visible: bool) {
        if visible && !self.visible {
            // The surface may have changed while hidden.
            self.resized = true;
        }
        if visible != self.visible {
            log::debug!("window visibility changed: {visible}");
        }
        self.visible = visible;
    }

    /// Once per loop iteration: refreshes the surface if a resize is pending.
    pub fn update(&mut self, surface: &dyn Swapchain) {
        if self.visible && self.resized {
            self.on_surface_change(surface);
        }
    }

    /// Waits for the device to go idle, re-reads the surface extent and, if
    /// it is non-degenerate, notifies resize subscribers.
    pub fn on_surface_change(&mut self, surface: &dyn Swapchain) {
        self.ctx.backend().wait_idle();

        let extent = surface.current_extent();
        self.extent = extent;
        self.resized = false;

        if extent.is_degenerate() {
            log::debug!("surface extent {}x{} is degenerate; not notifying", extent.width, extent.height);
            return;
        }
        self.ctx.resize_registry().notify(extent);
    }

    // Frame protocol

    /// Acquires the next presentable image for the current slot.
    ///
    /// Blocks on the slot's fence, which bounds how far the CPU can run ahead
    /// of the GPU. A fence that was reset by an earlier acquire but never
    /// submitted is not waited on again.
    pub fn acquire_frame(&mut self, surface: &dyn Swapchain) -> Result<FrameAcquire, FrameError> {
        if !self.visible {
            return Ok(FrameAcquire::Skipped(SkipReason::Hidden));
        }
        if self.resized {
            return Ok(FrameAcquire::Skipped(SkipReason::Resized));
        }

        let slot = self.current_frame;
        let backend = self.ctx.backend();

        if self.slots.fence_unsubmitted(slot) {
            log::trace!("slot {slot}: fence not submitted since reset; skipping wait");
        } else {
            let fence = self.slots.fence(slot);
            backend.wait_for_fence(fence);
            backend.reset_fence(fence);
            self.slots.set_fence_unsubmitted(slot, true);
        }

        match surface.acquire_next_image(self.slots.image_available(slot)) {
            AcquireOutcome::Acquired { image_index } => {
                self.current_frame = (slot + 1) % self.slots.len();
                self.serial += 1;
                log::trace!("acquired image {image_index} on slot {slot}");
                Ok(FrameAcquire::Ready(RecordState::new(self.serial, slot, image_index)))
            }
            AcquireOutcome::Suboptimal | AcquireOutcome::OutOfDate => {
                log::debug!("surface out of date on acquire; scheduling refresh");
                self.resized = true;
                Ok(FrameAcquire::Skipped(SkipReason::SurfaceOutOfDate))
            }
            AcquireOutcome::Timeout => {
                log::warn!("timed out acquiring a swapchain image");
                Ok(FrameAcquire::Skipped(SkipReason::Timeout))
            }
            AcquireOutcome::DeviceLost => {
                log::error!("device lost while acquiring a swapchain image");
                Err(FrameError::DeviceLost)
            }
        }
    }

    /// Starts recording the slot's command buffer for `queue`, then drains the
    /// deferred task queue with that buffer open. Task countdowns advance on
    /// the first begin of each frame only.
    pub fn begin_command_buffer(&mut self, record: &mut RecordState, queue: QueueType) -> CommandBufferId {
        self.assert_current(record);

        let command_buffer = self.slots.command_buffer(record.frame_index(), queue);
        record.open(queue, command_buffer);

        let backend = self.ctx.backend();
        backend.begin_command_buffer(command_buffer);

        let mut task_ctx = TaskContext::in_frame(
            backend,
            record.serial(),
            record.frame_index(),
            record.image_index(),
            (queue, command_buffer),
        );
        self.tasks.drain(&mut task_ctx);

        command_buffer
    }

    pub fn end_command_buffer(&mut self, record: &mut RecordState) {
        self.assert_current(record);
        let (_, command_buffer) = record.close();
        self.ctx.backend().end_command_buffer(command_buffer);
    }

    /// Submits what was recorded this frame: compute first, then graphics.
    ///
    /// Graphics waits for the acquired image and, when compute ran, for the
    /// compute work. A compute-only frame consumes the image wait itself. The
    /// slot fence rides on the last submission.
    pub fn submit_queues(&mut self, record: &mut RecordState) {
        self.assert_current(record);
        assert!(
            record.open_command_buffer().is_none(),
            "submitting frame slot {} while a command buffer is still recording",
            record.frame_index()
        );

        let slot = record.frame_index();
        let has_compute = record.has_recorded(QueueType::Compute);
        let has_graphics = record.has_recorded(QueueType::Graphics);
        let fence = self.slots.fence(slot);
        let backend = self.ctx.backend();

        if has_compute {
            let (wait, signal) = if has_graphics {
                (Vec::new(), vec![self.slots.compute_done(slot)])
            } else {
                (vec![self.slots.image_available(slot)], Vec::new())
            };
            backend.submit(
                QueueType::Compute,
                &Submission {
                    command_buffers: vec![self.slots.command_buffer(slot, QueueType::Compute)],
                    wait_semaphores: wait,
                    signal_semaphores: signal,
                    fence: (!has_graphics).then_some(fence),
                },
            );
        }

        if has_graphics {
            let mut wait = vec![self.slots.image_available(slot)];
            if has_compute {
                wait.push(self.slots.compute_done(slot));
            }
            backend.submit(
                QueueType::Graphics,
                &Submission {
                    command_buffers: vec![self.slots.command_buffer(slot, QueueType::Graphics)],
                    wait_semaphores: wait,
                    signal_semaphores: Vec::new(),
                    fence: Some(fence),
                },
            );
        }

        if has_compute || has_graphics {
            self.slots.set_fence_unsubmitted(slot, false);
        } else {
            log::trace!("slot {slot}: nothing recorded; no submission");
        }
    }

    /// Presents the frame's image. Consumes the handle.
    pub fn present(&mut self, record: RecordState, surface: &dyn Swapchain) -> Result<(), FrameError> {
        self.assert_current(&record);

        match surface.present(record.image_index()) {
            PresentOutcome::Presented => {
                if self.resized {
                    log::debug!("resize pending at present");
                }
                Ok(())
            }
            PresentOutcome::Suboptimal | PresentOutcome::OutOfDate => {
                log::debug!("surface out of date on present; scheduling refresh");
                self.resized = true;
                Ok(())
            }
            PresentOutcome::DeviceLost => {
                log::error!("device lost while presenting");
                Err(FrameError::DeviceLost)
            }
            PresentOutcome::Failed(reason) => {
                log::error!("present failed: {reason}");
                Err(FrameError::Present(reason))
            }
        }
    }

    fn assert_current(&self, record: &RecordState) {
        assert_eq!(
            record.serial(),
            self.serial,
            "frame handle for slot {} is stale",
            record.frame_index()
        );
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        let backend = self.ctx.backend_arc();
        backend.wait_idle();

        self.slots.release_command_buffers();
        self.tasks.flush(&*backend);
        self.slots.destroy_sync(&*backend);
        self.ctx.command_pools().destroy_all(&*backend);

        log::debug!("frame scheduler torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferGroup, BufferTracker, LocalBufferTracker};
    use crate::device::{HeadlessEvent, HeadlessGpu, MemoryKind};
    use crate::frame::ResizeStage;
    use crate::tasks::TaskControl;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scheduler(frames: usize) -> (Arc<HeadlessGpu>, FrameScheduler) {
        let gpu = Arc::new(HeadlessGpu::with_images(frames as u32));
        let mut scheduler = FrameScheduler::new(gpu.clone(), frames);
        scheduler.update(&*gpu);
        (gpu, scheduler)
    }

    fn run_frame(gpu: &HeadlessGpu, scheduler: &mut FrameScheduler) -> usize {
        let mut record = scheduler
            .acquire_frame(gpu)
            .unwrap()
            .ready()
            .expect("frame should be acquired");
        let slot = record.frame_index();
        scheduler.begin_command_buffer(&mut record, QueueType::Graphics);
        scheduler.end_command_buffer(&mut record);
        scheduler.submit_queues(&mut record);
        scheduler.present(record, gpu).unwrap();
        slot
    }

    fn fence_waits(gpu: &HeadlessGpu, fence: crate::device::FenceId) -> usize {
        gpu.events()
            .iter()
            .filter(|e| matches!(e, HeadlessEvent::WaitFence(f) if *f == fence))
            .count()
    }

    #[test]
    fn first_update_publishes_initial_extent() {
        let gpu = Arc::new(HeadlessGpu::new());
        gpu.set_extent(Extent::new(320, 200));
        let mut scheduler = FrameScheduler::new(gpu.clone(), 2);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        scheduler
            .resize_registry()
            .subscribe(ResizeStage::Resources, move |e| s.lock().push(e));

        assert_eq!(scheduler.swapchain_state(), SwapchainState::Resized);
        assert!(matches!(
            scheduler.acquire_frame(&*gpu).unwrap(),
            FrameAcquire::Skipped(SkipReason::Resized)
        ));

        scheduler.update(&*gpu);
        assert_eq!(scheduler.swapchain_state(), SwapchainState::Valid);
        assert_eq!(*seen.lock(), vec![Extent::new(320, 200)]);
        assert_eq!(scheduler.extent(), Extent::new(320, 200));
    }

    #[test]
    fn slot_advances_by_one_on_each_successful_acquire() {
        let (gpu, mut scheduler) = scheduler(3);
        let slots: Vec<_> = (0..7).map(|_| run_frame(&gpu, &mut scheduler)).collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(scheduler.frame_index(), 1);
    }

    #[test]
    fn minimized_window_skips_without_touching_fences() {
        let (gpu, mut scheduler) = scheduler(3);
        run_frame(&gpu, &mut scheduler);
        run_frame(&gpu, &mut scheduler);
        assert_eq!(scheduler.frame_index(), 2);

        scheduler.set_window_visible(false);
        let before = gpu.events().len();
        for _ in 0..5 {
            scheduler.update(&*gpu);
            assert!(matches!(
                scheduler.acquire_frame(&*gpu).unwrap(),
                FrameAcquire::Skipped(SkipReason::Hidden)
            ));
        }
        assert_eq!(gpu.events().len(), before);
        assert_eq!(scheduler.frame_index(), 2);
        assert_eq!(scheduler.swapchain_state(), SwapchainState::Minimized);

        scheduler.set_window_visible(true);
        scheduler.update(&*gpu);
        assert_eq!(run_frame(&gpu, &mut scheduler), 2);
        assert_eq!(scheduler.frame_index(), 0);
    }

    #[test]
    fn out_of_date_acquire_does_not_advance_or_double_wait() {
        let (gpu, mut scheduler) = scheduler(3);
        run_frame(&gpu, &mut scheduler);
        let slot = scheduler.frame_index();
        let fence = scheduler.slots().fence(slot);

        gpu.push_acquire_outcome(AcquireOutcome::OutOfDate);
        assert!(matches!(
            scheduler.acquire_frame(&*gpu).unwrap(),
            FrameAcquire::Skipped(SkipReason::SurfaceOutOfDate)
        ));
        assert_eq!(scheduler.frame_index(), slot);
        assert_eq!(scheduler.swapchain_state(), SwapchainState::Resized);
        assert_eq!(fence_waits(&gpu, fence), 1);

        scheduler.update(&*gpu);
        assert_eq!(run_frame(&gpu, &mut scheduler), slot);
        assert_eq!(fence_waits(&gpu, fence), 1);
        assert_eq!(scheduler.frame_index(), slot + 1);
    }

    #[test]
    fn consecutive_stale_acquires_never_wait_twice() {
        let (gpu, mut scheduler) = scheduler(2);
        let fence = scheduler.slots().fence(0);

        for _ in 0..3 {
            gpu.push_acquire_outcome(AcquireOutcome::Suboptimal);
            assert!(!scheduler.acquire_frame(&*gpu).unwrap().is_ready());
            scheduler.notify_resized();
            scheduler.update(&*gpu);
        }
        assert_eq!(fence_waits(&gpu, fence), 1);
        assert_eq!(run_frame(&gpu, &mut scheduler), 0);
        assert_eq!(fence_waits(&gpu, fence), 1);
    }

    #[test]
    fn timeout_skips_without_flagging_resize() {
        let (gpu, mut scheduler) = scheduler(2);
        gpu.push_acquire_outcome(AcquireOutcome::Timeout);
        assert!(matches!(
            scheduler.acquire_frame(&*gpu).unwrap(),
            FrameAcquire::Skipped(SkipReason::Timeout)
        ));
        assert_eq!(scheduler.swapchain_state(), SwapchainState::Valid);
        assert_eq!(run_frame(&gpu, &mut scheduler), 0);
    }

    #[test]
    fn acquire_device_lost_is_fatal() {
        let (gpu, mut scheduler) = scheduler(2);
        gpu.push_acquire_outcome(AcquireOutcome::DeviceLost);
        assert!(matches!(scheduler.acquire_frame(&*gpu), Err(FrameError::DeviceLost)));
    }

    #[test]
    fn fence_wait_bounds_run_ahead_to_n_frames() {
        let (gpu, mut scheduler) = scheduler(2);
        run_frame(&gpu, &mut scheduler);
        run_frame(&gpu, &mut scheduler);
        assert_eq!(gpu.in_flight_count(), 2);

        // Slot 0 comes around again; its fence wait completes its prior work.
        run_frame(&gpu, &mut scheduler);
        assert_eq!(fence_waits(&gpu, scheduler.slots().fence(0)), 2);
        assert_eq!(gpu.in_flight_count(), 2);
    }

    #[test]
    fn compute_is_submitted_before_graphics() {
        let (gpu, mut scheduler) = scheduler(2);
        let mut record = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
        scheduler.begin_command_buffer(&mut record, QueueType::Compute);
        scheduler.end_command_buffer(&mut record);
        scheduler.begin_command_buffer(&mut record, QueueType::Graphics);
        scheduler.end_command_buffer(&mut record);
        scheduler.submit_queues(&mut record);

        let slots = scheduler.slots();
        let submits: Vec<_> = gpu
            .events()
            .into_iter()
            .filter_map(|e| match e {
                HeadlessEvent::Submit { queue, submission } => Some((queue, submission)),
                _ => None,
            })
            .collect();
        assert_eq!(submits.len(), 2);

        let (q0, compute) = &submits[0];
        assert_eq!(*q0, QueueType::Compute);
        assert!(compute.wait_semaphores.is_empty());
        assert_eq!(compute.signal_semaphores, vec![slots.compute_done(0)]);
        assert_eq!(compute.fence, None);

        let (q1, graphics) = &submits[1];
        assert_eq!(*q1, QueueType::Graphics);
        assert_eq!(
            graphics.wait_semaphores,
            vec![slots.image_available(0), slots.compute_done(0)]
        );
        assert_eq!(graphics.fence, Some(slots.fence(0)));
    }

    #[test]
    fn compute_only_frame_carries_the_fence() {
        let (gpu, mut scheduler) = scheduler(1);
        let mut record = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
        scheduler.begin_command_buffer(&mut record, QueueType::Compute);
        scheduler.end_command_buffer(&mut record);
        scheduler.submit_queues(&mut record);
        scheduler.present(record, &*gpu).unwrap();

        let compute = gpu
            .events()
            .into_iter()
            .find_map(|e| match e {
                HeadlessEvent::Submit { submission, .. } => Some(submission),
                _ => None,
            })
            .expect("compute submission");
        assert_eq!(compute.wait_semaphores, vec![scheduler.slots().image_available(0)]);
        assert_eq!(compute.fence, Some(scheduler.slots().fence(0)));

        // Next acquire on the same slot must wait for the compute work.
        assert!(scheduler.acquire_frame(&*gpu).unwrap().is_ready());
        assert_eq!(fence_waits(&gpu, scheduler.slots().fence(0)), 2);
        assert_eq!(gpu.in_flight_count(), 0);
    }

    #[test]
    fn empty_frame_does_not_deadlock_next_acquire() {
        let (gpu, mut scheduler) = scheduler(1);
        let mut record = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
        scheduler.submit_queues(&mut record);
        scheduler.present(record, &*gpu).unwrap();

        assert!(scheduler.acquire_frame(&*gpu).unwrap().is_ready());
    }

    #[test]
    fn deferred_release_runs_once_after_n_plus_one_begins() {
        let (gpu, mut scheduler) = scheduler(3);
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        scheduler.ctx().defer_release(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..3 {
            run_frame(&gpu, &mut scheduler);
            assert_eq!(runs.load(Ordering::SeqCst), 0);
        }
        run_frame(&gpu, &mut scheduler);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        for _ in 0..4 {
            run_frame(&gpu, &mut scheduler);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending_tasks(), 0);
    }

    #[test]
    fn release_outlasts_frames_that_record_compute_and_graphics() {
        let (gpu, mut scheduler) = scheduler(3);

        let group = BufferGroup::per_frame(scheduler.ctx(), 16, MemoryKind::HostVisible);
        let mut record = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
        let using_slot = record.frame_index();
        for queue in [QueueType::Compute, QueueType::Graphics] {
            scheduler.begin_command_buffer(&mut record, queue);
            scheduler.end_command_buffer(&mut record);
        }
        scheduler.submit_queues(&mut record);
        scheduler.present(record, &*gpu).unwrap();
        drop(group);

        let using_fence = scheduler.slots().fence(using_slot);
        let mut frames = 0;
        while gpu.live_buffer_count() > 0 {
            let mut record = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
            scheduler.begin_command_buffer(&mut record, QueueType::Compute);
            if gpu.live_buffer_count() == 0 {
                assert!(fence_waits(&gpu, using_fence) >= 2, "released before the using frame completed");
            }
            scheduler.end_command_buffer(&mut record);
            scheduler.begin_command_buffer(&mut record, QueueType::Graphics);
            scheduler.end_command_buffer(&mut record);
            scheduler.submit_queues(&mut record);
            scheduler.present(record, &*gpu).unwrap();
            frames += 1;
            assert!(frames <= 4);
        }
        assert_eq!(frames, 4);
    }

    #[test]
    fn tasks_see_the_open_command_buffer() {
        let (gpu, mut scheduler) = scheduler(2);
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        scheduler.add_deferred_task(DeferredTask::every_frame(move |ctx| {
            *s.lock() = ctx.command_buffer().zip(ctx.frame_index());
            TaskControl::Done
        }));

        let mut record = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
        let cmd = scheduler.begin_command_buffer(&mut record, QueueType::Graphics);
        assert_eq!(*seen.lock(), Some(((QueueType::Graphics, cmd), 0)));
    }

    #[test]
    fn tasks_from_worker_threads_are_all_executed() {
        let (gpu, mut scheduler) = scheduler(2);
        let runs = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|s| {
            for _ in 0..4 {
                let ctx = scheduler.ctx().clone();
                let runs = runs.clone();
                s.spawn(move || {
                    for _ in 0..25 {
                        let r = runs.clone();
                        ctx.defer(DeferredTask::after(1, move |_| {
                            r.fetch_add(1, Ordering::SeqCst);
                        }));
                    }
                });
            }
        });

        run_frame(&gpu, &mut scheduler);
        assert_eq!(runs.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn resize_waits_for_all_submitted_work_first() {
        let (gpu, mut scheduler) = scheduler(3);
        run_frame(&gpu, &mut scheduler);
        run_frame(&gpu, &mut scheduler);
        assert_eq!(gpu.in_flight_count(), 2);

        let observed = Arc::new(Mutex::new(None));
        {
            let gpu = gpu.clone();
            let observed = observed.clone();
            let fences = [scheduler.slots().fence(0), scheduler.slots().fence(1)];
            scheduler.resize_registry().subscribe(ResizeStage::Resources, move |_| {
                let signaled = fences.iter().all(|&f| gpu.is_fence_signaled(f));
                *observed.lock() = Some((gpu.in_flight_count(), signaled));
            });
        }

        gpu.set_extent(Extent::new(1024, 768));
        scheduler.notify_resized();
        scheduler.update(&*gpu);

        assert_eq!(*observed.lock(), Some((0, true)));
        assert_eq!(scheduler.extent(), Extent::new(1024, 768));
    }

    #[test]
    fn degenerate_extent_does_not_notify() {
        let (gpu, mut scheduler) = scheduler(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        scheduler.resize_registry().subscribe(ResizeStage::Passes, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        gpu.set_extent(Extent::new(0, 600));
        scheduler.notify_resized();
        scheduler.update(&*gpu);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.swapchain_state(), SwapchainState::Valid);
    }

    #[test]
    fn present_out_of_date_flags_resize() {
        let (gpu, mut scheduler) = scheduler(2);
        gpu.push_present_outcome(PresentOutcome::OutOfDate);
        run_frame(&gpu, &mut scheduler);
        assert_eq!(scheduler.swapchain_state(), SwapchainState::Resized);
        assert!(matches!(
            scheduler.acquire_frame(&*gpu).unwrap(),
            FrameAcquire::Skipped(SkipReason::Resized)
        ));
    }

    #[test]
    fn unexpected_present_failure_is_fatal() {
        let (gpu, mut scheduler) = scheduler(2);
        gpu.push_present_outcome(PresentOutcome::Failed("swapchain lost".into()));
        let mut record = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
        scheduler.begin_command_buffer(&mut record, QueueType::Graphics);
        scheduler.end_command_buffer(&mut record);
        scheduler.submit_queues(&mut record);
        let err = scheduler.present(record, &*gpu).unwrap_err();
        assert!(matches!(err, FrameError::Present(ref r) if r == "swapchain lost"));
    }

    #[test]
    #[should_panic(expected = "already recording")]
    fn begin_twice_without_end_panics() {
        let (gpu, mut scheduler) = scheduler(2);
        let mut record = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
        scheduler.begin_command_buffer(&mut record, QueueType::Graphics);
        scheduler.begin_command_buffer(&mut record, QueueType::Compute);
    }

    #[test]
    #[should_panic(expected = "no command buffer is recording")]
    fn end_without_begin_panics() {
        let (gpu, mut scheduler) = scheduler(2);
        let mut record = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
        scheduler.end_command_buffer(&mut record);
    }

    #[test]
    #[should_panic(expected = "is stale")]
    fn stale_handle_panics() {
        let (gpu, mut scheduler) = scheduler(2);
        let mut old = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
        let _new = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
        scheduler.begin_command_buffer(&mut old, QueueType::Graphics);
    }

    #[test]
    fn local_tracker_converges_across_frames() {
        let (gpu, mut scheduler) = scheduler(3);
        let ctx = scheduler.ctx().clone();
        let local = Arc::new(BufferGroup::per_frame(&ctx, 64, MemoryKind::DeviceLocal));
        let staging = Arc::new(BufferGroup::per_frame(&ctx, 64, MemoryKind::HostVisible));
        let mut tracker = LocalBufferTracker::new(local.clone(), staging);

        let value: Vec<u8> = (0..64).collect();
        tracker.set_data(&value);

        for _ in 0..3 {
            let mut record = scheduler.acquire_frame(&*gpu).unwrap().ready().unwrap();
            scheduler.begin_command_buffer(&mut record, QueueType::Graphics);
            tracker.update(&record);
            scheduler.end_command_buffer(&mut record);
            scheduler.submit_queues(&mut record);
            scheduler.present(record, &*gpu).unwrap();
        }

        assert_eq!(tracker.dirty_counter(), 0);
        for &buffer in local.buffers() {
            assert_eq!(gpu.buffer_data(buffer), value);
        }
    }

    #[test]
    fn teardown_releases_every_object() {
        let gpu = Arc::new(HeadlessGpu::with_images(3));
        {
            let mut scheduler = FrameScheduler::for_swapchain(gpu.clone(), &*gpu);
            assert_eq!(scheduler.frames_in_flight(), 3);
            scheduler.update(&*gpu);
            let group = BufferGroup::per_frame(scheduler.ctx(), 16, MemoryKind::HostVisible);
            run_frame(&gpu, &mut scheduler);
            drop(group);
            run_frame(&gpu, &mut scheduler);
        }
        assert_eq!(gpu.live_buffer_count(), 0);
        assert_eq!(gpu.live_pool_count(), 0);
        assert_eq!(gpu.live_fence_count(), 0);
        assert_eq!(gpu.live_semaphore_count(), 0);
        assert_eq!(gpu.in_flight_count(), 0);
    }
}
