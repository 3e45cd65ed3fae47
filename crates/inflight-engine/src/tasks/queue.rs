use std::collections::VecDeque;

use crossbeam::channel::{self, Receiver, SendError, Sender};

use crate::device::GpuBackend;

use super::task::{DeferredTask, TaskContext, TaskControl};

/// Cloneable producer side of a [`DeferredTaskQueue`].
///
/// May be used from any thread.
#[derive(Clone)]
pub struct TaskSender {
    tx: Sender<DeferredTask>,
}

impl TaskSender {
    /// Enqueues a task for the next drain.
    ///
    /// Fails, handing the task back, once the queue has been dropped.
    pub fn send(&self, task: DeferredTask) -> Result<(), SendError<DeferredTask>> {
        self.tx.send(task)
    }
}

impl std::fmt::Debug for TaskSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSender").finish_non_exhaustive()
    }
}

/// Deferred work drained at every command buffer begin.
///
/// Countdowns advance once per frame: repeated drains carrying the same frame
/// serial visit tasks without ticking them. Detached drains always tick.
///
/// Producers on any thread push through [`TaskSender`]; the owning thread
/// pushes directly. Only the owner drains and executes.
pub struct DeferredTaskQueue {
    pending: VecDeque<DeferredTask>,
    tx: Sender<DeferredTask>,
    rx: Receiver<DeferredTask>,
    last_serial: Option<u64>,
}

impl DeferredTaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self {
            pending: VecDeque::new(),
            tx,
            rx,
            last_serial: None,
        }
    }

    pub fn sender(&self) -> TaskSender {
        TaskSender { tx: self.tx.clone() }
    }

    /// Enqueues from the owning thread.
    pub fn push(&mut self, task: DeferredTask) {
        self.pending.push_back(task);
    }

    /// Tasks waiting, including ones not yet moved out of the channel.
    pub fn len(&self) -> usize {
        self.pending.len() + self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves every sent task into the queue, then visits each queued task once.
    ///
    /// Tasks enqueued while draining (from inside a task or another thread)
    /// wait for the next drain. Returns the number of tasks that finished.
    pub fn drain(&mut self, ctx: &mut TaskContext<'_>) -> usize {
        self.pending.extend(self.rx.try_iter());

        let tick = match ctx.frame_serial() {
            Some(serial) => self.last_serial.replace(serial) != Some(serial),
            None => true,
        };

        let count = self.pending.len();
        let mut finished = 0;
        for _ in 0..count {
            let Some(mut task) = self.pending.pop_front() else {
                break;
            };
            match task.visit(ctx, tick) {
                TaskControl::Keep => self.pending.push_back(task),
                TaskControl::Done => finished += 1,
            }
        }

        if finished > 0 {
            log::trace!("deferred tasks: {finished} finished, {} pending", self.pending.len());
        }
        finished
    }

    /// Runs every pending task once, ignoring countdowns, and empties the queue.
    ///
    /// Only valid once the device is idle. Tasks that ask to be kept are
    /// dropped anyway.
    pub fn flush(&mut self, backend: &dyn GpuBackend) -> usize {
        self.pending.extend(self.rx.try_iter());

        let mut ctx = TaskContext::detached(backend);
        let mut dropped = 0;
        let mut ran = 0;
        while let Some(task) = self.pending.pop_front() {
            ran += 1;
            if task.force(&mut ctx) == TaskControl::Keep {
                dropped += 1;
            }
        }

        if dropped > 0 {
            log::warn!("deferred task flush dropped {dropped} task(s) that asked to be kept");
        }
        log::debug!("flushed {ran} deferred task(s)");
        ran
    }
}

impl Default for DeferredTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessGpu, QueueType};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    static SERIAL: AtomicU64 = AtomicU64::new(1);

    fn drain_in_frame(queue: &mut DeferredTaskQueue, gpu: &HeadlessGpu, serial: u64) -> usize {
        let pool = gpu.create_command_pool(QueueType::Graphics);
        let cmd = gpu.allocate_command_buffers(pool, 1)[0];
        let mut ctx = TaskContext::in_frame(gpu, serial, 0, 0, (QueueType::Graphics, cmd));
        queue.drain(&mut ctx)
    }

    fn drain_once(queue: &mut DeferredTaskQueue, gpu: &HeadlessGpu) -> usize {
        drain_in_frame(queue, gpu, SERIAL.fetch_add(1, Ordering::Relaxed))
    }

    #[test]
    fn after_runs_exactly_once_on_kth_drain() {
        let gpu = HeadlessGpu::new();
        let mut queue = DeferredTaskQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let r = runs.clone();
        queue.push(DeferredTask::after(4, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..3 {
            drain_once(&mut queue, &gpu);
            assert_eq!(runs.load(Ordering::SeqCst), 0);
        }

        drain_once(&mut queue, &gpu);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(queue.is_empty());

        for _ in 0..4 {
            drain_once(&mut queue, &gpu);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn repeated_drains_in_one_frame_tick_once() {
        let gpu = HeadlessGpu::new();
        let mut queue = DeferredTaskQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let visits = Arc::new(AtomicUsize::new(0));

        let r = runs.clone();
        queue.push(DeferredTask::after(2, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        }));
        let v = visits.clone();
        queue.push(DeferredTask::every_frame(move |_| {
            v.fetch_add(1, Ordering::SeqCst);
            TaskControl::Keep
        }));

        // Compute and graphics begins of the same frame.
        drain_in_frame(&mut queue, &gpu, 10);
        drain_in_frame(&mut queue, &gpu, 10);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending[0].remaining(), 1);
        assert_eq!(visits.load(Ordering::SeqCst), 2);

        drain_in_frame(&mut queue, &gpu, 11);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        drain_in_frame(&mut queue, &gpu, 11);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn zero_delay_runs_on_first_drain() {
        let gpu = HeadlessGpu::new();
        let mut queue = DeferredTaskQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let r = runs.clone();
        queue.push(DeferredTask::after(0, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(drain_once(&mut queue, &gpu), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn keep_is_revisited_until_done() {
        let gpu = HeadlessGpu::new();
        let mut queue = DeferredTaskQueue::new();
        let visits = Arc::new(AtomicUsize::new(0));

        let v = visits.clone();
        queue.push(DeferredTask::every_frame(move |_| {
            if v.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                TaskControl::Done
            } else {
                TaskControl::Keep
            }
        }));

        drain_once(&mut queue, &gpu);
        drain_once(&mut queue, &gpu);
        assert_eq!(queue.len(), 1);
        drain_once(&mut queue, &gpu);
        assert!(queue.is_empty());
        assert_eq!(visits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn tasks_sent_during_drain_wait_for_next_drain() {
        let gpu = HeadlessGpu::new();
        let mut queue = DeferredTaskQueue::new();
        let sender = queue.sender();
        let runs = Arc::new(AtomicUsize::new(0));

        let r = runs.clone();
        queue.push(DeferredTask::after(1, move |_| {
            let r = r.clone();
            sender
                .send(DeferredTask::after(1, move |_| {
                    r.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }));

        drain_once(&mut queue, &gpu);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(queue.len(), 1);

        drain_once(&mut queue, &gpu);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let gpu = HeadlessGpu::new();
        let mut queue = DeferredTaskQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|s| {
            for _ in 0..8 {
                let sender = queue.sender();
                let runs = runs.clone();
                s.spawn(move || {
                    for _ in 0..100 {
                        let r = runs.clone();
                        sender
                            .send(DeferredTask::after(2, move |_| {
                                r.fetch_add(1, Ordering::SeqCst);
                            }))
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(queue.len(), 800);
        drain_once(&mut queue, &gpu);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        drain_once(&mut queue, &gpu);
        assert_eq!(runs.load(Ordering::SeqCst), 800);
        assert!(queue.is_empty());
    }

    #[test]
    fn flush_ignores_countdown() {
        let gpu = HeadlessGpu::new();
        let mut queue = DeferredTaskQueue::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let r = runs.clone();
        queue.push(DeferredTask::after(100, move |ctx| {
            assert!(ctx.is_detached());
            r.fetch_add(1, Ordering::SeqCst);
        }));
        let r = runs.clone();
        queue
            .sender()
            .send(DeferredTask::every_frame(move |_| {
                r.fetch_add(1, Ordering::SeqCst);
                TaskControl::Keep
            }))
            .unwrap();

        assert_eq!(queue.flush(&gpu), 2);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
    }
}
