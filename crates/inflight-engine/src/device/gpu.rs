use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::surface::{choose_alpha_mode, choose_surface_format, map_surface_error};
use super::{
    AcquireOutcome, BufferId, CommandBufferId, CommandPoolId, Extent, FenceId, GpuBackend,
    GpuInit, MemoryKind, PresentOutcome, QueueType, SemaphoreId, Submission, Swapchain,
};

struct FenceState {
    signaled: Arc<AtomicBool>,
    // A submission carrying this fence was issued since the last reset.
    submitted: bool,
}

enum Recording {
    Idle,
    Open(wgpu::CommandEncoder),
    Finished(wgpu::CommandBuffer),
}

struct CommandSlot {
    pool: CommandPoolId,
    queue: QueueType,
    state: Recording,
}

#[derive(Default)]
struct Objects {
    next_id: u64,
    fences: HashMap<FenceId, FenceState>,
    semaphores: HashSet<SemaphoreId>,
    pools: HashMap<CommandPoolId, QueueType>,
    command_buffers: HashMap<CommandBufferId, CommandSlot>,
    buffers: HashMap<BufferId, wgpu::Buffer>,
}

impl Objects {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct SurfaceState {
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
}

struct AcquiredImage {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    index: u32,
}

/// wgpu device bound to one window surface.
///
/// Implements [`GpuBackend`] and [`Swapchain`] on top of wgpu:
/// - fences are flags set by `Queue::on_submitted_work_done` and waited on by
///   polling the device
/// - command buffers are encoders, finished on end and consumed on submit
/// - wgpu executes submissions in order on one queue, so semaphores only
///   name ordering edges that already hold
///
/// The window size reported by the platform is recorded with
/// [`set_window_size`](Self::set_window_size); the surface itself is only
/// reconfigured by [`reconfigure`](Self::reconfigure), which the runtime
/// wires to the scheduler's resize notification.
pub struct Gpu {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_state: Mutex<SurfaceState>,
    objects: Mutex<Objects>,
    acquired: Mutex<Option<AcquiredImage>>,
    image_count: u32,
    next_image: AtomicU32,
}

impl Gpu {
    /// Creates a GPU context bound to a window.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(window: Arc<Window>, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("failed to create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("inflight-engine device"),
                required_features: init.required_features,
                required_limits: init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps, init.prefer_srgb)
            .context("no supported surface formats")?;
        let alpha_mode = choose_alpha_mode(&caps, init.alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(&device, &config);

        let info = adapter.get_info();
        log::info!(
            "using {} ({:?}), surface {:?} {}x{}",
            info.name,
            info.backend,
            format,
            size.width,
            size.height
        );

        Ok(Self {
            window,
            surface,
            adapter,
            device,
            queue,
            surface_state: Mutex::new(SurfaceState { config, size }),
            objects: Mutex::new(Objects::default()),
            acquired: Mutex::new(None),
            image_count: init.image_count(),
            next_image: AtomicU32::new(0),
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_state.lock().config.format
    }

    /// Last window size reported by the platform (physical pixels).
    pub fn size(&self) -> PhysicalSize<u32> {
        self.surface_state.lock().size
    }

    /// Records the platform-reported window size. Does not touch the surface.
    pub fn set_window_size(&self, size: PhysicalSize<u32>) {
        self.surface_state.lock().size = size;
    }

    /// Reconfigures the surface for `extent`.
    ///
    /// wgpu does not support configuring a surface with a zero-sized extent;
    /// such requests are ignored.
    pub fn reconfigure(&self, extent: Extent) {
        if extent.is_degenerate() {
            return;
        }
        let mut state = self.surface_state.lock();
        state.config.width = extent.width;
        state.config.height = extent.height;
        self.surface.configure(&self.device, &state.config);
        log::debug!("surface reconfigured to {}x{}", extent.width, extent.height);
    }

    /// Runs `f` with the encoder of a recording command buffer and the view of
    /// the currently acquired image, if any.
    ///
    /// `f` must not call back into this `Gpu`'s backend methods.
    pub fn record<R>(
        &self,
        command_buffer: CommandBufferId,
        f: impl FnOnce(&mut wgpu::CommandEncoder, Option<&wgpu::TextureView>) -> R,
    ) -> R {
        let acquired = self.acquired.lock();
        let mut objects = self.objects.lock();
        let Some(slot) = objects.command_buffers.get_mut(&command_buffer) else {
            panic!("recording into unknown {command_buffer:?}");
        };
        let Recording::Open(encoder) = &mut slot.state else {
            panic!("{command_buffer:?} is not recording");
        };
        f(encoder, acquired.as_ref().map(|image| &image.view))
    }

    /// Returns the wgpu buffer behind `buffer`.
    pub fn buffer(&self, buffer: BufferId) -> Option<wgpu::Buffer> {
        self.objects.lock().buffers.get(&buffer).cloned()
    }

    fn poll_wait(&self) -> bool {
        match self.device.poll(wgpu::PollType::wait_indefinitely()) {
            Ok(_) => true,
            Err(err) => {
                log::error!("device poll failed: {err}");
                false
            }
        }
    }
}

impl GpuBackend for Gpu {
    fn create_fence(&self, signaled: bool) -> FenceId {
        let mut objects = self.objects.lock();
        let fence = FenceId::from_raw(objects.next());
        objects.fences.insert(
            fence,
            FenceState {
                signaled: Arc::new(AtomicBool::new(signaled)),
                submitted: false,
            },
        );
        fence
    }

    fn wait_for_fence(&self, fence: FenceId) {
        let (signaled, submitted) = match self.objects.lock().fences.get(&fence) {
            Some(state) => (state.signaled.clone(), state.submitted),
            None => {
                log::error!("waiting on unknown {fence:?}");
                return;
            }
        };

        while !signaled.load(Ordering::Acquire) {
            if !submitted {
                log::error!("waiting on {fence:?}, which no submission will signal");
                return;
            }
            if !self.poll_wait() {
                return;
            }
        }
    }

    fn reset_fence(&self, fence: FenceId) {
        if let Some(state) = self.objects.lock().fences.get_mut(&fence) {
            // Fresh flag so a late callback from an older submission cannot
            // signal the new one.
            state.signaled = Arc::new(AtomicBool::new(false));
            state.submitted = false;
        }
    }

    fn is_fence_signaled(&self, fence: FenceId) -> bool {
        if let Err(err) = self.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {err}");
        }
        self.objects
            .lock()
            .fences
            .get(&fence)
            .is_some_and(|state| state.signaled.load(Ordering::Acquire))
    }

    fn destroy_fence(&self, fence: FenceId) {
        self.objects.lock().fences.remove(&fence);
    }

    fn create_semaphore(&self) -> SemaphoreId {
        let mut objects = self.objects.lock();
        let semaphore = SemaphoreId::from_raw(objects.next());
        objects.semaphores.insert(semaphore);
        semaphore
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreId) {
        self.objects.lock().semaphores.remove(&semaphore);
    }

    fn create_command_pool(&self, queue: QueueType) -> CommandPoolId {
        let mut objects = self.objects.lock();
        let pool = CommandPoolId::from_raw(objects.next());
        objects.pools.insert(pool, queue);
        pool
    }

    fn destroy_command_pool(&self, pool: CommandPoolId) {
        let mut objects = self.objects.lock();
        objects.pools.remove(&pool);
        objects.command_buffers.retain(|_, slot| slot.pool != pool);
    }

    fn allocate_command_buffers(&self, pool: CommandPoolId, count: usize) -> Vec<CommandBufferId> {
        let mut objects = self.objects.lock();
        let Some(&queue) = objects.pools.get(&pool) else {
            panic!("allocating from unknown {pool:?}");
        };
        (0..count)
            .map(|_| {
                let id = CommandBufferId::from_raw(objects.next());
                objects.command_buffers.insert(
                    id,
                    CommandSlot {
                        pool,
                        queue,
                        state: Recording::Idle,
                    },
                );
                id
            })
            .collect()
    }

    fn begin_command_buffer(&self, command_buffer: CommandBufferId) {
        let mut objects = self.objects.lock();
        let Some(slot) = objects.command_buffers.get_mut(&command_buffer) else {
            panic!("beginning unknown {command_buffer:?}");
        };
        let label = match slot.queue {
            QueueType::Graphics => "inflight graphics commands",
            QueueType::Compute => "inflight compute commands",
        };
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        slot.state = Recording::Open(encoder);
    }

    fn end_command_buffer(&self, command_buffer: CommandBufferId) {
        let mut objects = self.objects.lock();
        let Some(slot) = objects.command_buffers.get_mut(&command_buffer) else {
            panic!("ending unknown {command_buffer:?}");
        };
        slot.state = match std::mem::replace(&mut slot.state, Recording::Idle) {
            Recording::Open(encoder) => Recording::Finished(encoder.finish()),
            _ => panic!("{command_buffer:?} is not recording"),
        };
    }

    fn submit(&self, queue: QueueType, submission: &Submission) {
        let mut objects = self.objects.lock();

        let mut finished = Vec::with_capacity(submission.command_buffers.len());
        for id in &submission.command_buffers {
            let Some(slot) = objects.command_buffers.get_mut(id) else {
                log::error!("submitting unknown {id:?}");
                continue;
            };
            match std::mem::replace(&mut slot.state, Recording::Idle) {
                Recording::Finished(buffer) => finished.push(buffer),
                other => {
                    slot.state = other;
                    log::error!("{id:?} submitted without being ended; skipped");
                }
            }
        }

        log::trace!("submitting {} command buffer(s) to {queue:?}", finished.len());
        self.queue.submit(finished);

        if let Some(fence) = submission.fence {
            if let Some(state) = objects.fences.get_mut(&fence) {
                state.submitted = true;
                let signaled = state.signaled.clone();
                self.queue
                    .on_submitted_work_done(move || signaled.store(true, Ordering::Release));
            }
        }
    }

    fn wait_idle(&self) {
        self.poll_wait();
    }

    fn create_buffer(&self, size: u64, memory: MemoryKind) -> BufferId {
        let (label, usage) = match memory {
            MemoryKind::HostVisible => (
                "inflight host-visible buffer",
                wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::UNIFORM,
            ),
            MemoryKind::DeviceLocal => (
                "inflight device-local buffer",
                wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::UNIFORM
                    | wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::INDEX,
            ),
        };
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.max(1).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT),
            usage,
            mapped_at_creation: false,
        });

        let mut objects = self.objects.lock();
        let id = BufferId::from_raw(objects.next());
        objects.buffers.insert(id, buffer);
        id
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        if let Some(buffer) = self.objects.lock().buffers.remove(&buffer) {
            buffer.destroy();
        }
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) {
        let objects = self.objects.lock();
        let Some(target) = objects.buffers.get(&buffer) else {
            log::error!("writing unknown {buffer:?}");
            return;
        };
        // Buffer sizes are rounded up to the copy alignment, so padding fits.
        let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
        if data.len() % align == 0 {
            self.queue.write_buffer(target, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(data.len().next_multiple_of(align), 0);
            self.queue.write_buffer(target, offset, &padded);
        }
    }

    fn copy_buffer(&self, command_buffer: CommandBufferId, src: BufferId, dst: BufferId, size: u64) {
        let mut guard = self.objects.lock();
        let objects = &mut *guard;
        let (Some(src_buffer), Some(dst_buffer)) = (objects.buffers.get(&src), objects.buffers.get(&dst)) else {
            log::error!("copy between unknown buffers {src:?} -> {dst:?}");
            return;
        };
        let Some(CommandSlot {
            state: Recording::Open(encoder),
            ..
        }) = objects.command_buffers.get_mut(&command_buffer)
        else {
            panic!("{command_buffer:?} is not recording");
        };
        let size = size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
        encoder.copy_buffer_to_buffer(src_buffer, 0, dst_buffer, 0, size);
    }
}

impl Swapchain for Gpu {
    fn acquire_next_image(&self, _image_available: SemaphoreId) -> AcquireOutcome {
        let mut acquired = self.acquired.lock();
        if acquired.take().is_some() {
            log::warn!("previous surface image was never presented; dropping it");
        }

        match self.surface.get_current_texture() {
            Ok(texture) if texture.suboptimal => AcquireOutcome::Suboptimal,
            Ok(texture) => {
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                // wgpu hides the real image index; a rotating counter stands in.
                let index = self.next_image.fetch_add(1, Ordering::Relaxed) % self.image_count;
                *acquired = Some(AcquiredImage {
                    texture,
                    view,
                    index,
                });
                AcquireOutcome::Acquired { image_index: index }
            }
            Err(err) => {
                log::debug!("surface acquire failed: {err}");
                map_surface_error(err)
            }
        }
    }

    fn present(&self, image_index: u32) -> PresentOutcome {
        let Some(image) = self.acquired.lock().take() else {
            return PresentOutcome::Failed("no acquired image to present".to_string());
        };
        if image.index != image_index {
            return PresentOutcome::Failed(format!(
                "presenting image {image_index}, but image {} is acquired",
                image.index
            ));
        }

        self.window.pre_present_notify();
        drop(image.view);
        image.texture.present();
        PresentOutcome::Presented
    }

    fn current_extent(&self) -> Extent {
        let size = self.surface_state.lock().size;
        Extent::new(size.width, size.height)
    }

    fn image_count(&self) -> u32 {
        self.image_count
    }
}
