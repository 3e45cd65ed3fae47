use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;

use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::core::{App as CoreApp, AppControl, FrameCtx, WindowCtx};
use crate::device::{GpuBackend, Gpu, GpuInit};
use crate::frame::{FrameScheduler, ResizeStage};

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "inflight".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
        }
    }
}

/// Runtime context passed to the application.
///
/// Commands are buffered and applied after the current callback returns.
#[derive(Default)]
pub struct RuntimeCtx {
    commands: Vec<Command>,
}

impl RuntimeCtx {
    pub fn create_window(&mut self, config: RuntimeConfig) {
        self.commands.push(Command::CreateWindow(config));
    }

    pub fn close_window(&mut self, id: WindowId) {
        self.commands.push(Command::CloseWindow(id));
    }

    pub fn exit(&mut self) {
        self.commands.push(Command::Exit);
    }
}

enum Command {
    CreateWindow(RuntimeConfig),
    CloseWindow(WindowId),
    Exit,
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    pub fn run<A>(initial: RuntimeConfig, gpu_init: GpuInit, app: A) -> Result<()>
    where
        A: 'static + CoreApp,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState::new(initial, gpu_init, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        Ok(())
    }
}

struct WindowEntry {
    // Declared first so it is torn down while the device is still alive.
    scheduler: FrameScheduler,
    gpu: Arc<Gpu>,
    window: Arc<Window>,
    occluded: bool,
    zero_sized: bool,
    frame_number: u64,
}

impl WindowEntry {
    fn new(window: Arc<Window>, gpu_init: GpuInit) -> Result<Self> {
        let gpu = Arc::new(
            pollster::block_on(Gpu::new(window.clone(), gpu_init))
                .context("GPU initialization failed for window")?,
        );

        let backend: Arc<dyn GpuBackend> = gpu.clone();
        let scheduler = FrameScheduler::for_swapchain(backend, &*gpu);

        // The surface is the first resource to rebuild on a resize.
        let weak = Arc::downgrade(&gpu);
        scheduler
            .resize_registry()
            .subscribe(ResizeStage::Resources, move |extent| {
                if let Some(gpu) = weak.upgrade() {
                    gpu.reconfigure(extent);
                }
            });

        log::info!(
            "window {:?}: {} frame(s) in flight",
            window.id(),
            scheduler.frames_in_flight()
        );

        Ok(Self {
            scheduler,
            gpu,
            window,
            occluded: false,
            zero_sized: false,
            frame_number: 0,
        })
    }

    fn on_resized(&mut self, size: PhysicalSize<u32>) {
        self.gpu.set_window_size(size);
        self.zero_sized = size.width == 0 || size.height == 0;
        self.scheduler.notify_resized();
        self.refresh_visibility();
    }

    fn set_occluded(&mut self, occluded: bool) {
        self.occluded = occluded;
        self.refresh_visibility();
    }

    fn refresh_visibility(&mut self) {
        self.scheduler
            .set_window_visible(!self.occluded && !self.zero_sized);
    }
}

struct AppState<A>
where
    A: CoreApp + 'static,
{
    initial: RuntimeConfig,
    gpu_init: GpuInit,
    app: A,

    windows: HashMap<WindowId, WindowEntry>,
    exit_requested: bool,
}

impl<A> AppState<A>
where
    A: CoreApp + 'static,
{
    fn new(initial: RuntimeConfig, gpu_init: GpuInit, app: A) -> Self {
        Self {
            initial,
            gpu_init,
            app,
            windows: HashMap::new(),
            exit_requested: false,
        }
    }

    fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    fn create_window_entry(
        &mut self,
        event_loop: &ActiveEventLoop,
        config: RuntimeConfig,
    ) -> Result<WindowId> {
        let attrs = Window::default_attributes()
            .with_title(config.title)
            .with_inner_size(config.initial_size);

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let id = window.id();
        let entry = WindowEntry::new(window, self.gpu_init.clone())?;

        self.windows.insert(id, entry);
        Ok(id)
    }

    fn destroy_window_entry(&mut self, id: WindowId) {
        if self.windows.remove(&id).is_some() {
            log::debug!("window {id:?} closed");
        }
    }

    fn apply_commands(&mut self, event_loop: &ActiveEventLoop, mut ctx: RuntimeCtx) {
        for cmd in ctx.commands.drain(..) {
            match cmd {
                Command::CreateWindow(cfg) => {
                    if let Err(e) = self.create_window_entry(event_loop, cfg) {
                        log::error!("failed to create window: {e:#}");
                        self.request_exit();
                    }
                }
                Command::CloseWindow(id) => self.destroy_window_entry(id),
                Command::Exit => self.request_exit(),
            }
        }

        if self.windows.is_empty() {
            self.request_exit();
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }
}

impl<A> ApplicationHandler for AppState<A>
where
    A: CoreApp + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if !self.windows.is_empty() {
            return;
        }

        if let Err(e) = self.create_window_entry(event_loop, self.initial.clone()) {
            log::error!("failed to create initial window: {e:#}");
            self.request_exit();
            event_loop.exit();
            return;
        }

        for entry in self.windows.values() {
            entry.window.request_redraw();
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        event_loop.set_control_flow(ControlFlow::Wait);

        // Continuous redraw: every loop iteration drives one frame per window.
        for entry in self.windows.values() {
            entry.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        if !self.windows.contains_key(&window_id) {
            return;
        }

        if self.app.on_window_event(window_id, &event) == AppControl::Exit {
            self.request_exit();
            event_loop.exit();
            return;
        }

        // Runtime-managed window lifecycle / resize / redraw handling.
        match &event {
            WindowEvent::CloseRequested => {
                self.destroy_window_entry(window_id);
                if self.windows.is_empty() {
                    self.request_exit();
                    event_loop.exit();
                }
            }

            WindowEvent::Resized(new_size) => {
                if let Some(entry) = self.windows.get_mut(&window_id) {
                    entry.on_resized(*new_size);
                    entry.window.request_redraw();
                }
            }

            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(entry) = self.windows.get_mut(&window_id) {
                    let new_size = entry.window.inner_size();
                    entry.on_resized(new_size);
                    entry.window.request_redraw();
                }
            }

            WindowEvent::Occluded(occluded) => {
                if let Some(entry) = self.windows.get_mut(&window_id) {
                    entry.set_occluded(*occluded);
                }
            }

            WindowEvent::RedrawRequested => {
                let mut runtime_ctx = RuntimeCtx::default();
                let mut app_control = AppControl::Continue;

                // Drive one frame for this window.
                if let Some(entry) = self.windows.get_mut(&window_id) {
                    entry.scheduler.update(&*entry.gpu);

                    let mut ctx = FrameCtx {
                        window: WindowCtx {
                            id: window_id,
                            window: &entry.window,
                        },
                        gpu: &entry.gpu,
                        scheduler: &mut entry.scheduler,
                        frame_number: entry.frame_number,
                        runtime: &mut runtime_ctx,
                    };

                    app_control = self.app.on_frame(&mut ctx);
                    entry.frame_number += 1;
                }

                if app_control == AppControl::Exit {
                    runtime_ctx.exit();
                }

                self.apply_commands(event_loop, runtime_ctx);
            }

            _ => {}
        }

        if self.exit_requested {
            event_loop.exit();
        }
    }
}
