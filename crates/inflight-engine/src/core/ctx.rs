use winit::window::{Window, WindowId};

use crate::buffer::BufferTracker;
use crate::device::{CommandBufferId, Gpu, GpuCtx, QueueType};
use crate::frame::{FrameAcquire, FrameScheduler, RecordState};
use crate::window::RuntimeCtx;

use super::app::AppControl;

/// Per-window handles and immutable window metadata.
pub struct WindowCtx<'a> {
    pub id:     WindowId,
    pub window: &'a Window,
}

impl<'a> WindowCtx<'a> {
    /// Returns the logical window size as `(width, height)` in logical pixels.
    pub fn logical_size(&self) -> (f32, f32) {
        let phys  = self.window.inner_size();
        let scale = self.window.scale_factor();
        let logi: winit::dpi::LogicalSize<f64> = phys.to_logical(scale);
        (logi.width as f32, logi.height as f32)
    }
}

/// Per-frame context passed to `core::App::on_frame`.
pub struct FrameCtx<'a> {
    pub window:       WindowCtx<'a>,
    pub gpu:          &'a Gpu,
    pub scheduler:    &'a mut FrameScheduler,
    /// Loop iterations completed for this window.
    pub frame_number: u64,
    pub runtime:      &'a mut RuntimeCtx,
}

impl<'a> FrameCtx<'a> {
    /// Shared device services, for creating buffer groups and deferring work.
    pub fn gpu_ctx(&self) -> &GpuCtx {
        self.scheduler.ctx()
    }

    /// Runs one complete frame: acquires an image, clears it with `clear`,
    /// calls `draw` with the open graphics command buffer, then submits and
    /// presents.
    ///
    /// Returns [`AppControl::Exit`] on unrecoverable device errors. Frames the
    /// scheduler skips (hidden window, pending resize, acquire timeout) are
    /// not an error.
    pub fn render<F>(&mut self, clear: wgpu::Color, draw: F) -> AppControl
    where
        F: FnOnce(&mut RenderTarget<'_>),
    {
        let mut record = match self.scheduler.acquire_frame(self.gpu) {
            Ok(FrameAcquire::Ready(record)) => record,
            Ok(FrameAcquire::Skipped(reason)) => {
                log::trace!("frame {} skipped: {reason:?}", self.frame_number);
                return AppControl::Continue;
            }
            Err(err) => {
                log::error!("{err}");
                return AppControl::Exit;
            }
        };

        let command_buffer = self
            .scheduler
            .begin_command_buffer(&mut record, QueueType::Graphics);

        {
            let mut target = RenderTarget {
                gpu: self.gpu,
                record: &record,
                command_buffer,
            };
            target.encode(|encoder, view| {
                let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("inflight clear"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load:  wgpu::LoadOp::Clear(clear),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes:         None,
                    occlusion_query_set:      None,
                    multiview_mask:           None,
                });
            });
            draw(&mut target);
        }

        self.scheduler.end_command_buffer(&mut record);
        self.scheduler.submit_queues(&mut record);

        match self.scheduler.present(record, self.gpu) {
            Ok(()) => AppControl::Continue,
            Err(err) => {
                log::error!("{err}");
                AppControl::Exit
            }
        }
    }
}

/// The graphics command buffer of the frame being rendered.
pub struct RenderTarget<'a> {
    gpu:            &'a Gpu,
    record:         &'a RecordState,
    command_buffer: CommandBufferId,
}

impl<'a> RenderTarget<'a> {
    #[inline]
    pub fn record(&self) -> &RecordState {
        self.record
    }

    #[inline]
    pub fn frame_index(&self) -> usize {
        self.record.frame_index()
    }

    #[inline]
    pub fn command_buffer(&self) -> CommandBufferId {
        self.command_buffer
    }

    /// Brings the tracker's replica for this frame up to date.
    pub fn update_tracker(&mut self, tracker: &mut dyn BufferTracker) {
        tracker.update(self.record);
    }

    /// Records wgpu commands targeting the acquired image.
    ///
    /// `f` must not touch buffer trackers or other backend calls; use
    /// [`update_tracker`](Self::update_tracker) before or after.
    pub fn encode<F>(&mut self, f: F)
    where
        F: FnOnce(&mut wgpu::CommandEncoder, &wgpu::TextureView),
    {
        self.gpu.record(self.command_buffer, |encoder, view| match view {
            Some(view) => f(encoder, view),
            None => log::warn!("no acquired image to render into"),
        });
    }
}
