use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

use inflight_engine::buffer::{BufferGroup, BufferTracker, HostVisibleBufferTracker};
use inflight_engine::core::{App, AppControl, FrameCtx};
use inflight_engine::device::{GpuInit, MemoryKind};
use inflight_engine::logging::{init_logging, LoggingConfig};
use inflight_engine::tasks::DeferredTask;
use inflight_engine::window::{Runtime, RuntimeConfig};

/// Per-frame constants, replicated once per frame slot.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct FrameUniforms {
    time:   f32,
    frame:  u32,
    width:  u32,
    height: u32,
}

// Frames between rebuilding the uniform buffers, which exercises deferred
// destruction of the old set.
const REBUILD_EVERY: u64 = 600;
const REPORT_EVERY: u64 = 240;

#[derive(Default)]
struct Studio {
    uniforms: Option<HostVisibleBufferTracker>,
}

impl Studio {
    fn rebuild_uniforms(&mut self, ctx: &FrameCtx<'_>) {
        let group = BufferGroup::per_frame(
            ctx.gpu_ctx(),
            std::mem::size_of::<FrameUniforms>() as u64,
            MemoryKind::HostVisible,
        );
        let tracker = HostVisibleBufferTracker::with_data(
            Arc::new(group),
            bytemuck::bytes_of(&FrameUniforms::zeroed()),
        );
        if self.uniforms.replace(tracker).is_some() {
            log::info!("uniform buffers rebuilt; old set released after the frames in flight");
        }
    }
}

impl App for Studio {
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_>) -> AppControl {
        if self.uniforms.is_none() || ctx.frame_number % REBUILD_EVERY == REBUILD_EVERY - 1 {
            self.rebuild_uniforms(ctx);
        }

        if ctx.frame_number % REPORT_EVERY == 0 {
            let frame = ctx.frame_number;
            let delay = ctx.gpu_ctx().release_delay();
            ctx.scheduler.add_deferred_task(DeferredTask::after(delay, move |task| {
                log::info!(
                    "frame {frame} retired (slot {:?}, image {:?})",
                    task.frame_index(),
                    task.image_index()
                );
            }));
        }

        let time = ctx.frame_number as f32 / 60.0;
        let extent = ctx.scheduler.extent();
        let Some(uniforms) = self.uniforms.as_mut() else {
            return AppControl::Continue;
        };
        uniforms.set_data(bytemuck::bytes_of(&FrameUniforms {
            time,
            frame: ctx.frame_number as u32,
            width: extent.width,
            height: extent.height,
        }));

        let clear = wgpu::Color {
            r: 0.08 + 0.06 * (time * 0.7).sin() as f64,
            g: 0.10 + 0.05 * (time * 0.5).cos() as f64,
            b: 0.16,
            a: 1.0,
        };

        ctx.render(clear, |target| {
            target.update_tracker(uniforms);
        })
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    Runtime::run(
        RuntimeConfig {
            title: "inflight studio".to_string(),
            ..RuntimeConfig::default()
        },
        GpuInit::default(),
        Studio::default(),
    )
}
