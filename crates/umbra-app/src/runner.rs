//! Application runner and event loop.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use umbra_gpu::{GpuContextBuilder, VulkanRecorder};
use umbra_input::InputEvent;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::app::UmbraApp;
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::frame::{FrameContext, FrameStats};

/// Install the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. Does nothing if a
/// subscriber is already installed.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Run an application until its window closes or it asks to exit.
///
/// Initialization failures and fatal frame errors are returned once the
/// event loop has shut down.
pub fn run_app<A: UmbraApp + 'static>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();
    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = AppRunner::<A> {
        config,
        state: None,
        failure: None,
    };
    event_loop.run_app(&mut runner)?;

    runner.failure.map_or(Ok(()), Err)
}

struct AppRunner<A: UmbraApp> {
    config: AppConfig,
    state: Option<AppState<A>>,
    failure: Option<anyhow::Error>,
}

struct AppState<A: UmbraApp> {
    // Declared first so the app's own fields drop before the context.
    app: A,
    ctx: AppContext,
    frame_budget: Option<Duration>,
    last_frame_time: Instant,
    stats: FrameStats,
}

impl<A: UmbraApp + 'static> ApplicationHandler for AppRunner<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        info!("Creating application state...");
        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Application ready");
            }
            Err(e) => {
                error!("Failed to initialize application: {e:#}");
                self.failure = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = &mut self.state else {
            return;
        };
        if state.app.on_window_event(&event) {
            return;
        }
        if let Some(input) = InputEvent::from_window_event(&event) {
            state.ctx.events.dispatch(&input);
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                self.shutdown(event_loop);
            }
            WindowEvent::RedrawRequested => {
                let size = state.ctx.window.inner_size();
                if size.width == 0 || size.height == 0 {
                    return;
                }
                if let Err(e) = state.render_frame() {
                    error!("Frame failed: {e:#}");
                    self.failure = Some(e);
                    self.shutdown(event_loop);
                }
            }
            WindowEvent::Resized(size) => {
                if let Err(e) = state.handle_resize(size.width, size.height) {
                    error!("Resize failed: {e:#}");
                    self.failure = Some(e);
                    self.shutdown(event_loop);
                }
            }
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let (Some(state), Some(input)) = (&mut self.state, InputEvent::from_device_event(&event))
        {
            state.ctx.events.dispatch(&input);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        match &self.state {
            Some(state) if state.app.should_exit() => {
                info!("Application requested exit");
                self.shutdown(event_loop);
            }
            Some(state) => state.ctx.window.request_redraw(),
            None => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
    }
}

impl<A: UmbraApp + 'static> AppRunner<A> {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState<A>> {
        let attributes = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let gpu = GpuContextBuilder::new()
            .app_name(&self.config.title)
            .validation(self.config.validation)
            .build()?;
        info!("GPU: {}", gpu.capabilities().summary());

        let mut ctx = unsafe { AppContext::new(window, gpu, self.config.vsync)? };

        let app = match A::init(&mut ctx) {
            Ok(app) => app,
            Err(e) => {
                unsafe {
                    let _ = ctx.gpu.wait_idle();
                    ctx.destroy();
                }
                return Err(e);
            }
        };

        Ok(AppState {
            app,
            ctx,
            frame_budget: self.config.frame_budget(),
            last_frame_time: Instant::now(),
            stats: FrameStats::default(),
        })
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            state.cleanup();
        }
        event_loop.exit();
    }
}

impl<A: UmbraApp> AppState<A> {
    fn render_frame(&mut self) -> anyhow::Result<()> {
        let frame_start = Instant::now();
        let elapsed = frame_start.duration_since(self.last_frame_time);
        self.last_frame_time = frame_start;
        self.stats.record(elapsed);
        let dt = elapsed.as_secs_f32();

        self.app.update(&self.ctx, dt);

        if self.draw(dt)? {
            let size = self.ctx.window.inner_size();
            self.handle_resize(size.width, size.height)?;
        }

        if let Some(budget) = self.frame_budget {
            let spent = frame_start.elapsed();
            if spent < budget {
                thread::sleep(budget - spent);
            }
        }
        Ok(())
    }

    /// Run one pass of the frame protocol. Returns `true` when the swapchain
    /// no longer matches the surface and must be recreated.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn draw(&mut self, dt: f32) -> anyhow::Result<bool> {
        let device = self.ctx.gpu.device();
        let queue = self.ctx.gpu.graphics_queue();

        unsafe { self.ctx.frames.wait(device)? };

        let acquired = unsafe {
            self.ctx
                .frames
                .acquire(&self.ctx.surface.swapchain_loader, &self.ctx.swapchain)
        };
        let (image_index, suboptimal) = match acquired {
            Ok(acquired) => acquired,
            Err(e) if e.is_out_of_date() => {
                tracing::debug!("Swapchain out of date, skipping frame");
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        };

        let slot = self.ctx.frames.current_index();
        let frame_number = self.ctx.frames.frame_number();
        let swapchain_image = self.ctx.swapchain.image(image_index)?;
        let cmd = unsafe { self.ctx.frames.begin(device)? };

        {
            let mut frame = FrameContext {
                recorder: unsafe { VulkanRecorder::new(device, cmd) },
                slot,
                image_index,
                swapchain_image,
                dt,
                frame_number,
            };
            self.app.render(&self.ctx, &mut frame)?;
        }

        unsafe { self.ctx.frames.submit(device, queue)? };
        let stale = unsafe {
            self.ctx.frames.present(
                &self.ctx.surface.swapchain_loader,
                &self.ctx.swapchain,
                queue,
                image_index,
            )?
        };
        self.ctx.frames.advance()?;

        self.app.after_frame(&self.ctx, frame_number)?;
        Ok(stale || suboptimal)
    }

    fn handle_resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }

        self.ctx.gpu.wait_idle()?;
        unsafe { self.ctx.recreate_swapchain(width, height)? };
        self.app.on_resize(&mut self.ctx, width, height)?;

        info!("Resized to {}x{}", width, height);
        Ok(())
    }

    fn cleanup(&mut self) {
        self.stats.log();

        info!("Starting cleanup...");
        if let Err(e) = self.ctx.gpu.wait_idle() {
            error!("Failed to wait idle: {e}");
        }
        self.app.cleanup(&mut self.ctx);
        unsafe { self.ctx.destroy() };
        info!("Cleanup complete");
    }
}
