//! The viewer application.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec3;
use tracing::{error, info, warn};
use umbra_app::{AppContext, FrameContext, UmbraApp};
use umbra_render::{
    save_screenshot, Camera, DeferredRenderer, FrameOutput, RendererConfig, Scene,
    ScreenshotConfig,
};
use umbra_shaders::ShaderLibrary;
use winit::window::{CursorGrabMode, Window};

use crate::controller::CameraController;
use crate::options::ViewerOptions;

const CAMERA_START: Vec3 = Vec3::new(0.0, 0.0, 3.0);

pub struct Viewer {
    renderer: DeferredRenderer,
    camera: Camera,
    controller: Rc<RefCell<CameraController>>,
    screenshots: ScreenshotConfig,
    should_exit: bool,
}

impl UmbraApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let options = ViewerOptions::from_env()?;
        if options.screenshot.enabled {
            info!(
                "Screenshot capture enabled: {:?} frames, output pattern: {}",
                options.screenshot.frames, options.screenshot.output_pattern
            );
        }

        let assets = options.asset_paths();
        let shaders = shader_library(&assets);
        let config = RendererConfig::default()
            .with_assets(assets)
            .with_shaders(shaders);
        let renderer = DeferredRenderer::new(&ctx.gpu, ctx.extent(), config, Scene::demo())?;

        let controller = Rc::new(RefCell::new(CameraController::default()));
        ctx.events.attach(&controller);
        grab_cursor(&ctx.window);

        Ok(Self {
            renderer,
            camera: Camera::new(CAMERA_START, ctx.aspect_ratio()),
            controller,
            screenshots: options.screenshot,
            should_exit: false,
        })
    }

    fn update(&mut self, _ctx: &AppContext, dt: f32) {
        let mut controller = self.controller.borrow_mut();
        controller.update(&mut self.camera, dt);
        if controller.exit_requested() {
            self.should_exit = true;
        }
        self.renderer.update(f64::from(dt));
    }

    fn render(&mut self, _ctx: &AppContext, frame: &mut FrameContext<'_>) -> anyhow::Result<()> {
        self.renderer.write_lights(frame.slot)?;
        self.renderer.record_frame(
            &mut frame.recorder,
            frame.slot,
            &self.camera,
            Some(FrameOutput::present(&mut frame.swapchain_image)),
        )?;
        Ok(())
    }

    fn after_frame(&mut self, ctx: &AppContext, frame_number: u64) -> anyhow::Result<()> {
        if self.screenshots.should_capture(frame_number) {
            self.capture_screenshot(ctx, frame_number)?;
        }
        if self.screenshots.exit_after_capture && self.screenshots.all_captured(frame_number + 1) {
            info!("All screenshots captured, requesting exit...");
            self.should_exit = true;
        }
        Ok(())
    }

    fn on_resize(&mut self, _ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        self.camera.set_aspect(width as f32 / height as f32);
        Ok(())
    }

    fn should_exit(&self) -> bool {
        self.should_exit
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        if let Err(e) = self.renderer.destroy(&ctx.gpu) {
            error!("Failed to destroy renderer: {e}");
        }
    }
}

impl Viewer {
    fn capture_screenshot(&self, ctx: &AppContext, frame_number: u64) -> anyhow::Result<()> {
        ctx.gpu.wait_idle()?;

        let extent = self.renderer.draw_extent();
        match self.renderer.capture(&ctx.gpu) {
            Ok(data) => {
                let path = self.screenshots.output_path(frame_number);
                if let Err(e) = save_screenshot(data, extent.width, extent.height, &path) {
                    error!("Failed to save screenshot: {e}");
                }
            }
            Err(e) => error!("Failed to read back frame {frame_number}: {e}"),
        }
        Ok(())
    }
}

#[cfg(feature = "embedded-shaders")]
fn shader_library(_assets: &umbra_core::AssetPaths) -> ShaderLibrary {
    ShaderLibrary::embedded()
}

#[cfg(not(feature = "embedded-shaders"))]
fn shader_library(assets: &umbra_core::AssetPaths) -> ShaderLibrary {
    ShaderLibrary::from_assets(assets)
}

/// Hide the cursor and lock it to the window, falling back to confining it.
fn grab_cursor(window: &Window) {
    if window.set_cursor_grab(CursorGrabMode::Locked).is_err() {
        if let Err(e) = window.set_cursor_grab(CursorGrabMode::Confined) {
            warn!("Failed to grab cursor: {e}");
        }
    }
    window.set_cursor_visible(false);
}
