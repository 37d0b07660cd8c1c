//! Headless rendering of the deferred pipeline.
//!
//! Frames are recorded with an immediate submission instead of the frame
//! slot protocol; there is no swapchain, so the draw image is read back
//! directly.

use std::path::Path;

use ash::vk;
use glam::Vec3;
use image::RgbaImage;
use umbra_core::assets::ASSET_DIR_ENV;
use umbra_core::AssetPaths;
use umbra_gpu::{GpuContext, GpuContextBuilder};
use umbra_render::{Camera, DeferredRenderer, RendererConfig, Scene};
use umbra_shaders::ShaderLibrary;

use crate::{Result, TestError};

/// Resource root for tests: `UMBRA_ASSET_DIR`, or `res/` at the workspace root.
pub fn test_assets() -> AssetPaths {
    if std::env::var_os(ASSET_DIR_ENV).is_some_and(|root| !root.is_empty()) {
        AssetPaths::from_env()
    } else {
        AssetPaths::from_root(Path::new(env!("CARGO_MANIFEST_DIR")).join("../../res"))
    }
}

#[cfg(feature = "embedded-shaders")]
fn test_shaders(_assets: &AssetPaths) -> ShaderLibrary {
    ShaderLibrary::embedded()
}

#[cfg(not(feature = "embedded-shaders"))]
fn test_shaders(assets: &AssetPaths) -> ShaderLibrary {
    ShaderLibrary::from_assets(assets)
}

/// Camera three units in front of the origin, looking at it.
pub fn camera_facing_origin(aspect: f32) -> Camera {
    Camera::new(Vec3::new(0.0, 0.0, 3.0), aspect)
}

/// A deferred renderer on a GPU context without a surface.
pub struct HeadlessRenderer {
    renderer: DeferredRenderer,
    context: GpuContext,
    width: u32,
    height: u32,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32, scene: Scene) -> Result<Self> {
        let context = GpuContextBuilder::new()
            .app_name("umbra-test")
            .validation(true)
            .headless(true)
            .build()?;

        let assets = test_assets();
        let shaders = test_shaders(&assets);
        let config = RendererConfig::default()
            .with_assets(assets)
            .with_shaders(shaders);
        let renderer =
            DeferredRenderer::new(&context, vk::Extent2D { width, height }, config, scene)?;

        Ok(Self {
            renderer,
            context,
            width,
            height,
        })
    }

    pub const fn context(&self) -> &GpuContext {
        &self.context
    }

    pub const fn renderer(&self) -> &DeferredRenderer {
        &self.renderer
    }

    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Write the lights at `time_ms` into slot 0 and render through it.
    pub fn render(&mut self, camera: &Camera, time_ms: f64) -> Result<RgbaImage> {
        self.renderer.set_clock_ms(time_ms);
        self.renderer.write_lights(0)?;
        self.render_slot(0, camera)
    }

    /// Render one frame with `slot`'s descriptor sets, leaving its light
    /// buffer as it is, and read the result back.
    pub fn render_slot(&mut self, slot: usize, camera: &Camera) -> Result<RgbaImage> {
        let renderer = &mut self.renderer;
        let mut recorded = Ok(());
        self.context.immediate_submit(|rec| {
            recorded = renderer.record_frame(rec, slot, camera, None);
        })?;
        recorded?;

        let data = self.renderer.capture(&self.context)?;
        RgbaImage::from_raw(self.width, self.height, data).ok_or_else(|| {
            TestError::ImageComparison(format!(
                "Readback does not fill a {}x{} image",
                self.width, self.height
            ))
        })
    }
}

impl Drop for HeadlessRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            tracing::error!("Failed to wait idle: {e}");
        }
        if let Err(e) = self.renderer.destroy(&self.context) {
            tracing::error!("Failed to destroy renderer: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;
    use gpu_allocator::MemoryLocation;
    use umbra_gpu::GpuError;
    use umbra_render::LightBlock;

    const CLEAR: [u8; 4] = [51, 51, 51, 255];

    fn centre(image: &RgbaImage) -> [u8; 4] {
        image.get_pixel(image.width() / 2, image.height() / 2).0
    }

    #[test]
    fn assets_resolve_to_workspace_res() {
        if std::env::var_os(ASSET_DIR_ENV).is_some() {
            return;
        }
        let assets = test_assets();
        assert!(assets.shader_dir.ends_with("res/shaders"));
        assert!(assets.texture_dir.ends_with("res/textures"));
    }

    #[test]
    fn test_camera_faces_origin() {
        let camera = camera_facing_origin(1.0);
        let to_origin = (Vec3::ZERO - camera.position).normalize();
        assert!(camera.front().abs_diff_eq(to_origin, 1e-5));
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn headless_renderer_creation() {
        let headless = HeadlessRenderer::new(128, 128, Scene::single_cube()).unwrap();
        assert_eq!(headless.dimensions(), (128, 128));
        assert_eq!(headless.renderer().slot_count(), 2);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn failed_renderer_creation_releases_everything() {
        let context = GpuContextBuilder::new()
            .app_name("umbra-test")
            .headless(true)
            .build()
            .unwrap();
        let baseline = context.allocator().lock().live_allocations();

        // Shaders are read only once targets, textures and buffers exist.
        let config = RendererConfig::default()
            .with_assets(test_assets())
            .with_shaders(ShaderLibrary::from_dir("no/shaders/here"));
        let extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        let err = DeferredRenderer::new(&context, extent, config, Scene::demo())
            .err()
            .unwrap();

        assert!(matches!(err, GpuError::Asset(ref e) if e.is_missing()));
        assert_eq!(context.allocator().lock().live_allocations(), baseline);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn staged_upload_reads_back_identical() {
        let context = GpuContextBuilder::new()
            .app_name("umbra-test")
            .headless(true)
            .build()
            .unwrap();
        let data: Vec<u32> = (0..1000).map(|i| i * 7 + 3).collect();
        let size = std::mem::size_of_val(data.as_slice()) as u64;

        let mut device_local = context
            .allocator()
            .lock()
            .create_buffer(
                size,
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC,
                MemoryLocation::GpuOnly,
                "round trip",
            )
            .unwrap();
        let mut readback = context
            .allocator()
            .lock()
            .create_buffer(
                size,
                vk::BufferUsageFlags::TRANSFER_DST,
                MemoryLocation::GpuToCpu,
                "round trip readback",
            )
            .unwrap();

        device_local.upload(&context, &data).unwrap();
        readback.copy_from(&context, &device_local, size).unwrap();
        assert_eq!(readback.read::<u32>(data.len()).unwrap(), data);

        let mut allocator = context.allocator().lock();
        allocator.free_buffer(&mut readback).unwrap();
        allocator.free_buffer(&mut device_local).unwrap();
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn single_cube_is_visible() {
        let mut headless = HeadlessRenderer::new(256, 256, Scene::single_cube()).unwrap();
        let image = headless.render(&camera_facing_origin(1.0), 0.0).unwrap();

        assert_eq!(image.dimensions(), (256, 256));
        assert_eq!(image.get_pixel(0, 0).0, CLEAR);
        assert_ne!(centre(&image), CLEAR);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn light_buffers_are_per_slot() {
        let mut headless = HeadlessRenderer::new(64, 64, Scene::single_cube()).unwrap();
        let camera = camera_facing_origin(1.0);

        let sets = [0, 1].map(|slot| headless.renderer().frame_sets(slot).unwrap());
        assert_ne!(sets[0].light, sets[1].light);

        // Slot 0 gets the scene's lights, slot 1 an empty block.
        headless.renderer.write_lights(0).unwrap();
        let dark = LightBlock::zeroed();
        headless
            .renderer()
            .light_buffer(1)
            .unwrap()
            .write(std::slice::from_ref(&dark))
            .unwrap();

        let lit = headless.render_slot(0, &camera).unwrap();
        let unlit = headless.render_slot(1, &camera).unwrap();
        assert_ne!(centre(&lit), centre(&unlit));

        // Writing slot 1 again leaves slot 0's contents alone.
        let before = headless.renderer().light_buffer(0).unwrap().read_bytes().unwrap();
        headless
            .renderer()
            .light_buffer(1)
            .unwrap()
            .write_bytes(0, &[0xAB; 64])
            .unwrap();
        let after = headless.renderer().light_buffer(0).unwrap().read_bytes().unwrap();
        assert_eq!(before, after);
        assert_eq!(headless.render_slot(0, &camera).unwrap(), lit);
    }
}
