//! Application context.

use std::sync::Arc;

use ash::vk;
use umbra_core::constants::FRAMES_IN_FLIGHT;
use umbra_gpu::{FrameSlots, GpuContext, Result, SurfaceContext, Swapchain};
use umbra_input::EventDispatcher;
use winit::window::Window;

/// Everything the runner owns on behalf of the application.
///
/// Fields drop in declaration order, so the GPU context goes before the
/// window it presents to.
pub struct AppContext {
    pub gpu: GpuContext,
    pub(crate) surface: SurfaceContext,
    pub swapchain: Swapchain,
    pub(crate) frames: FrameSlots,
    /// Input events are dispatched here, in attachment order.
    pub events: EventDispatcher,
    pub vsync: bool,
    pub window: Arc<Window>,
}

impl AppContext {
    /// Create the surface, swapchain and frame slots for `window`.
    ///
    /// # Safety
    /// The window must have valid handles and outlive the context.
    pub(crate) unsafe fn new(window: Arc<Window>, gpu: GpuContext, vsync: bool) -> Result<Self> {
        let surface = unsafe { SurfaceContext::from_window(&gpu, window.as_ref())? };

        let size = window.inner_size();
        let swapchain = match unsafe {
            surface.create_swapchain(&gpu, size.width.max(1), size.height.max(1), vsync, None)
        } {
            Ok(swapchain) => swapchain,
            Err(e) => {
                unsafe { surface.destroy() };
                return Err(e);
            }
        };
        tracing::info!(
            "Swapchain created: {}x{} ({} images, {:?})",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.images.len(),
            swapchain.format
        );

        let frames = match unsafe {
            FrameSlots::new(gpu.device(), gpu.graphics_queue_family(), FRAMES_IN_FLIGHT)
        } {
            Ok(frames) => frames,
            Err(e) => {
                unsafe {
                    swapchain.destroy(gpu.device(), &surface.swapchain_loader);
                    surface.destroy();
                }
                return Err(e);
            }
        };

        Ok(Self {
            gpu,
            surface,
            swapchain,
            frames,
            events: EventDispatcher::new(),
            vsync,
            window,
        })
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent.width as f32 / self.swapchain.extent.height.max(1) as f32
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.ring().slot_count()
    }

    /// Number of frames submitted so far.
    pub const fn frame_number(&self) -> u64 {
        self.frames.frame_number()
    }

    /// Replace the swapchain with one matching the new window size.
    ///
    /// # Safety
    /// The GPU must be idle.
    pub(crate) unsafe fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe {
            self.surface.recreate_swapchain(
                &self.gpu,
                &mut self.swapchain,
                width,
                height,
                self.vsync,
            )?;
        }
        tracing::info!(
            "Swapchain recreated: {}x{}",
            self.swapchain.extent.width,
            self.swapchain.extent.height
        );
        Ok(())
    }

    /// Destroy the frame slots, swapchain and surface, in that order.
    ///
    /// # Safety
    /// The GPU must be idle. The context must not be used afterwards except
    /// to drop it.
    pub(crate) unsafe fn destroy(&mut self) {
        let device = self.gpu.device();
        unsafe {
            self.frames.destroy(device);
            self.swapchain
                .destroy(device, &self.surface.swapchain_loader);
            self.surface.destroy();
        }
    }
}
