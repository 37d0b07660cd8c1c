//! `UmbraApp` trait definition.

use crate::context::AppContext;
use crate::frame::FrameContext;
use winit::event::WindowEvent;

/// An application driven by [`run_app`](crate::run_app).
///
/// Input reaches the application through the listeners it attaches to
/// [`AppContext::events`]; [`on_window_event`](Self::on_window_event) sees
/// the raw window events first.
pub trait UmbraApp: Sized {
    /// Called once, after the window, GPU context and swapchain exist.
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self>;

    /// Called every frame before rendering. `dt` is in seconds.
    fn update(&mut self, ctx: &AppContext, dt: f32);

    /// Record the frame into `frame.recorder`.
    ///
    /// The frame slot's fence has been waited on, so resources indexed by
    /// `frame.slot` are free to update. The swapchain image must end up in
    /// `PRESENT_SRC_KHR`.
    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext<'_>) -> anyhow::Result<()>;

    /// Called after the frame has been submitted and presented.
    #[allow(unused_variables)]
    fn after_frame(&mut self, ctx: &AppContext, frame_number: u64) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the swapchain was recreated. The GPU is idle.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Return `true` to stop the runner from handling the event.
    #[allow(unused_variables)]
    fn on_window_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Checked between frames.
    fn should_exit(&self) -> bool {
        false
    }

    /// Release GPU resources. The GPU is idle.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut AppContext) {}
}
