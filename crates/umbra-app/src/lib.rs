//! Application framework for the Umbra engine.
//!
//! This crate owns the window, the GPU context, the swapchain and the frame
//! slots, and drives the per-frame protocol:
//! wait, acquire, begin, record, submit, present, advance.
//!
//! # Example
//!
//! ```no_run
//! use umbra_app::{run_app, AppConfig, AppContext, FrameContext, UmbraApp};
//!
//! struct MyApp;
//!
//! impl UmbraApp for MyApp {
//!     fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn update(&mut self, ctx: &AppContext, dt: f32) {}
//!
//!     fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext<'_>) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(AppConfig::default())
//! }
//! ```

mod app;
mod config;
mod context;
mod frame;
mod runner;

pub use app::UmbraApp;
pub use config::AppConfig;
pub use context::AppContext;
pub use frame::{FrameContext, FrameStats};
pub use runner::{init_logging, run_app};

pub use umbra_gpu::{GpuContext, GpuContextBuilder};
pub use umbra_input::{EventDispatcher, EventListener, InputEvent};
pub use winit::event::WindowEvent;
