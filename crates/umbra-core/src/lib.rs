//! Core types shared by every Umbra crate.
//!
//! This crate provides:
//! - Engine-wide constants (frames in flight, light and material limits)
//! - The base error type
//! - Asset directory configuration

pub mod assets;
pub mod error;

pub use assets::AssetPaths;
pub use error::{Error, Result};

/// Engine-wide constants
pub mod constants {
    /// Number of frame slots rotating through the render loop.
    pub const FRAMES_IN_FLIGHT: usize = 2;
    /// Maximum number of point lights in a scene.
    pub const MAX_LIGHTS: usize = 10;
    /// Maximum number of materials in a scene.
    pub const MAX_MATERIALS: usize = 10;
    /// Faces rendered per point light shadow (one cube map).
    pub const SHADOW_FACES: usize = 6;
    /// Array layers of the shadow map image.
    pub const SHADOW_LAYERS: u32 = (MAX_LIGHTS * SHADOW_FACES) as u32;
    /// Timeout for fence waits and swapchain acquisition, in nanoseconds.
    pub const FENCE_TIMEOUT_NS: u64 = 1_000_000_000;
}
