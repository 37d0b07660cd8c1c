//! Deferred shading renderer for the Umbra engine.
//!
//! This crate provides:
//! - Scene data and its GPU layouts (objects, materials, point lights)
//! - The cube mesh, fetched in shaders through its buffer device address
//! - An FPS camera with a reversed-Z projection
//! - Render targets: draw image, depth, G-buffer and layered shadow maps
//! - Frame recording: shadow, G-buffer, lighting and light gizmo passes
//! - Screenshot capture utilities

pub mod camera;
mod cleanup;
pub mod mesh;
pub mod passes;
pub mod renderer;
pub mod scene;
pub mod screenshot;
pub mod targets;

pub use camera::Camera;
pub use mesh::{cube, GpuMesh, MeshData, Vertex};
pub use passes::{record_frame, FrameOutput, FrameRecording, FrameSets, PassPipelines};
pub use renderer::{DeferredRenderer, RendererConfig};
pub use scene::{
    LightBlock, LightData, LightGeneralData, LightMotion, MaterialData, ObjectData, PointLight,
    Scene, SceneObject, ShadowPushConstants, VertexPushConstants,
};
pub use screenshot::{parse_frame_indices, save_screenshot, ScreenshotConfig, ScreenshotError};
pub use targets::RenderTargets;
