//! Vulkan abstraction layer for the Umbra renderer.
//!
//! This crate provides:
//! - Vulkan instance and device management
//! - Memory allocation via gpu-allocator, with staged uploads
//! - Images that track their own layout
//! - Command recording behind the [`CommandRecorder`] trait
//! - Immediate (blocking) submission for setup work
//! - Frame slots for double-buffered rendering
//! - Descriptor and pipeline builders
//! - Swapchain handling

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod error;
pub mod image;
pub mod immediate;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::{
    AttachmentDesc, AttachmentLoad, CommandLog, CommandPool, CommandRecorder, ImageTransition,
    RecordedCommand, RenderingDesc, VulkanRecorder,
};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    DescriptorPool, DescriptorResource, DescriptorSetBuilder, DescriptorSetLayoutBuilder,
    PendingWrite,
};
pub use error::{GpuError, Result};
pub use image::{GpuImage, ImageDesc};
pub use immediate::ImmediateSubmit;
pub use memory::{GpuAllocator, GpuBuffer};
pub use pipeline::{GraphicsPipeline, PipelineBuilder, PipelineLayoutBuilder};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::Swapchain;
pub use sync::{create_fence, create_semaphore, FrameRing, FrameSlot, FrameSlots, SlotPhase};
