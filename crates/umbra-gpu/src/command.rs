//! Command buffer management and recording.
//!
//! Everything the renderer records goes through [`CommandRecorder`].
//! [`VulkanRecorder`] writes into a real command buffer; [`CommandLog`] keeps a
//! list of what would have been recorded so frame structure can be inspected
//! without a device.

use crate::error::{GpuError, Result};
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub const fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_command_buffer(
        &self,
        device: &ash::Device,
    ) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info)? };
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::InvalidState("No command buffer allocated".to_string()))
    }

    /// Reset the command pool, returning all its buffers to the initial state.
    ///
    /// # Safety
    /// The device must be valid and all command buffers from this pool must not be in use.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())? };
        Ok(())
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Begin recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);
    unsafe { device.begin_command_buffer(cmd, &begin_info)? };
    Ok(())
}

/// End recording a command buffer.
///
/// # Safety
/// The device and command buffer must be valid.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.end_command_buffer(cmd)? };
    Ok(())
}

/// A full-image layout transition.
///
/// Covers every mip level and array layer of `image`. The aspect is always
/// given by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransition {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub aspect: vk::ImageAspectFlags,
}

impl ImageTransition {
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.aspect)
            .base_mip_level(0)
            .level_count(vk::REMAINING_MIP_LEVELS)
            .base_array_layer(0)
            .layer_count(vk::REMAINING_ARRAY_LAYERS)
    }

    /// Barrier waiting on all prior writes, blocking all later reads and writes.
    pub fn barrier(&self) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .subresource_range(self.subresource_range())
            .image(self.image)
    }
}

/// What happens to an attachment when rendering begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttachmentLoad {
    /// Keep the existing contents.
    Load,
    /// Clear a colour attachment.
    ClearColor([f32; 4]),
    /// Clear a depth attachment.
    ClearDepth(f32),
}

/// One attachment of a dynamic rendering scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentDesc {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load: AttachmentLoad,
}

impl AttachmentDesc {
    fn info(&self) -> vk::RenderingAttachmentInfo<'static> {
        let (load_op, clear_value) = match self.load {
            AttachmentLoad::Load => (vk::AttachmentLoadOp::LOAD, vk::ClearValue::default()),
            AttachmentLoad::ClearColor(float32) => (
                vk::AttachmentLoadOp::CLEAR,
                vk::ClearValue {
                    color: vk::ClearColorValue { float32 },
                },
            ),
            AttachmentLoad::ClearDepth(depth) => (
                vk::AttachmentLoadOp::CLEAR,
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth, stencil: 0 },
                },
            ),
        };

        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(self.layout)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(clear_value)
    }
}

/// A dynamic rendering scope.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingDesc {
    pub extent: vk::Extent2D,
    pub layer_count: u32,
    pub color: Vec<AttachmentDesc>,
    pub depth: Option<AttachmentDesc>,
}

/// Sink for recorded GPU commands.
///
/// Pipelines are always bound at the graphics bind point and indices are
/// always 32-bit.
pub trait CommandRecorder {
    fn transition_image(&mut self, transition: &ImageTransition);

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
        range: vk::ImageSubresourceRange,
    );

    fn begin_rendering(&mut self, desc: &RenderingDesc);

    fn end_rendering(&mut self);

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);

    fn bind_descriptor_sets(
        &mut self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );

    /// Set a viewport and scissor covering `extent`.
    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D);

    fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        bytes: &[u8],
    );

    fn bind_index_buffer(&mut self, buffer: vk::Buffer);

    fn draw(&mut self, vertex_count: u32, instance_count: u32);

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32);

    /// Linear-filtered blit from `src` (TRANSFER_SRC_OPTIMAL) to `dst`
    /// (TRANSFER_DST_OPTIMAL), scaling between the two extents.
    fn blit_image(
        &mut self,
        src: vk::Image,
        dst: vk::Image,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    );

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        region: &vk::BufferImageCopy,
    );

    fn copy_image_to_buffer(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        region: &vk::BufferImageCopy,
    );
}

/// Records into a Vulkan command buffer in the recording state.
pub struct VulkanRecorder<'a> {
    device: &'a ash::Device,
    cmd: vk::CommandBuffer,
}

impl<'a> VulkanRecorder<'a> {
    /// # Safety
    /// `cmd` must have been allocated from `device`, be in the recording state,
    /// and stay that way for the lifetime of the recorder. Every handle passed
    /// to the recorder must be valid.
    pub const unsafe fn new(device: &'a ash::Device, cmd: vk::CommandBuffer) -> Self {
        Self { device, cmd }
    }

    pub const fn command_buffer(&self) -> vk::CommandBuffer {
        self.cmd
    }
}

fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: i32::try_from(extent.width).unwrap_or(i32::MAX),
        y: i32::try_from(extent.height).unwrap_or(i32::MAX),
        z: 1,
    }
}

impl CommandRecorder for VulkanRecorder<'_> {
    fn transition_image(&mut self, transition: &ImageTransition) {
        let barriers = [transition.barrier()];
        let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.device.cmd_pipeline_barrier2(self.cmd, &dependency) };
    }

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
        range: vk::ImageSubresourceRange,
    ) {
        let clear = vk::ClearColorValue { float32: color };
        unsafe {
            self.device
                .cmd_clear_color_image(self.cmd, image, layout, &clear, &[range]);
        }
    }

    fn begin_rendering(&mut self, desc: &RenderingDesc) {
        let color: Vec<_> = desc.color.iter().map(AttachmentDesc::info).collect();
        let depth = desc.depth.as_ref().map(AttachmentDesc::info);

        let mut info = vk::RenderingInfo::default()
            .render_area(full_rect(desc.extent))
            .layer_count(desc.layer_count)
            .color_attachments(&color);
        if let Some(depth) = depth.as_ref() {
            info = info.depth_attachment(depth);
        }

        unsafe { self.device.cmd_begin_rendering(self.cmd, &info) };
    }

    fn end_rendering(&mut self) {
        unsafe { self.device.cmd_end_rendering(self.cmd) };
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn bind_descriptor_sets(
        &mut self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                &[],
            );
        }
    }

    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        unsafe {
            self.device.cmd_set_viewport(self.cmd, 0, &[viewport]);
            self.device.cmd_set_scissor(self.cmd, 0, &[full_rect(extent)]);
        }
    }

    fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        bytes: &[u8],
    ) {
        unsafe {
            self.device
                .cmd_push_constants(self.cmd, layout, stages, 0, bytes);
        }
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.cmd, buffer, 0, vk::IndexType::UINT32);
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        unsafe { self.device.cmd_draw(self.cmd, vertex_count, instance_count, 0, 0) };
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(self.cmd, index_count, instance_count, 0, 0, 0);
        }
    }

    fn blit_image(
        &mut self,
        src: vk::Image,
        dst: vk::Image,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    ) {
        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let regions = [vk::ImageBlit2::default()
            .src_subresource(layers)
            .src_offsets([vk::Offset3D::default(), far_corner(src_extent)])
            .dst_subresource(layers)
            .dst_offsets([vk::Offset3D::default(), far_corner(dst_extent)])];

        let info = vk::BlitImageInfo2::default()
            .src_image(src)
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(dst)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .filter(vk::Filter::LINEAR)
            .regions(&regions);

        unsafe { self.device.cmd_blit_image2(self.cmd, &info) };
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe { self.device.cmd_copy_buffer(self.cmd, src, dst, regions) };
    }

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        region: &vk::BufferImageCopy,
    ) {
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                self.cmd,
                src,
                dst,
                dst_layout,
                std::slice::from_ref(region),
            );
        }
    }

    fn copy_image_to_buffer(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        region: &vk::BufferImageCopy,
    ) {
        unsafe {
            self.device.cmd_copy_image_to_buffer(
                self.cmd,
                src,
                src_layout,
                dst,
                std::slice::from_ref(region),
            );
        }
    }
}

/// A command captured by [`CommandLog`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Transition(ImageTransition),
    ClearColorImage {
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
    },
    BeginRendering(RenderingDesc),
    EndRendering,
    BindPipeline(vk::Pipeline),
    BindDescriptorSets {
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    SetViewportAndScissor(vk::Extent2D),
    PushConstants {
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        bytes: Vec<u8>,
    },
    BindIndexBuffer(vk::Buffer),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    BlitImage {
        src: vk::Image,
        dst: vk::Image,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
    },
    CopyImageToBuffer {
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
    },
}

/// In-memory recorder used to inspect command streams.
#[derive(Debug, Default, Clone)]
pub struct CommandLog {
    commands: Vec<RecordedCommand>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Index of the first command matching `pred`.
    pub fn position(&self, pred: impl Fn(&RecordedCommand) -> bool) -> Option<usize> {
        self.commands.iter().position(pred)
    }

    /// Transitions recorded for `image`, in recording order.
    pub fn transitions_for(&self, image: vk::Image) -> Vec<ImageTransition> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                RecordedCommand::Transition(t) if t.image == image => Some(*t),
                _ => None,
            })
            .collect()
    }

    /// Check that each image's transitions form an unbroken chain.
    ///
    /// The first transition of an image must start from `UNDEFINED` and each
    /// later one must start from the layout the previous one ended in.
    pub fn check_transition_chains(&self) -> Result<()> {
        let mut images: Vec<vk::Image> = Vec::new();
        for cmd in &self.commands {
            if let RecordedCommand::Transition(t) = cmd {
                if !images.contains(&t.image) {
                    images.push(t.image);
                }
            }
        }

        for image in images {
            let mut expected = vk::ImageLayout::UNDEFINED;
            for (i, t) in self.transitions_for(image).iter().enumerate() {
                if t.old_layout != expected {
                    return Err(GpuError::InvalidState(format!(
                        "Transition {i} of {image:?} starts from {:?}, image is in {expected:?}",
                        t.old_layout
                    )));
                }
                expected = t.new_layout;
            }
        }
        Ok(())
    }
}

impl CommandRecorder for CommandLog {
    fn transition_image(&mut self, transition: &ImageTransition) {
        self.commands.push(RecordedCommand::Transition(*transition));
    }

    fn clear_color_image(
        &mut self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
        _range: vk::ImageSubresourceRange,
    ) {
        self.commands.push(RecordedCommand::ClearColorImage {
            image,
            layout,
            color,
        });
    }

    fn begin_rendering(&mut self, desc: &RenderingDesc) {
        self.commands.push(RecordedCommand::BeginRendering(desc.clone()));
    }

    fn end_rendering(&mut self) {
        self.commands.push(RecordedCommand::EndRendering);
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.commands.push(RecordedCommand::BindPipeline(pipeline));
    }

    fn bind_descriptor_sets(
        &mut self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.commands.push(RecordedCommand::BindDescriptorSets {
            layout,
            first_set,
            sets: sets.to_vec(),
        });
    }

    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        self.commands.push(RecordedCommand::SetViewportAndScissor(extent));
    }

    fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        bytes: &[u8],
    ) {
        self.commands.push(RecordedCommand::PushConstants {
            layout,
            stages,
            bytes: bytes.to_vec(),
        });
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        self.commands.push(RecordedCommand::BindIndexBuffer(buffer));
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.commands.push(RecordedCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        self.commands.push(RecordedCommand::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn blit_image(
        &mut self,
        src: vk::Image,
        dst: vk::Image,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    ) {
        self.commands.push(RecordedCommand::BlitImage {
            src,
            dst,
            src_extent,
            dst_extent,
        });
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, _regions: &[vk::BufferCopy]) {
        self.commands.push(RecordedCommand::CopyBuffer { src, dst });
    }

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        _region: &vk::BufferImageCopy,
    ) {
        self.commands.push(RecordedCommand::CopyBufferToImage {
            src,
            dst,
            dst_layout,
        });
    }

    fn copy_image_to_buffer(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Buffer,
        _region: &vk::BufferImageCopy,
    ) {
        self.commands.push(RecordedCommand::CopyImageToBuffer {
            src,
            src_layout,
            dst,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn transition(image: u64, old: vk::ImageLayout, new: vk::ImageLayout) -> ImageTransition {
        ImageTransition {
            image: vk::Image::from_raw(image),
            old_layout: old,
            new_layout: new,
            aspect: vk::ImageAspectFlags::COLOR,
        }
    }

    #[test]
    fn barrier_covers_every_layer() {
        let t = transition(1, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
        let range = t.subresource_range();
        assert_eq!(range.layer_count, vk::REMAINING_ARRAY_LAYERS);
        assert_eq!(range.level_count, vk::REMAINING_MIP_LEVELS);

        let barrier = t.barrier();
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn chain_check_accepts_linked_transitions() {
        let mut log = CommandLog::new();
        log.transition_image(&transition(
            1,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        ));
        log.transition_image(&transition(
            2,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ));
        log.transition_image(&transition(
            1,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ));

        assert!(log.check_transition_chains().is_ok());
        assert_eq!(log.transitions_for(vk::Image::from_raw(1)).len(), 2);
    }

    #[test]
    fn chain_check_rejects_gap() {
        let mut log = CommandLog::new();
        log.transition_image(&transition(
            1,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
        ));
        log.transition_image(&transition(
            1,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ));
        assert!(log.check_transition_chains().is_err());
    }

    #[test]
    fn chain_check_rejects_non_undefined_start() {
        let mut log = CommandLog::new();
        log.transition_image(&transition(
            3,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ));
        assert!(log.check_transition_chains().is_err());
    }

    #[test]
    fn attachment_load_ops() {
        let view = vk::ImageView::from_raw(7);
        let clear = AttachmentDesc {
            view,
            layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            load: AttachmentLoad::ClearDepth(0.0),
        }
        .info();
        assert_eq!(clear.load_op, vk::AttachmentLoadOp::CLEAR);
        assert!(unsafe { clear.clear_value.depth_stencil.depth }.abs() < f32::EPSILON);

        let load = AttachmentDesc {
            view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load: AttachmentLoad::Load,
        }
        .info();
        assert_eq!(load.load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(load.store_op, vk::AttachmentStoreOp::STORE);
    }
}
