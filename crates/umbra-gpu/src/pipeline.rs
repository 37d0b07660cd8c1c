//! Graphics pipeline construction.
//!
//! Pipelines use dynamic rendering and dynamic viewport/scissor, so they are
//! independent of attachment sizes. Multisampling and blending are always off.

use crate::error::{GpuError, Result};
use ash::vk;

/// Builder for a pipeline layout.
#[derive(Default)]
pub struct PipelineLayoutBuilder {
    set_layouts: Vec<vk::DescriptorSetLayout>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl PipelineLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a descriptor set layout; set numbers follow call order.
    #[must_use]
    pub fn set_layout(mut self, layout: vk::DescriptorSetLayout) -> Self {
        self.set_layouts.push(layout);
        self
    }

    /// Add a push constant range sized for `T`, starting at offset 0.
    #[must_use]
    pub fn push_constants<T>(mut self, stages: vk::ShaderStageFlags) -> Self {
        self.push_constant_ranges.push(
            vk::PushConstantRange::default()
                .stage_flags(stages)
                .offset(0)
                .size(std::mem::size_of::<T>() as u32),
        );
        self
    }

    pub fn push_constant_ranges(&self) -> &[vk::PushConstantRange] {
        &self.push_constant_ranges
    }

    /// # Safety
    /// The device and set layouts must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&self.set_layouts)
            .push_constant_ranges(&self.push_constant_ranges);

        unsafe { device.create_pipeline_layout(&info, None) }
            .map_err(|e| GpuError::PipelineCreation(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DepthState {
    write: bool,
    compare_op: vk::CompareOp,
}

/// Fluent builder for a graphics pipeline.
///
/// Owns its configuration; [`build`](Self::build) consumes it.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    vertex: Vec<u32>,
    geometry: Option<Vec<u32>>,
    fragment: Vec<u32>,
    topology: vk::PrimitiveTopology,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    depth: Option<DepthState>,
    color_formats: Vec<vk::Format>,
    depth_format: vk::Format,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            vertex: Vec::new(),
            geometry: None,
            fragment: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth: None,
            color_formats: Vec::new(),
            depth_format: vk::Format::UNDEFINED,
        }
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vertex and fragment SPIR-V.
    #[must_use]
    pub fn shaders(mut self, vertex: Vec<u32>, fragment: Vec<u32>) -> Self {
        self.vertex = vertex;
        self.fragment = fragment;
        self
    }

    #[must_use]
    pub fn geometry_shader(mut self, geometry: Vec<u32>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    #[must_use]
    pub const fn input_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    #[must_use]
    pub const fn rasterizer(
        mut self,
        polygon_mode: vk::PolygonMode,
        cull_mode: vk::CullModeFlags,
        front_face: vk::FrontFace,
    ) -> Self {
        self.polygon_mode = polygon_mode;
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    #[must_use]
    pub fn color_formats(mut self, formats: &[vk::Format]) -> Self {
        self.color_formats = formats.to_vec();
        self
    }

    #[must_use]
    pub const fn depth_format(mut self, format: vk::Format) -> Self {
        self.depth_format = format;
        self
    }

    #[must_use]
    pub const fn enable_depth_test(mut self, write: bool, compare_op: vk::CompareOp) -> Self {
        self.depth = Some(DepthState { write, compare_op });
        self
    }

    #[must_use]
    pub const fn disable_depth_test(mut self) -> Self {
        self.depth = None;
        self
    }

    /// Check the configuration is complete enough to build.
    pub fn validate(&self) -> Result<()> {
        if self.vertex.is_empty() {
            return Err(GpuError::PipelineCreation("Missing vertex shader".into()));
        }
        if self.fragment.is_empty() {
            return Err(GpuError::PipelineCreation("Missing fragment shader".into()));
        }
        if self.geometry.as_ref().is_some_and(Vec::is_empty) {
            return Err(GpuError::PipelineCreation("Empty geometry shader".into()));
        }
        if self.color_formats.is_empty() && self.depth_format == vk::Format::UNDEFINED {
            return Err(GpuError::PipelineCreation(
                "Pipeline has no attachments".into(),
            ));
        }
        if self.depth.is_some() && self.depth_format == vk::Format::UNDEFINED {
            return Err(GpuError::PipelineCreation(
                "Depth test enabled without a depth format".into(),
            ));
        }
        Ok(())
    }

    fn stage_code(&self) -> Vec<(vk::ShaderStageFlags, &[u32])> {
        let mut stages = vec![(vk::ShaderStageFlags::VERTEX, self.vertex.as_slice())];
        if let Some(geometry) = &self.geometry {
            stages.push((vk::ShaderStageFlags::GEOMETRY, geometry.as_slice()));
        }
        stages.push((vk::ShaderStageFlags::FRAGMENT, self.fragment.as_slice()));
        stages
    }

    /// Build the pipeline. The returned [`GraphicsPipeline`] owns `layout`.
    ///
    /// # Safety
    /// The device and layout must be valid; shader code must be valid SPIR-V.
    pub unsafe fn build(
        self,
        device: &ash::Device,
        layout: vk::PipelineLayout,
    ) -> Result<GraphicsPipeline> {
        self.validate()?;

        let mut modules = Vec::new();
        for (stage, code) in self.stage_code() {
            match unsafe { create_shader_module(device, code) } {
                Ok(module) => modules.push((stage, module)),
                Err(e) => {
                    for (_, module) in modules {
                        unsafe { device.destroy_shader_module(module, None) };
                    }
                    return Err(GpuError::ShaderModule(format!("{stage:?}: {e}")));
                }
            }
        }

        let shader_stages: Vec<_> = modules
            .iter()
            .map(|&(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage)
                    .module(module)
                    .name(c"main")
            })
            .collect();

        // Vertices are pulled from storage buffers.
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .line_width(1.0);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false)
            .min_sample_shading(1.0);

        let depth_stencil = match self.depth {
            Some(depth) => vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(true)
                .depth_write_enable(depth.write)
                .depth_compare_op(depth.compare_op),
            None => vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(false)
                .depth_write_enable(false)
                .depth_compare_op(vk::CompareOp::NEVER),
        }
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false)
        .min_depth_bounds(0.0)
        .max_depth_bounds(1.0);

        let color_blend_attachments: Vec<_> = self
            .color_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect();

        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&self.color_formats)
            .depth_attachment_format(self.depth_format);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let result = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        for (_, module) in modules {
            unsafe { device.destroy_shader_module(module, None) };
        }

        let pipeline = result
            .map_err(|(_, e)| GpuError::PipelineCreation(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| GpuError::PipelineCreation("No pipeline returned".into()))?;

        Ok(GraphicsPipeline { pipeline, layout })
    }
}

/// Create a shader module from SPIR-V words.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    let module = unsafe { device.create_shader_module(&info, None)? };
    Ok(module)
}

/// A built pipeline and the layout it was built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Destroy the pipeline and its layout.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spirv() -> Vec<u32> {
        vec![0x0723_0203, 0x0001_0600]
    }

    #[test]
    fn defaults_are_fill_list_without_depth() {
        let builder = PipelineBuilder::new();
        assert_eq!(builder.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(builder.polygon_mode, vk::PolygonMode::FILL);
        assert!(builder.depth.is_none());
    }

    #[test]
    fn topology_is_configurable() {
        let builder = PipelineBuilder::new().input_topology(vk::PrimitiveTopology::LINE_LIST);
        assert_eq!(builder.topology, vk::PrimitiveTopology::LINE_LIST);
    }

    #[test]
    fn builder_accumulates_locally() {
        let a = PipelineBuilder::new()
            .shaders(spirv(), spirv())
            .enable_depth_test(true, vk::CompareOp::GREATER_OR_EQUAL)
            .depth_format(vk::Format::D32_SFLOAT);
        let b = PipelineBuilder::new();
        assert!(a.depth.is_some());
        assert!(b.depth.is_none());
        assert!(b.vertex.is_empty());
    }

    #[test]
    fn geometry_stage_sits_between_vertex_and_fragment() {
        let builder = PipelineBuilder::new()
            .shaders(spirv(), spirv())
            .geometry_shader(spirv());
        let stages: Vec<_> = builder.stage_code().into_iter().map(|(s, _)| s).collect();
        assert_eq!(
            stages,
            vec![
                vk::ShaderStageFlags::VERTEX,
                vk::ShaderStageFlags::GEOMETRY,
                vk::ShaderStageFlags::FRAGMENT
            ]
        );
    }

    #[test]
    fn validation_catches_incomplete_configs() {
        assert!(PipelineBuilder::new().validate().is_err());

        let no_attachments = PipelineBuilder::new().shaders(spirv(), spirv());
        assert!(no_attachments.validate().is_err());

        let depth_without_format = PipelineBuilder::new()
            .shaders(spirv(), spirv())
            .color_formats(&[vk::Format::R16G16B16A16_SFLOAT])
            .enable_depth_test(false, vk::CompareOp::GREATER_OR_EQUAL);
        assert!(depth_without_format.validate().is_err());

        let depth_only = PipelineBuilder::new()
            .shaders(spirv(), spirv())
            .depth_format(vk::Format::D32_SFLOAT)
            .enable_depth_test(true, vk::CompareOp::GREATER_OR_EQUAL);
        assert!(depth_only.validate().is_ok());
    }

    #[test]
    fn push_constant_range_matches_type() {
        #[allow(dead_code)]
        struct Block([f32; 38]);
        let builder = PipelineLayoutBuilder::new()
            .push_constants::<Block>(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(builder.push_constant_ranges()[0].size, 152);
    }
}
