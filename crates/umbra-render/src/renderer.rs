//! The deferred renderer: owns every GPU resource a frame touches.

use std::path::Path;

use ash::vk;
use gpu_allocator::MemoryLocation;
use umbra_core::constants::{FRAMES_IN_FLIGHT, MAX_MATERIALS};
use umbra_core::AssetPaths;
use umbra_gpu::{
    CommandRecorder, DescriptorPool, DescriptorSetBuilder, DescriptorSetLayoutBuilder, GpuBuffer,
    GpuContext, GpuError, GpuImage, GraphicsPipeline, ImageDesc, PipelineBuilder,
    PipelineLayoutBuilder, Result,
};
use umbra_shaders::{names, ShaderLibrary, Stage};

use crate::camera::Camera;
use crate::cleanup::{build_or_undo, log_release};
use crate::mesh::{cube, GpuMesh};
use crate::passes::{
    self, FrameOutput, FrameRecording, FrameSets, PassPipelines, SHADOW_PUSH_STAGES,
    VERTEX_PUSH_STAGES,
};
use crate::scene::{
    LightBlock, MaterialData, ObjectData, Scene, ShadowPushConstants, VertexPushConstants,
};
use crate::targets::{RenderTargets, DEPTH_FORMAT, DRAW_FORMAT, GBUFFER_FORMATS, SHADOW_FORMAT};

const TEXTURE_FILES: [&str; 2] = ["container.jpg", "awesomeface.png"];
const CHECKER_SIZE: u32 = 64;
const CHECKER_CELL: u32 = 8;

/// Renderer settings.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Width and height of each shadow map layer.
    pub shadow_map_size: u32,
    pub clear_color: [f32; 4],
    pub assets: AssetPaths,
    pub shaders: ShaderLibrary,
}

impl Default for RendererConfig {
    fn default() -> Self {
        let assets = AssetPaths::from_env();
        Self {
            shadow_map_size: 1024,
            clear_color: [0.2, 0.2, 0.2, 1.0],
            shaders: ShaderLibrary::from_assets(&assets),
            assets,
        }
    }
}

impl RendererConfig {
    /// Read textures and shaders from under `assets`.
    #[must_use]
    pub fn with_assets(mut self, assets: AssetPaths) -> Self {
        self.shaders = ShaderLibrary::from_assets(&assets);
        self.assets = assets;
        self
    }

    #[must_use]
    pub fn with_shaders(mut self, shaders: ShaderLibrary) -> Self {
        self.shaders = shaders;
        self
    }

    #[must_use]
    pub const fn with_shadow_map_size(mut self, size: u32) -> Self {
        self.shadow_map_size = size;
        self
    }

    #[must_use]
    pub const fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }
}

struct SetLayouts {
    light: vk::DescriptorSetLayout,
    object: vk::DescriptorSetLayout,
    material: vk::DescriptorSetLayout,
    composite: vk::DescriptorSetLayout,
}

impl SetLayouts {
    unsafe fn new(device: &ash::Device) -> Result<Self> {
        let layouts = build_or_undo(
            [
                light_set_layout(),
                object_set_layout(),
                material_set_layout(),
                composite_set_layout(),
            ],
            |builder| unsafe { builder.build(device) },
            |layout| unsafe { device.destroy_descriptor_set_layout(layout, None) },
        )?;
        Ok(Self {
            light: layouts[0],
            object: layouts[1],
            material: layouts[2],
            composite: layouts[3],
        })
    }

    unsafe fn destroy(&self, device: &ash::Device) {
        for layout in [self.light, self.object, self.material, self.composite] {
            unsafe { device.destroy_descriptor_set_layout(layout, None) };
        }
    }
}

/// Light block, read by every stage that shades or projects lights.
fn light_set_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().storage_buffer(
        0,
        vk::ShaderStageFlags::VERTEX
            | vk::ShaderStageFlags::GEOMETRY
            | vk::ShaderStageFlags::FRAGMENT,
    )
}

/// Two surface textures and the object array.
fn object_set_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new()
        .combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
        .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
        .storage_buffer(2, vk::ShaderStageFlags::VERTEX)
}

fn material_set_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().storage_buffer(0, vk::ShaderStageFlags::FRAGMENT)
}

/// G-buffer position, normal, albedo, then the shadow maps.
fn composite_set_layout() -> DescriptorSetLayoutBuilder {
    (0..4).fold(DescriptorSetLayoutBuilder::new(), |builder, binding| {
        builder.combined_image_sampler(binding, vk::ShaderStageFlags::FRAGMENT)
    })
}

/// Pool sizes and set count for `slots` frame slots.
fn pool_sizes(slots: u32) -> (Vec<vk::DescriptorPoolSize>, u32) {
    (
        vec![
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: slots * 6,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: slots * 3,
            },
        ],
        slots * 4,
    )
}

/// Loaded SPIR-V for every pass.
struct PassShaders {
    shadow: [Vec<u32>; 3],
    gbuffer: [Vec<u32>; 2],
    lighting: [Vec<u32>; 2],
    gizmo: [Vec<u32>; 2],
}

impl PassShaders {
    fn load(library: &ShaderLibrary) -> Result<Self> {
        let pair = |name: &str| -> Result<[Vec<u32>; 2]> {
            Ok([
                library.load(name, Stage::Vertex)?,
                library.load(name, Stage::Fragment)?,
            ])
        };
        Ok(Self {
            shadow: [
                library.load(names::SHADOW, Stage::Vertex)?,
                library.load(names::SHADOW, Stage::Geometry)?,
                library.load(names::SHADOW, Stage::Fragment)?,
            ],
            gbuffer: pair(names::GBUFFER)?,
            lighting: pair(names::LIGHTING)?,
            gizmo: pair(names::LIGHT_GIZMO)?,
        })
    }
}

/// Depth only, every light into its six layers. Back faces only, to keep
/// acne off lit surfaces.
fn shadow_pipeline([vert, geom, frag]: [Vec<u32>; 3]) -> PipelineBuilder {
    PipelineBuilder::new()
        .shaders(vert, frag)
        .geometry_shader(geom)
        .input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .rasterizer(
            vk::PolygonMode::FILL,
            vk::CullModeFlags::FRONT,
            vk::FrontFace::COUNTER_CLOCKWISE,
        )
        .depth_format(SHADOW_FORMAT)
        .enable_depth_test(true, vk::CompareOp::GREATER_OR_EQUAL)
}

fn gbuffer_pipeline([vert, frag]: [Vec<u32>; 2]) -> PipelineBuilder {
    PipelineBuilder::new()
        .shaders(vert, frag)
        .input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .rasterizer(
            vk::PolygonMode::FILL,
            vk::CullModeFlags::BACK,
            vk::FrontFace::COUNTER_CLOCKWISE,
        )
        .color_formats(&GBUFFER_FORMATS)
        .depth_format(DEPTH_FORMAT)
        .enable_depth_test(true, vk::CompareOp::GREATER_OR_EQUAL)
}

/// Full-screen composite; the depth attachment is bound only for the gizmos
/// that follow in the same rendering scope.
fn lighting_pipeline([vert, frag]: [Vec<u32>; 2]) -> PipelineBuilder {
    PipelineBuilder::new()
        .shaders(vert, frag)
        .input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .color_formats(&[DRAW_FORMAT])
        .depth_format(DEPTH_FORMAT)
        .disable_depth_test()
}

fn gizmo_pipeline([vert, frag]: [Vec<u32>; 2]) -> PipelineBuilder {
    PipelineBuilder::new()
        .shaders(vert, frag)
        .input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .rasterizer(
            vk::PolygonMode::FILL,
            vk::CullModeFlags::BACK,
            vk::FrontFace::COUNTER_CLOCKWISE,
        )
        .color_formats(&[DRAW_FORMAT])
        .depth_format(DEPTH_FORMAT)
        .enable_depth_test(true, vk::CompareOp::GREATER_OR_EQUAL)
}

unsafe fn build_pipeline(
    device: &ash::Device,
    name: &str,
    layout: PipelineLayoutBuilder,
    builder: PipelineBuilder,
) -> Result<GraphicsPipeline> {
    let layout = unsafe { layout.build(device)? };
    match unsafe { builder.build(device, layout) } {
        Ok(pipeline) => {
            tracing::debug!("Created {} pipeline", name);
            Ok(pipeline)
        }
        Err(e) => {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            Err(GpuError::PipelineCreation(format!("{name}: {e}")))
        }
    }
}

/// Load every pass's shaders and build its pipeline. Pipelines already built
/// are destroyed if a later one fails.
unsafe fn create_pipelines(
    device: &ash::Device,
    library: &ShaderLibrary,
    layouts: &SetLayouts,
) -> Result<PassPipelines> {
    let shaders = PassShaders::load(library)?;
    let passes = [
        (
            "shadow",
            PipelineLayoutBuilder::new()
                .set_layout(layouts.light)
                .set_layout(layouts.object)
                .push_constants::<ShadowPushConstants>(SHADOW_PUSH_STAGES),
            shadow_pipeline(shaders.shadow),
        ),
        (
            "gbuffer",
            PipelineLayoutBuilder::new()
                .set_layout(layouts.object)
                .push_constants::<VertexPushConstants>(VERTEX_PUSH_STAGES),
            gbuffer_pipeline(shaders.gbuffer),
        ),
        (
            "lighting",
            PipelineLayoutBuilder::new()
                .set_layout(layouts.light)
                .set_layout(layouts.composite)
                .set_layout(layouts.material)
                .push_constants::<VertexPushConstants>(VERTEX_PUSH_STAGES),
            lighting_pipeline(shaders.lighting),
        ),
        (
            "light gizmo",
            PipelineLayoutBuilder::new()
                .set_layout(layouts.light)
                .push_constants::<VertexPushConstants>(VERTEX_PUSH_STAGES),
            gizmo_pipeline(shaders.gizmo),
        ),
    ];

    let built = build_or_undo(
        passes,
        |(name, layout, builder)| unsafe { build_pipeline(device, name, layout, builder) },
        |pipeline| unsafe { pipeline.destroy(device) },
    )?;
    Ok(PassPipelines {
        shadow: built[0],
        gbuffer: built[1],
        lighting: built[2],
        gizmo: built[3],
    })
}

unsafe fn destroy_pipelines(device: &ash::Device, pipelines: &PassPipelines) {
    for pipeline in [
        pipelines.shadow,
        pipelines.gbuffer,
        pipelines.lighting,
        pipelines.gizmo,
    ] {
        unsafe { pipeline.destroy(device) };
    }
}

/// Tightly packed RGBA8 checkerboard.
pub fn checkerboard(size: u32, cell: u32) -> Vec<u8> {
    let cell = cell.max(1);
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            if (x / cell + y / cell) % 2 == 0 {
                [230, 230, 230, 255]
            } else {
                [40, 40, 40, 255]
            }
        })
        .collect()
}

/// Load a texture, substituting a checkerboard if the file is unusable.
fn load_texture(gpu: &GpuContext, path: &Path) -> Result<GpuImage> {
    let mut texture = match GpuImage::load(gpu, path, vk::ImageUsageFlags::SAMPLED) {
        Ok(texture) => texture,
        Err(e @ (GpuError::ResourceNotFound(_) | GpuError::ImageDecode(_))) => {
            tracing::warn!("Texture unavailable ({}), using a checkerboard", e);
            GpuImage::from_rgba8(
                gpu,
                CHECKER_SIZE,
                CHECKER_SIZE,
                &checkerboard(CHECKER_SIZE, CHECKER_CELL),
                vk::ImageUsageFlags::SAMPLED,
                "checkerboard",
            )?
        }
        Err(e) => return Err(e),
    };
    texture.create_sampler(gpu.device(), vk::Filter::LINEAR)?;
    Ok(texture)
}

fn sampler(image: &GpuImage) -> Result<vk::Sampler> {
    image
        .sampler
        .ok_or_else(|| GpuError::InvalidState(format!("Image {:?} has no sampler", image.image)))
}

/// GPU resources created so far while a renderer is being built.
///
/// Released in reverse creation order if a later step fails.
#[derive(Default)]
struct Staged {
    targets: Option<RenderTargets>,
    mesh: Option<GpuMesh>,
    textures: Vec<GpuImage>,
    object_buffer: Option<GpuBuffer>,
    material_buffer: Option<GpuBuffer>,
    light_buffers: Vec<GpuBuffer>,
    layouts: Option<SetLayouts>,
    pool: Option<DescriptorPool>,
}

/// Every resource of a fully built renderer.
struct Resources {
    targets: RenderTargets,
    mesh: GpuMesh,
    textures: Vec<GpuImage>,
    object_buffer: GpuBuffer,
    material_buffer: GpuBuffer,
    light_buffers: Vec<GpuBuffer>,
    layouts: SetLayouts,
    pool: DescriptorPool,
}

impl Staged {
    /// All resources, or `self` back if a step never ran.
    fn complete(self) -> std::result::Result<Resources, Self> {
        match self {
            Self {
                targets: Some(targets),
                mesh: Some(mesh),
                textures,
                object_buffer: Some(object_buffer),
                material_buffer: Some(material_buffer),
                light_buffers,
                layouts: Some(layouts),
                pool: Some(pool),
            } => Ok(Resources {
                targets,
                mesh,
                textures,
                object_buffer,
                material_buffer,
                light_buffers,
                layouts,
                pool,
            }),
            incomplete => Err(incomplete),
        }
    }

    /// Release whatever exists, carrying on past individual failures.
    fn release(mut self, gpu: &GpuContext) {
        let device = gpu.device();
        unsafe {
            if let Some(pool) = self.pool.take() {
                pool.destroy(device);
            }
            if let Some(layouts) = self.layouts.take() {
                layouts.destroy(device);
            }
        }

        {
            let mut allocator = gpu.allocator().lock();
            for buffer in self
                .light_buffers
                .iter_mut()
                .chain(&mut self.material_buffer)
                .chain(&mut self.object_buffer)
            {
                log_release("renderer buffer", allocator.free_buffer(buffer));
            }
        }

        for texture in &mut self.textures {
            log_release("texture", texture.destroy(gpu));
        }
        if let Some(mesh) = &mut self.mesh {
            log_release("mesh", mesh.destroy(gpu));
        }
        if let Some(targets) = &mut self.targets {
            log_release("render targets", targets.destroy(gpu));
        }
    }
}

/// Create every resource into `staged`, then the descriptor sets and
/// pipelines that reference them.
fn stage_resources(
    gpu: &GpuContext,
    extent: vk::Extent2D,
    config: &RendererConfig,
    scene: &Scene,
    staged: &mut Staged,
) -> Result<(Vec<FrameSets>, PassPipelines)> {
    let device = gpu.device();
    let slots = FRAMES_IN_FLIGHT;

    let targets = &*staged
        .targets
        .insert(RenderTargets::new(gpu, extent, config.shadow_map_size)?);
    staged.mesh = Some(GpuMesh::upload(gpu, &cube(), "cube")?);
    for file in TEXTURE_FILES {
        let texture = load_texture(gpu, &config.assets.texture(file))?;
        staged.textures.push(texture);
    }

    let objects = scene.object_data();
    let object_buffer = gpu.allocator().lock().create_buffer(
        (objects.len().max(1) * std::mem::size_of::<ObjectData>()) as u64,
        vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
        "objects",
    )?;
    let object_buffer = &*staged.object_buffer.insert(object_buffer);
    object_buffer.upload(gpu, &objects)?;

    let material_buffer = gpu.allocator().lock().create_buffer(
        (MAX_MATERIALS * std::mem::size_of::<MaterialData>()) as u64,
        vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
        "materials",
    )?;
    let material_buffer = &*staged.material_buffer.insert(material_buffer);
    material_buffer.upload(gpu, &scene.material_data())?;

    let initial_lights = scene.light_block(0.0);
    for slot in 0..slots {
        let buffer = gpu.allocator().lock().create_buffer(
            std::mem::size_of::<LightBlock>() as u64,
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::CpuToGpu,
            &format!("lights (slot {slot})"),
        )?;
        let written = buffer.write(std::slice::from_ref(&initial_lights));
        staged.light_buffers.push(buffer);
        written?;
    }

    let layouts = &*staged.layouts.insert(unsafe { SetLayouts::new(device)? });
    let (sizes, max_sets) = pool_sizes(slots as u32);
    let pool = &*staged
        .pool
        .insert(unsafe { DescriptorPool::new(device, max_sets, &sizes)? });

    let textures = &staged.textures;
    let read_only = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
    let (light_sets, object_sets, material_sets, composite_sets) = unsafe {
        (
            DescriptorSetBuilder::new(layouts.light, slots)
                .storage_buffers_per_set(0, &staged.light_buffers)
                .build(device, pool)?,
            DescriptorSetBuilder::new(layouts.object, slots)
                .combined_image_sampler(0, textures[0].view, sampler(&textures[0])?, read_only)
                .combined_image_sampler(1, textures[1].view, sampler(&textures[1])?, read_only)
                .storage_buffer(2, object_buffer)
                .build(device, pool)?,
            DescriptorSetBuilder::new(layouts.material, slots)
                .storage_buffer(0, material_buffer)
                .build(device, pool)?,
            DescriptorSetBuilder::new(layouts.composite, slots)
                .combined_image_sampler(
                    0,
                    targets.position.view,
                    sampler(&targets.position)?,
                    read_only,
                )
                .combined_image_sampler(
                    1,
                    targets.normal.view,
                    sampler(&targets.normal)?,
                    read_only,
                )
                .combined_image_sampler(
                    2,
                    targets.albedo.view,
                    sampler(&targets.albedo)?,
                    read_only,
                )
                .combined_image_sampler(
                    3,
                    targets.shadow.view,
                    sampler(&targets.shadow)?,
                    vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL,
                )
                .build(device, pool)?,
        )
    };

    let sets = (0..slots)
        .map(|slot| FrameSets {
            light: light_sets[slot],
            object: object_sets[slot],
            material: material_sets[slot],
            composite: composite_sets[slot],
        })
        .collect();

    let pipelines = unsafe { create_pipelines(device, &config.shaders, layouts)? };
    Ok((sets, pipelines))
}

/// Deferred renderer with one light buffer and one set of descriptor sets per
/// frame slot.
///
/// The draw extent is fixed at creation; the final blit scales it to
/// whatever output image a frame targets.
pub struct DeferredRenderer {
    config: RendererConfig,
    scene: Scene,
    clock_ms: f64,
    targets: RenderTargets,
    mesh: GpuMesh,
    textures: Vec<GpuImage>,
    object_buffer: GpuBuffer,
    material_buffer: GpuBuffer,
    light_buffers: Vec<GpuBuffer>,
    layouts: SetLayouts,
    pool: DescriptorPool,
    sets: Vec<FrameSets>,
    pipelines: PassPipelines,
}

impl DeferredRenderer {
    /// Create every resource, upload the static scene data and build the
    /// pipelines.
    ///
    /// On failure everything created up to that point has been released.
    pub fn new(
        gpu: &GpuContext,
        extent: vk::Extent2D,
        config: RendererConfig,
        scene: Scene,
    ) -> Result<Self> {
        let mut staged = Staged::default();
        let (sets, pipelines) = match stage_resources(gpu, extent, &config, &scene, &mut staged) {
            Ok(built) => built,
            Err(e) => {
                tracing::warn!("Releasing partially built renderer: {}", e);
                staged.release(gpu);
                return Err(e);
            }
        };
        let resources = match staged.complete() {
            Ok(resources) => resources,
            Err(incomplete) => {
                unsafe { destroy_pipelines(gpu.device(), &pipelines) };
                incomplete.release(gpu);
                return Err(GpuError::InvalidState(
                    "Renderer resources were not all created".to_string(),
                ));
            }
        };

        tracing::info!(
            "Deferred renderer ready: {}x{}, {} objects, {} lights, {} frame slots",
            extent.width,
            extent.height,
            scene.objects.len(),
            scene.light_count(),
            sets.len()
        );

        Ok(Self {
            config,
            scene,
            clock_ms: 0.0,
            targets: resources.targets,
            mesh: resources.mesh,
            textures: resources.textures,
            object_buffer: resources.object_buffer,
            material_buffer: resources.material_buffer,
            light_buffers: resources.light_buffers,
            layouts: resources.layouts,
            pool: resources.pool,
            sets,
            pipelines,
        })
    }

    pub const fn scene(&self) -> &Scene {
        &self.scene
    }

    pub const fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    pub const fn draw_extent(&self) -> vk::Extent2D {
        self.targets.draw.extent
    }

    pub fn slot_count(&self) -> usize {
        self.sets.len()
    }

    /// The light buffer bound by `slot`'s descriptor sets.
    pub fn light_buffer(&self, slot: usize) -> Option<&GpuBuffer> {
        self.light_buffers.get(slot)
    }

    pub fn frame_sets(&self, slot: usize) -> Option<FrameSets> {
        self.sets.get(slot).copied()
    }

    /// Milliseconds of animation time.
    pub const fn clock_ms(&self) -> f64 {
        self.clock_ms
    }

    /// Advance the animation clock.
    pub fn update(&mut self, dt_seconds: f64) {
        self.clock_ms += dt_seconds * 1000.0;
    }

    pub fn set_clock_ms(&mut self, ms: f64) {
        self.clock_ms = ms;
    }

    /// Write the lights at the current clock into `slot`'s light buffer.
    ///
    /// The slot's previous submission must have completed.
    pub fn write_lights(&self, slot: usize) -> Result<()> {
        let buffer = self.light_buffers.get(slot).ok_or_else(|| {
            GpuError::InvalidState(format!("No light buffer for frame slot {slot}"))
        })?;
        buffer.write(std::slice::from_ref(&self.scene.light_block(self.clock_ms)))
    }

    /// Record a frame using `slot`'s descriptor sets.
    pub fn record_frame<R: CommandRecorder + ?Sized>(
        &mut self,
        rec: &mut R,
        slot: usize,
        camera: &Camera,
        output: Option<FrameOutput<'_>>,
    ) -> Result<()> {
        let sets = self.frame_sets(slot).ok_or_else(|| {
            GpuError::InvalidState(format!("No descriptor sets for frame slot {slot}"))
        })?;

        let frame = FrameRecording {
            pipelines: &self.pipelines,
            sets,
            index_buffer: self.mesh.index_buffer.buffer,
            index_count: self.mesh.index_count,
            camera: camera.push_constants(self.mesh.vertex_address),
            object_count: self.scene.objects.len() as u32,
            light_count: self.scene.light_count() as u32,
            clear_color: self.config.clear_color,
        };
        passes::record_frame(rec, &mut self.targets, &frame, output)
    }

    /// Read the draw image back as tightly packed RGBA8.
    ///
    /// Call after the frame that rendered it has completed. The draw image
    /// must still be in `TRANSFER_SRC_OPTIMAL`.
    pub fn capture(&self, gpu: &GpuContext) -> Result<Vec<u8>> {
        self.targets
            .draw
            .expect_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)?;

        let extent = self.draw_extent();
        let mut readback = GpuImage::new(
            gpu,
            &ImageDesc::new(
                extent,
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::TRANSFER_SRC,
            ),
            "readback image",
        )?;
        let mut buffer = match gpu.allocator().lock().create_buffer(
            u64::from(extent.width) * u64::from(extent.height) * 4,
            vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuToCpu,
            "readback buffer",
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                readback.destroy(gpu)?;
                return Err(e);
            }
        };

        let region = readback.full_copy_region();
        let dst = buffer.buffer;
        let mut blit = Ok(());
        let submitted = gpu.immediate_submit(|rec| {
            readback.discard_transition(rec, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
            blit = self.targets.draw.blit_to(rec, &readback);
            readback.transition(rec, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
            rec.copy_image_to_buffer(
                readback.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                &region,
            );
        });
        let result = submitted.and(blit).and_then(|()| buffer.read_bytes());

        gpu.allocator().lock().free_buffer(&mut buffer)?;
        readback.destroy(gpu)?;
        result
    }

    /// Release every resource. The GPU must be idle.
    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let device = gpu.device();
        unsafe {
            destroy_pipelines(device, &self.pipelines);
            self.pool.destroy(device);
            self.layouts.destroy(device);
        }

        {
            let mut allocator = gpu.allocator().lock();
            for buffer in &mut self.light_buffers {
                allocator.free_buffer(buffer)?;
            }
            allocator.free_buffer(&mut self.material_buffer)?;
            allocator.free_buffer(&mut self.object_buffer)?;
        }

        for texture in &mut self.textures {
            texture.destroy(gpu)?;
        }
        self.mesh.destroy(gpu)?;
        self.targets.destroy(gpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words() -> Vec<u32> {
        vec![0x0723_0203, 0x0001_0600, 0, 1, 0]
    }

    fn binding_types(builder: &DescriptorSetLayoutBuilder) -> Vec<(u32, vk::DescriptorType)> {
        builder
            .bindings()
            .iter()
            .map(|b| (b.binding, b.descriptor_type))
            .collect()
    }

    #[test]
    fn set_layouts_match_shader_bindings() {
        let light = light_set_layout();
        assert_eq!(
            binding_types(&light),
            vec![(0, vk::DescriptorType::STORAGE_BUFFER)]
        );
        assert!(light.bindings()[0]
            .stage_flags
            .contains(vk::ShaderStageFlags::GEOMETRY));

        let object = object_set_layout();
        assert_eq!(
            binding_types(&object),
            vec![
                (0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
                (1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
                (2, vk::DescriptorType::STORAGE_BUFFER),
            ]
        );

        let composite = composite_set_layout();
        assert_eq!(composite.bindings().len(), 4);
        assert!(composite
            .bindings()
            .iter()
            .all(|b| b.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER));
    }

    #[test]
    fn pool_covers_every_slot() {
        let slots = FRAMES_IN_FLIGHT as u32;
        let (sizes, max_sets) = pool_sizes(slots);
        assert_eq!(max_sets, 4 * slots);

        let count = |ty| {
            sizes
                .iter()
                .filter(|s| s.ty == ty)
                .map(|s| s.descriptor_count)
                .sum::<u32>()
        };
        // Object sets hold 2 samplers, composite sets 4.
        assert_eq!(count(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), 6 * slots);
        // Light, object and material sets hold one buffer each.
        assert_eq!(count(vk::DescriptorType::STORAGE_BUFFER), 3 * slots);
    }

    #[test]
    fn pass_pipelines_are_complete() {
        shadow_pipeline([words(), words(), words()]).validate().unwrap();
        gbuffer_pipeline([words(), words()]).validate().unwrap();
        lighting_pipeline([words(), words()]).validate().unwrap();
        gizmo_pipeline([words(), words()]).validate().unwrap();
    }

    #[test]
    fn missing_shader_is_reported() {
        let library = ShaderLibrary::from_dir("no/shaders/here");
        let err = PassShaders::load(&library).err().unwrap();
        assert!(matches!(err, GpuError::Asset(ref e) if e.is_missing()));
    }

    #[test]
    fn nothing_staged_is_incomplete() {
        let staged = Staged::default();
        let incomplete = staged.complete().err().unwrap();
        assert!(incomplete.targets.is_none());
        assert!(incomplete.light_buffers.is_empty());
    }

    #[test]
    fn checkerboard_alternates() {
        let pixels = checkerboard(4, 2);
        assert_eq!(pixels.len(), 4 * 4 * 4);
        let px = |x: usize, y: usize| &pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(px(0, 0), px(1, 1));
        assert_ne!(px(0, 0), px(2, 0));
        assert_ne!(px(0, 0), px(0, 2));
        assert!(pixels.chunks(4).all(|p| p[3] == 255));
    }

    #[test]
    fn config_follows_asset_root() {
        let config = RendererConfig::default().with_assets(AssetPaths::from_root("/data"));
        assert_eq!(
            config.shaders.path(names::SHADOW, Stage::Vertex),
            Some(std::path::PathBuf::from("/data/shaders/shadow.vert.spv"))
        );
        assert_eq!(config.shadow_map_size, 1024);
    }
}
