//! Frame recording.
//!
//! A frame is recorded in a fixed order:
//!
//! 1. clear the draw image, discard the depth image
//! 2. shadow pass: every light's six cube faces into the layered shadow map
//! 3. G-buffer pass: position, normal and albedo plus depth
//! 4. lighting pass: full-screen composite into the draw image, then one
//!    gizmo cube per light against the G-buffer depth
//! 5. blit the draw image to the output image
//!
//! Every layout change goes through the images' tracked layouts, so the
//! recorded transitions always chain.

use ash::vk;
use umbra_gpu::{
    AttachmentDesc, AttachmentLoad, CommandRecorder, GpuImage, GraphicsPipeline, RenderingDesc,
    Result,
};

use crate::scene::{ShadowPushConstants, VertexPushConstants};
use crate::targets::RenderTargets;

/// Stages that read [`VertexPushConstants`].
pub const VERTEX_PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Stages that read [`ShadowPushConstants`].
pub const SHADOW_PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;

const FULL_SCREEN_VERTICES: u32 = 6;
const REVERSED_DEPTH_CLEAR: f32 = 0.0;

/// The four graphics pipelines of a frame.
#[derive(Debug, Clone, Copy)]
pub struct PassPipelines {
    pub shadow: GraphicsPipeline,
    pub gbuffer: GraphicsPipeline,
    pub lighting: GraphicsPipeline,
    pub gizmo: GraphicsPipeline,
}

/// Descriptor sets of one frame slot.
#[derive(Debug, Clone, Copy)]
pub struct FrameSets {
    pub light: vk::DescriptorSet,
    pub object: vk::DescriptorSet,
    pub material: vk::DescriptorSet,
    pub composite: vk::DescriptorSet,
}

/// Everything a frame needs besides the render targets.
pub struct FrameRecording<'a> {
    pub pipelines: &'a PassPipelines,
    pub sets: FrameSets,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    /// Camera matrices and the vertex buffer address.
    pub camera: VertexPushConstants,
    pub object_count: u32,
    pub light_count: u32,
    pub clear_color: [f32; 4],
}

/// Image the finished frame is blitted into.
pub struct FrameOutput<'a> {
    pub image: &'a mut GpuImage,
    pub final_layout: vk::ImageLayout,
}

impl<'a> FrameOutput<'a> {
    /// Output to a swapchain image, ready to present.
    pub fn present(image: &'a mut GpuImage) -> Self {
        Self {
            image,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

/// Record a whole frame.
///
/// Without an output the draw image is left in `TRANSFER_SRC_OPTIMAL` for
/// the caller to read.
pub fn record_frame<R: CommandRecorder + ?Sized>(
    rec: &mut R,
    targets: &mut RenderTargets,
    frame: &FrameRecording<'_>,
    output: Option<FrameOutput<'_>>,
) -> Result<()> {
    targets
        .draw
        .discard_transition(rec, vk::ImageLayout::GENERAL);
    targets.draw.clear(rec, frame.clear_color)?;
    targets
        .draw
        .transition(rec, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    targets
        .depth
        .discard_transition(rec, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);

    shadow_pass(rec, targets, frame);
    geometry_pass(rec, targets, frame);
    lighting_pass(rec, targets, frame);
    resolve(rec, targets, output)
}

fn shadow_pass<R: CommandRecorder + ?Sized>(
    rec: &mut R,
    targets: &mut RenderTargets,
    frame: &FrameRecording<'_>,
) {
    let shadow = &mut targets.shadow;
    shadow.discard_transition(rec, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);

    rec.begin_rendering(&RenderingDesc {
        extent: shadow.extent,
        layer_count: shadow.array_layers,
        color: Vec::new(),
        depth: Some(AttachmentDesc {
            view: shadow.view,
            layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            load: AttachmentLoad::ClearDepth(REVERSED_DEPTH_CLEAR),
        }),
    });

    let pipeline = frame.pipelines.shadow;
    rec.bind_pipeline(pipeline.pipeline);
    rec.bind_descriptor_sets(pipeline.layout, 0, &[frame.sets.light, frame.sets.object]);
    rec.set_viewport_and_scissor(shadow.extent);
    rec.bind_index_buffer(frame.index_buffer);

    for light in 0..frame.light_count {
        let push = ShadowPushConstants {
            vertex_buffer: frame.camera.vertex_buffer,
            current_light: [light as i32, 0],
        };
        rec.push_constants(pipeline.layout, SHADOW_PUSH_STAGES, bytemuck::bytes_of(&push));
        rec.draw_indexed(frame.index_count, frame.object_count);
    }

    rec.end_rendering();
    shadow.transition(rec, vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL);
}

fn geometry_pass<R: CommandRecorder + ?Sized>(
    rec: &mut R,
    targets: &mut RenderTargets,
    frame: &FrameRecording<'_>,
) {
    let gbuffer = [
        &mut targets.position,
        &mut targets.normal,
        &mut targets.albedo,
    ];
    let mut color = Vec::with_capacity(gbuffer.len());
    for image in gbuffer {
        image.discard_transition(rec, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        color.push(AttachmentDesc {
            view: image.view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load: AttachmentLoad::ClearColor([0.0; 4]),
        });
    }

    let extent = targets.draw.extent;
    rec.begin_rendering(&RenderingDesc {
        extent,
        layer_count: 1,
        color,
        depth: Some(AttachmentDesc {
            view: targets.depth.view,
            layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            load: AttachmentLoad::ClearDepth(REVERSED_DEPTH_CLEAR),
        }),
    });

    let pipeline = frame.pipelines.gbuffer;
    rec.bind_pipeline(pipeline.pipeline);
    rec.bind_descriptor_sets(pipeline.layout, 0, &[frame.sets.object]);
    rec.set_viewport_and_scissor(extent);
    rec.push_constants(
        pipeline.layout,
        VERTEX_PUSH_STAGES,
        bytemuck::bytes_of(&frame.camera),
    );
    rec.bind_index_buffer(frame.index_buffer);
    rec.draw_indexed(frame.index_count, frame.object_count);
    rec.end_rendering();

    for image in [
        &mut targets.position,
        &mut targets.normal,
        &mut targets.albedo,
    ] {
        image.transition(rec, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }
}

fn lighting_pass<R: CommandRecorder + ?Sized>(
    rec: &mut R,
    targets: &RenderTargets,
    frame: &FrameRecording<'_>,
) {
    let extent = targets.draw.extent;
    rec.begin_rendering(&RenderingDesc {
        extent,
        layer_count: 1,
        color: vec![AttachmentDesc {
            view: targets.draw.view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load: AttachmentLoad::Load,
        }],
        // Gizmos test against the G-buffer depth.
        depth: Some(AttachmentDesc {
            view: targets.depth.view,
            layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            load: AttachmentLoad::Load,
        }),
    });
    rec.set_viewport_and_scissor(extent);

    let lighting = frame.pipelines.lighting;
    rec.bind_pipeline(lighting.pipeline);
    rec.bind_descriptor_sets(
        lighting.layout,
        0,
        &[frame.sets.light, frame.sets.composite, frame.sets.material],
    );
    rec.push_constants(
        lighting.layout,
        VERTEX_PUSH_STAGES,
        bytemuck::bytes_of(&frame.camera),
    );
    rec.draw(FULL_SCREEN_VERTICES, 1);

    if frame.light_count > 0 {
        let gizmo = frame.pipelines.gizmo;
        rec.bind_pipeline(gizmo.pipeline);
        rec.bind_descriptor_sets(gizmo.layout, 0, &[frame.sets.light]);
        rec.push_constants(gizmo.layout, VERTEX_PUSH_STAGES, bytemuck::bytes_of(&frame.camera));
        rec.bind_index_buffer(frame.index_buffer);
        rec.draw_indexed(frame.index_count, frame.light_count);
    }

    rec.end_rendering();
}

fn resolve<R: CommandRecorder + ?Sized>(
    rec: &mut R,
    targets: &mut RenderTargets,
    output: Option<FrameOutput<'_>>,
) -> Result<()> {
    targets
        .draw
        .transition(rec, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

    if let Some(output) = output {
        output
            .image
            .discard_transition(rec, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        targets.draw.blit_to(rec, output.image)?;
        output.image.transition(rec, output.final_layout);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::targets::{
        ALBEDO_FORMAT, DEPTH_FORMAT, DRAW_FORMAT, NORMAL_FORMAT, POSITION_FORMAT, SHADOW_FORMAT,
    };
    use ash::vk::Handle;
    use umbra_gpu::{CommandLog, RecordedCommand};

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 800,
        height: 600,
    };

    fn image(raw: u64, format: vk::Format, extent: vk::Extent2D) -> GpuImage {
        GpuImage::from_raw_parts(
            vk::Image::from_raw(raw),
            vk::ImageView::from_raw(raw + 1000),
            format,
            extent,
        )
    }

    fn targets() -> RenderTargets {
        RenderTargets {
            draw: image(1, DRAW_FORMAT, EXTENT),
            depth: image(2, DEPTH_FORMAT, EXTENT),
            position: image(3, POSITION_FORMAT, EXTENT),
            normal: image(4, NORMAL_FORMAT, EXTENT),
            albedo: image(5, ALBEDO_FORMAT, EXTENT),
            shadow: image(
                6,
                SHADOW_FORMAT,
                vk::Extent2D {
                    width: 1024,
                    height: 1024,
                },
            ),
        }
    }

    fn pipeline(raw: u64) -> GraphicsPipeline {
        GraphicsPipeline {
            pipeline: vk::Pipeline::from_raw(raw),
            layout: vk::PipelineLayout::from_raw(raw + 100),
        }
    }

    fn pipelines() -> PassPipelines {
        PassPipelines {
            shadow: pipeline(10),
            gbuffer: pipeline(11),
            lighting: pipeline(12),
            gizmo: pipeline(13),
        }
    }

    fn sets() -> FrameSets {
        FrameSets {
            light: vk::DescriptorSet::from_raw(20),
            object: vk::DescriptorSet::from_raw(21),
            material: vk::DescriptorSet::from_raw(22),
            composite: vk::DescriptorSet::from_raw(23),
        }
    }

    struct Recorded {
        log: CommandLog,
        targets: RenderTargets,
        output: GpuImage,
    }

    fn record(light_count: u32) -> Recorded {
        let pipelines = pipelines();
        let frame = FrameRecording {
            pipelines: &pipelines,
            sets: sets(),
            index_buffer: vk::Buffer::from_raw(30),
            index_count: 36,
            camera: crate::Camera::default().push_constants(0xabc0),
            object_count: 10,
            light_count,
            clear_color: [0.2, 0.2, 0.2, 1.0],
        };

        let mut log = CommandLog::new();
        let mut targets = targets();
        let mut output = image(
            40,
            vk::Format::B8G8R8A8_UNORM,
            vk::Extent2D {
                width: 1600,
                height: 1200,
            },
        );
        record_frame(
            &mut log,
            &mut targets,
            &frame,
            Some(FrameOutput::present(&mut output)),
        )
        .unwrap();

        Recorded {
            log,
            targets,
            output,
        }
    }

    fn rendering_scopes(log: &CommandLog) -> Vec<(usize, &RenderingDesc)> {
        log.commands()
            .iter()
            .enumerate()
            .filter_map(|(i, c)| match c {
                RecordedCommand::BeginRendering(desc) => Some((i, desc)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn transition_chains_are_unbroken() {
        let recorded = record(5);
        recorded.log.check_transition_chains().unwrap();

        for image in [
            &recorded.targets.draw,
            &recorded.targets.depth,
            &recorded.targets.shadow,
        ] {
            assert!(
                !recorded.log.transitions_for(image.image).is_empty(),
                "{:?} never transitioned",
                image.image
            );
        }
    }

    #[test]
    fn images_end_in_expected_layouts() {
        let recorded = record(5);
        let t = &recorded.targets;
        assert_eq!(t.draw.layout(), vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(t.shadow.layout(), vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL);
        assert_eq!(t.albedo.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(recorded.output.layout(), vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn shadow_maps_are_readable_before_they_are_sampled() {
        let recorded = record(5);
        let log = &recorded.log;
        let shadow = recorded.targets.shadow.image;

        let readable = log
            .position(|c| {
                matches!(c, RecordedCommand::Transition(t)
                    if t.image == shadow
                        && t.new_layout == vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL)
            })
            .expect("shadow map never made readable");

        let composite_bound = log
            .position(|c| {
                matches!(c, RecordedCommand::BindDescriptorSets { sets, .. }
                    if sets.contains(&self::sets().composite))
            })
            .expect("composite set never bound");

        let gbuffer_begins = rendering_scopes(log)[1].0;

        assert!(readable < gbuffer_begins);
        assert!(readable < composite_bound);
    }

    #[test]
    fn passes_run_in_order() {
        let recorded = record(5);
        let scopes = rendering_scopes(&recorded.log);
        assert_eq!(scopes.len(), 3);

        let (_, shadow) = scopes[0];
        assert!(shadow.color.is_empty());
        assert_eq!(shadow.layer_count, recorded.targets.shadow.array_layers);

        let (_, gbuffer) = scopes[1];
        assert_eq!(gbuffer.color.len(), 3);
        assert!(gbuffer
            .color
            .iter()
            .all(|a| a.load == AttachmentLoad::ClearColor([0.0; 4])));
        assert_eq!(
            gbuffer.depth.map(|d| d.load),
            Some(AttachmentLoad::ClearDepth(0.0))
        );

        let (lighting_at, lighting) = scopes[2];
        assert_eq!(lighting.color.len(), 1);
        assert_eq!(lighting.color[0].view, recorded.targets.draw.view);
        assert_eq!(lighting.depth.map(|d| d.load), Some(AttachmentLoad::Load));

        let blit = recorded
            .log
            .position(|c| matches!(c, RecordedCommand::BlitImage { .. }))
            .unwrap();
        assert!(lighting_at < blit);
    }

    #[test]
    fn shadow_pass_draws_once_per_light() {
        let recorded = record(3);
        let shadow_layout = pipelines().shadow.layout;

        let lights: Vec<i32> = recorded
            .log
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::PushConstants { layout, bytes, .. }
                    if *layout == shadow_layout =>
                {
                    let push = bytemuck::pod_read_unaligned::<ShadowPushConstants>(bytes);
                    Some(push.current_light[0])
                }
                _ => None,
            })
            .collect();
        assert_eq!(lights, vec![0, 1, 2]);
    }

    #[test]
    fn lighting_then_gizmos() {
        let recorded = record(4);
        let draws: Vec<&RecordedCommand> = recorded
            .log
            .commands()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. }
                )
            })
            .collect();

        // 4 shadow draws, the G-buffer draw, the composite and the gizmos.
        assert_eq!(draws.len(), 7);
        assert_eq!(
            draws[5],
            &RecordedCommand::Draw {
                vertex_count: 6,
                instance_count: 1
            }
        );
        assert_eq!(
            draws[6],
            &RecordedCommand::DrawIndexed {
                index_count: 36,
                instance_count: 4
            }
        );
    }

    #[test]
    fn no_gizmos_without_lights() {
        let recorded = record(0);
        let gizmo = pipelines().gizmo.pipeline;
        assert!(recorded
            .log
            .position(|c| *c == RecordedCommand::BindPipeline(gizmo))
            .is_none());
        recorded.log.check_transition_chains().unwrap();
    }

    #[test]
    fn draw_image_is_cleared_before_passes() {
        let recorded = record(1);
        let clear = recorded
            .log
            .position(|c| {
                matches!(
                    c,
                    RecordedCommand::ClearColorImage { color, .. } if *color == [0.2, 0.2, 0.2, 1.0]
                )
            })
            .unwrap();
        let first_scope = rendering_scopes(&recorded.log)[0].0;
        assert!(clear < first_scope);
    }

    #[test]
    fn headless_frame_skips_blit() {
        let pipelines = pipelines();
        let frame = FrameRecording {
            pipelines: &pipelines,
            sets: sets(),
            index_buffer: vk::Buffer::from_raw(30),
            index_count: 36,
            camera: crate::Camera::default().push_constants(0),
            object_count: 1,
            light_count: 1,
            clear_color: [0.2, 0.2, 0.2, 1.0],
        };
        let mut log = CommandLog::new();
        let mut targets = targets();
        record_frame(&mut log, &mut targets, &frame, None).unwrap();

        assert!(log
            .position(|c| matches!(c, RecordedCommand::BlitImage { .. }))
            .is_none());
        assert_eq!(targets.draw.layout(), vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    }
}
