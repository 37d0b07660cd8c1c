//! Offscreen render targets.

use ash::vk;
use umbra_core::constants::SHADOW_LAYERS;
use umbra_gpu::{GpuContext, GpuError, GpuImage, ImageDesc, Result};

use crate::cleanup::{build_or_undo, log_release};

pub const DRAW_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
pub const POSITION_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const NORMAL_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;
pub const SHADOW_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// G-buffer colour formats in attachment order.
pub const GBUFFER_FORMATS: [vk::Format; 3] = [POSITION_FORMAT, NORMAL_FORMAT, ALBEDO_FORMAT];

/// Every image a frame renders into.
pub struct RenderTargets {
    /// HDR colour target, blitted to the swapchain at the end of a frame.
    pub draw: GpuImage,
    pub depth: GpuImage,
    pub position: GpuImage,
    pub normal: GpuImage,
    pub albedo: GpuImage,
    /// One layer per light and cube face.
    pub shadow: GpuImage,
}

/// One render target: how to allocate it and how shaders sample it.
struct TargetPlan {
    name: &'static str,
    desc: ImageDesc,
    filter: Option<vk::Filter>,
}

/// Targets in field order: draw, depth, position, normal, albedo, shadow.
fn target_plans(extent: vk::Extent2D, shadow_size: u32) -> [TargetPlan; 6] {
    let gbuffer_usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED;
    let gbuffer = |name, format| TargetPlan {
        name,
        desc: ImageDesc::new(extent, format, gbuffer_usage),
        filter: Some(vk::Filter::NEAREST),
    };
    [
        TargetPlan {
            name: "draw image",
            desc: ImageDesc::new(
                extent,
                DRAW_FORMAT,
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST,
            ),
            filter: None,
        },
        TargetPlan {
            name: "depth image",
            desc: ImageDesc::new(
                extent,
                DEPTH_FORMAT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ),
            filter: None,
        },
        gbuffer("gbuffer position", POSITION_FORMAT),
        gbuffer("gbuffer normal", NORMAL_FORMAT),
        gbuffer("gbuffer albedo", ALBEDO_FORMAT),
        TargetPlan {
            name: "shadow maps",
            desc: ImageDesc::new(
                vk::Extent2D {
                    width: shadow_size,
                    height: shadow_size,
                },
                SHADOW_FORMAT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            )
            .with_layers(SHADOW_LAYERS),
            filter: Some(vk::Filter::LINEAR),
        },
    ]
}

fn create_target(gpu: &GpuContext, plan: TargetPlan) -> Result<GpuImage> {
    let mut image = GpuImage::new(gpu, &plan.desc, plan.name)?;
    if let Some(filter) = plan.filter {
        if let Err(e) = image.create_sampler(gpu.device(), filter) {
            log_release(plan.name, image.destroy(gpu));
            return Err(e);
        }
    }
    Ok(image)
}

impl RenderTargets {
    /// Allocate every target. Nothing is left allocated if one of them fails.
    pub fn new(gpu: &GpuContext, extent: vk::Extent2D, shadow_size: u32) -> Result<Self> {
        let images = build_or_undo(
            target_plans(extent, shadow_size),
            |plan| create_target(gpu, plan),
            |mut image| log_release("render target", image.destroy(gpu)),
        )?;
        let [draw, depth, position, normal, albedo, shadow]: [GpuImage; 6] = images
            .try_into()
            .map_err(|_| GpuError::InvalidState("Render target count mismatch".to_string()))?;

        tracing::info!(
            "Render targets: {}x{}, shadow maps {}x{} x{}",
            extent.width,
            extent.height,
            shadow_size,
            shadow_size,
            SHADOW_LAYERS
        );

        Ok(Self {
            draw,
            depth,
            position,
            normal,
            albedo,
            shadow,
        })
    }

    pub const fn extent(&self) -> vk::Extent2D {
        self.draw.extent
    }

    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        for image in [
            &mut self.draw,
            &mut self.depth,
            &mut self.position,
            &mut self.normal,
            &mut self.albedo,
            &mut self.shadow,
        ] {
            image.destroy(gpu)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_follow_field_order() {
        let extent = vk::Extent2D {
            width: 320,
            height: 240,
        };
        let plans = target_plans(extent, 512);
        let names: Vec<_> = plans.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "draw image",
                "depth image",
                "gbuffer position",
                "gbuffer normal",
                "gbuffer albedo",
                "shadow maps"
            ]
        );
        assert_eq!(
            plans[2..5].iter().map(|s| s.desc.format).collect::<Vec<_>>(),
            GBUFFER_FORMATS.to_vec()
        );
    }

    #[test]
    fn only_sampled_targets_get_samplers() {
        let plans = target_plans(vk::Extent2D { width: 8, height: 8 }, 64);
        for plan in &plans {
            assert_eq!(
                plan.filter.is_some(),
                plan.desc.usage.contains(vk::ImageUsageFlags::SAMPLED),
                "{}",
                plan.name
            );
        }
        let shadow = &plans[5];
        assert_eq!(shadow.desc.extent.width, 64);
        assert_eq!(shadow.desc.array_layers, SHADOW_LAYERS);
    }
}
