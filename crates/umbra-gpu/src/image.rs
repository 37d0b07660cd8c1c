//! GPU images with tracked layouts.
//!
//! A [`GpuImage`] remembers the layout its last recorded transition left it
//! in, so [`GpuImage::transition`] never needs the caller to supply an old
//! layout. The aspect is fixed at creation from the format.

use crate::command::{CommandRecorder, ImageTransition};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::path::Path;

/// Aspect implied by an image format.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Description of an image to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub array_layers: u32,
}

impl ImageDesc {
    pub const fn new(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            extent,
            format,
            usage,
            array_layers: 1,
        }
    }

    /// Use `layers` array layers; more than one gives a 2D array view.
    #[must_use]
    pub const fn with_layers(mut self, layers: u32) -> Self {
        self.array_layers = layers;
        self
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_for_format(self.format)
    }

    pub const fn view_type(&self) -> vk::ImageViewType {
        if self.array_layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        }
    }

    fn create_info(&self) -> vk::ImageCreateInfo<'static> {
        vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.format)
            .extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(self.array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
    }
}

/// A GPU image, its default view, and an optional sampler.
pub struct GpuImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub sampler: Option<vk::Sampler>,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub array_layers: u32,
    pub aspect: vk::ImageAspectFlags,
    layout: vk::ImageLayout,
    owned: bool,
}

impl GpuImage {
    /// Allocate a device-local image with a default view covering all layers.
    pub fn new(gpu: &GpuContext, desc: &ImageDesc, name: &str) -> Result<Self> {
        let (image, allocation) =
            gpu.allocator()
                .lock()
                .create_image(&desc.create_info(), MemoryLocation::GpuOnly, name)?;

        let aspect = desc.aspect();
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(desc.view_type())
            .format(desc.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(desc.array_layers),
            );

        let view = match unsafe { gpu.device().create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                gpu.allocator().lock().free_image(image, Some(allocation))?;
                return Err(e.into());
            }
        };

        tracing::debug!(
            "Created image '{}' {}x{} {:?} ({} layers)",
            name,
            desc.extent.width,
            desc.extent.height,
            desc.format,
            desc.array_layers
        );

        Ok(Self {
            image,
            view,
            sampler: None,
            allocation: Some(allocation),
            format: desc.format,
            extent: desc.extent,
            array_layers: desc.array_layers,
            aspect,
            layout: vk::ImageLayout::UNDEFINED,
            owned: true,
        })
    }

    /// Wrap an image owned elsewhere, such as a swapchain image.
    ///
    /// [`destroy`](Self::destroy) leaves the image and view alone.
    pub fn from_raw_parts(
        image: vk::Image,
        view: vk::ImageView,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            image,
            view,
            sampler: None,
            allocation: None,
            format,
            extent,
            array_layers: 1,
            aspect: aspect_for_format(format),
            layout: vk::ImageLayout::UNDEFINED,
            owned: false,
        }
    }

    /// Layout left by the last recorded transition.
    pub const fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Fail unless the image is currently in `layout`.
    pub fn expect_layout(&self, layout: vk::ImageLayout) -> Result<()> {
        if self.layout == layout {
            Ok(())
        } else {
            Err(GpuError::InvalidState(format!(
                "Image {:?} is in {:?}, expected {layout:?}",
                self.image, self.layout
            )))
        }
    }

    /// Record a transition from the tracked layout to `new_layout`.
    pub fn transition<R: CommandRecorder + ?Sized>(
        &mut self,
        rec: &mut R,
        new_layout: vk::ImageLayout,
    ) {
        self.record_transition(rec, self.layout, new_layout);
    }

    /// Record a transition that discards the current contents.
    pub fn discard_transition<R: CommandRecorder + ?Sized>(
        &mut self,
        rec: &mut R,
        new_layout: vk::ImageLayout,
    ) {
        self.record_transition(rec, vk::ImageLayout::UNDEFINED, new_layout);
    }

    fn record_transition<R: CommandRecorder + ?Sized>(
        &mut self,
        rec: &mut R,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        rec.transition_image(&ImageTransition {
            image: self.image,
            old_layout,
            new_layout,
            aspect: self.aspect,
        });
        self.layout = new_layout;
    }

    /// Clear every layer to `color`. The image must be in `GENERAL` or
    /// `TRANSFER_DST_OPTIMAL`.
    pub fn clear<R: CommandRecorder + ?Sized>(&self, rec: &mut R, color: [f32; 4]) -> Result<()> {
        if self.layout != vk::ImageLayout::GENERAL
            && self.layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL
        {
            return Err(GpuError::InvalidState(format!(
                "Cannot clear image {:?} in {:?}",
                self.image, self.layout
            )));
        }
        let range = ImageTransition {
            image: self.image,
            old_layout: self.layout,
            new_layout: self.layout,
            aspect: self.aspect,
        }
        .subresource_range();
        rec.clear_color_image(self.image, self.layout, color, range);
        Ok(())
    }

    /// Blit this image onto `dst`, scaling between extents.
    ///
    /// `self` must be in `TRANSFER_SRC_OPTIMAL` and `dst` in
    /// `TRANSFER_DST_OPTIMAL`.
    pub fn blit_to<R: CommandRecorder + ?Sized>(&self, rec: &mut R, dst: &Self) -> Result<()> {
        self.expect_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)?;
        dst.expect_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
        rec.blit_image(self.image, dst.image, self.extent, dst.extent);
        Ok(())
    }

    /// Attach a sampler with the given filter and no mipmapping.
    pub fn create_sampler(&mut self, device: &ash::Device, filter: vk::Filter) -> Result<()> {
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(filter)
            .min_filter(filter)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .max_lod(0.0);

        let sampler = unsafe { device.create_sampler(&info, None)? };
        if let Some(old) = self.sampler.replace(sampler) {
            unsafe { device.destroy_sampler(old, None) };
        }
        Ok(())
    }

    /// Decode an image file as RGBA8 and upload it.
    ///
    /// The result is left in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn load(gpu: &GpuContext, path: &Path, usage: vk::ImageUsageFlags) -> Result<Self> {
        let decoded = ::image::open(path)
            .map_err(|e| match e {
                ::image::ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    GpuError::ResourceNotFound(path.display().to_string())
                }
                other => GpuError::ImageDecode(format!("{}: {other}", path.display())),
            })?
            .into_rgba8();

        let (width, height) = decoded.dimensions();
        let name = path
            .file_name()
            .map_or_else(|| "texture".to_string(), |n| n.to_string_lossy().into_owned());

        Self::from_rgba8(gpu, width, height, decoded.as_raw(), usage, &name)
    }

    /// Upload tightly packed RGBA8 pixels into a new `R8G8B8A8_UNORM` image.
    ///
    /// Staging, the copy, and the `UNDEFINED -> TRANSFER_DST -> SHADER_READ_ONLY`
    /// transitions all happen in one immediate submission.
    pub fn from_rgba8(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        pixels: &[u8],
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected || expected == 0 {
            return Err(GpuError::InvalidState(format!(
                "'{name}': {} bytes of pixels for a {width}x{height} RGBA8 image",
                pixels.len()
            )));
        }

        let desc = ImageDesc::new(
            vk::Extent2D { width, height },
            vk::Format::R8G8B8A8_UNORM,
            usage | vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        );
        let mut texture = Self::new(gpu, &desc, name)?;

        let mut staging = gpu.allocator().lock().create_buffer(
            pixels.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "texture staging",
        )?;

        let src = staging.buffer;
        let region = texture.full_copy_region();
        let result = staging.write_bytes(0, pixels).and_then(|()| {
            gpu.immediate_submit(|rec| {
                texture.discard_transition(rec, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
                rec.copy_buffer_to_image(
                    src,
                    texture.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &region,
                );
                texture.transition(rec, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
            })
        });

        gpu.allocator().lock().free_buffer(&mut staging)?;
        if let Err(e) = result {
            texture.destroy(gpu)?;
            return Err(e);
        }

        Ok(texture)
    }

    /// Copy region covering layer 0 of the whole image, tightly packed.
    pub fn full_copy_region(&self) -> vk::BufferImageCopy {
        vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: self.aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
    }

    /// Release the sampler, view, image and allocation.
    ///
    /// The GPU must no longer be using the image. Calling this twice does nothing.
    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        let device = gpu.device();
        if let Some(sampler) = self.sampler.take() {
            unsafe { device.destroy_sampler(sampler, None) };
        }
        if !self.owned || self.image == vk::Image::null() {
            return Ok(());
        }

        unsafe { device.destroy_image_view(self.view, None) };
        gpu.allocator()
            .lock()
            .free_image(self.image, self.allocation.take())?;
        self.view = vk::ImageView::null();
        self.image = vk::Image::null();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandLog, RecordedCommand};
    use ash::vk::Handle;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn fake(raw: u64, format: vk::Format) -> GpuImage {
        GpuImage::from_raw_parts(
            vk::Image::from_raw(raw),
            vk::ImageView::from_raw(raw + 100),
            format,
            extent(64, 64),
        )
    }

    #[test]
    fn aspect_follows_format() {
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_for_format(vk::Format::R16G16B16A16_SFLOAT),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn layered_images_get_array_views() {
        let desc = ImageDesc::new(
            extent(1024, 1024),
            vk::Format::D32_SFLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        assert_eq!(desc.view_type(), vk::ImageViewType::TYPE_2D);
        let layered = desc.with_layers(60);
        assert_eq!(layered.view_type(), vk::ImageViewType::TYPE_2D_ARRAY);
        assert_eq!(layered.create_info().array_layers, 60);
    }

    #[test]
    fn transitions_track_layout() {
        let mut log = CommandLog::new();
        let mut image = fake(1, vk::Format::D32_SFLOAT);

        image.discard_transition(&mut log, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        image.transition(&mut log, vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL);

        assert_eq!(image.layout(), vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL);
        let transitions = log.transitions_for(image.image);
        assert_eq!(transitions.len(), 2);
        assert_eq!(
            transitions[1].old_layout,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        );
        assert!(transitions
            .iter()
            .all(|t| t.aspect == vk::ImageAspectFlags::DEPTH));
        assert!(log.check_transition_chains().is_ok());
    }

    #[test]
    fn blit_checks_layouts() {
        let mut log = CommandLog::new();
        let mut src = fake(1, vk::Format::R16G16B16A16_SFLOAT);
        let mut dst = fake(2, vk::Format::B8G8R8A8_UNORM);

        assert!(src.blit_to(&mut log, &dst).is_err());

        src.discard_transition(&mut log, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert!(src.blit_to(&mut log, &dst).is_err());

        dst.discard_transition(&mut log, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        src.blit_to(&mut log, &dst).unwrap();
        assert!(matches!(
            log.commands().last(),
            Some(RecordedCommand::BlitImage { .. })
        ));
    }

    #[test]
    fn clear_requires_transfer_capable_layout() {
        let mut log = CommandLog::new();
        let mut image = fake(5, vk::Format::R16G16B16A16_SFLOAT);
        assert!(image.clear(&mut log, [0.2, 0.2, 0.2, 1.0]).is_err());
        image.discard_transition(&mut log, vk::ImageLayout::GENERAL);
        assert!(image.clear(&mut log, [0.2, 0.2, 0.2, 1.0]).is_ok());
    }
}
