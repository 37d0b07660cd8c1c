//! Descriptor set management.
//!
//! [`DescriptorSetBuilder`] allocates one set per frame slot from a single
//! layout and writes each binding into every set. Per-slot buffers let slot
//! `i`'s set point at slot `i`'s copy of frequently rewritten data.

use crate::error::{GpuError, Result};
use crate::memory::GpuBuffer;
use ash::vk;

/// Descriptor set layout builder.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-descriptor binding.
    #[must_use]
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags),
        );
        self
    }

    #[must_use]
    pub fn storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_BUFFER, stage_flags)
    }

    #[must_use]
    pub fn combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stage_flags,
        )
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };
        Ok(layout)
    }
}

/// Descriptor pool for allocating descriptor sets.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&create_info, None)? };
        Ok(Self { pool })
    }

    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate one set per layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { device.allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }

    /// Destroy the pool and every set allocated from it.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_descriptor_pool(self.pool, None) };
    }
}

/// Resource written into a descriptor binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorResource {
    ImageSampler {
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
    StorageBuffer {
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    },
}

impl DescriptorResource {
    pub const fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::ImageSampler { .. } => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Self::StorageBuffer { .. } => vk::DescriptorType::STORAGE_BUFFER,
        }
    }
}

/// One descriptor write, addressed by set index and binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingWrite {
    pub set: usize,
    pub binding: u32,
    pub resource: DescriptorResource,
}

enum BindingSource {
    Shared(DescriptorResource),
    PerSet(Vec<DescriptorResource>),
}

/// Allocates `count` sets of one layout and fills their bindings.
pub struct DescriptorSetBuilder {
    layout: vk::DescriptorSetLayout,
    count: usize,
    bindings: Vec<(u32, BindingSource)>,
}

impl DescriptorSetBuilder {
    pub const fn new(layout: vk::DescriptorSetLayout, count: usize) -> Self {
        Self {
            layout,
            count,
            bindings: Vec::new(),
        }
    }

    /// Bind the same image and sampler in every set.
    #[must_use]
    pub fn combined_image_sampler(
        mut self,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    ) -> Self {
        self.bindings.push((
            binding,
            BindingSource::Shared(DescriptorResource::ImageSampler {
                view,
                sampler,
                layout,
            }),
        ));
        self
    }

    /// Bind the same buffer in every set.
    #[must_use]
    pub fn storage_buffer(mut self, binding: u32, buffer: &GpuBuffer) -> Self {
        self.bindings.push((
            binding,
            BindingSource::Shared(DescriptorResource::StorageBuffer {
                buffer: buffer.buffer,
                range: buffer.size,
            }),
        ));
        self
    }

    /// Bind `buffers[i]` in set `i`. Needs exactly one buffer per set.
    #[must_use]
    pub fn storage_buffers_per_set(mut self, binding: u32, buffers: &[GpuBuffer]) -> Self {
        let resources = buffers
            .iter()
            .map(|b| DescriptorResource::StorageBuffer {
                buffer: b.buffer,
                range: b.size,
            })
            .collect();
        self.bindings.push((binding, BindingSource::PerSet(resources)));
        self
    }

    /// Every write the builder will perform, in set-major order.
    pub fn plan(&self) -> Result<Vec<PendingWrite>> {
        for (binding, source) in &self.bindings {
            if let BindingSource::PerSet(resources) = source {
                if resources.len() != self.count {
                    return Err(GpuError::InvalidState(format!(
                        "Binding {binding} has {} per-set resources for {} sets",
                        resources.len(),
                        self.count
                    )));
                }
            }
        }

        let mut writes = Vec::with_capacity(self.count * self.bindings.len());
        for set in 0..self.count {
            for (binding, source) in &self.bindings {
                let resource = match source {
                    BindingSource::Shared(resource) => *resource,
                    BindingSource::PerSet(resources) => resources[set],
                };
                writes.push(PendingWrite {
                    set,
                    binding: *binding,
                    resource,
                });
            }
        }
        Ok(writes)
    }

    /// Allocate the sets from `pool` and perform every write.
    ///
    /// # Safety
    /// The device must be valid and every referenced resource must outlive the sets.
    pub unsafe fn build(
        self,
        device: &ash::Device,
        pool: &DescriptorPool,
    ) -> Result<Vec<vk::DescriptorSet>> {
        let plan = self.plan()?;
        let layouts = vec![self.layout; self.count];
        let sets = unsafe { pool.allocate(device, &layouts)? };

        let mut image_infos = Vec::new();
        let mut buffer_infos = Vec::new();
        for write in &plan {
            match write.resource {
                DescriptorResource::ImageSampler {
                    view,
                    sampler,
                    layout,
                } => image_infos.push([vk::DescriptorImageInfo::default()
                    .image_view(view)
                    .sampler(sampler)
                    .image_layout(layout)]),
                DescriptorResource::StorageBuffer { buffer, range } => {
                    buffer_infos.push([vk::DescriptorBufferInfo::default()
                        .buffer(buffer)
                        .offset(0)
                        .range(range)]);
                }
            }
        }

        let (mut next_image, mut next_buffer) = (0, 0);
        let writes: Vec<vk::WriteDescriptorSet> = plan
            .iter()
            .map(|write| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(sets[write.set])
                    .dst_binding(write.binding)
                    .descriptor_type(write.resource.descriptor_type());
                match write.resource {
                    DescriptorResource::ImageSampler { .. } => {
                        next_image += 1;
                        base.image_info(&image_infos[next_image - 1])
                    }
                    DescriptorResource::StorageBuffer { .. } => {
                        next_buffer += 1;
                        base.buffer_info(&buffer_infos[next_buffer - 1])
                    }
                }
            })
            .collect();

        unsafe { device.update_descriptor_sets(&writes, &[]) };
        Ok(sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn buffer(raw: u64, size: u64) -> GpuBuffer {
        GpuBuffer {
            buffer: vk::Buffer::from_raw(raw),
            allocation: None,
            size,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER,
        }
    }

    #[test]
    fn layout_bindings() {
        let builder = DescriptorSetLayoutBuilder::new()
            .combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
            .storage_buffer(2, vk::ShaderStageFlags::VERTEX);
        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(
            bindings[0].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(bindings[1].binding, 2);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn shared_bindings_reach_every_set() {
        let shared = buffer(10, 48);
        let plan = DescriptorSetBuilder::new(vk::DescriptorSetLayout::from_raw(1), 2)
            .storage_buffer(0, &shared)
            .plan()
            .unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].set, 0);
        assert_eq!(plan[1].set, 1);
        assert_eq!(plan[0].resource, plan[1].resource);
    }

    #[test]
    fn per_set_buffers_stay_isolated() {
        let per_slot = [buffer(20, 64), buffer(21, 64)];
        let view = vk::ImageView::from_raw(30);
        let sampler = vk::Sampler::from_raw(31);

        let plan = DescriptorSetBuilder::new(vk::DescriptorSetLayout::from_raw(1), 2)
            .combined_image_sampler(0, view, sampler, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .storage_buffers_per_set(1, &per_slot)
            .plan()
            .unwrap();

        let buffers_in = |set: usize| -> Vec<vk::Buffer> {
            plan.iter()
                .filter(|w| w.set == set)
                .filter_map(|w| match w.resource {
                    DescriptorResource::StorageBuffer { buffer, .. } => Some(buffer),
                    DescriptorResource::ImageSampler { .. } => None,
                })
                .collect()
        };
        assert_eq!(buffers_in(0), vec![vk::Buffer::from_raw(20)]);
        assert_eq!(buffers_in(1), vec![vk::Buffer::from_raw(21)]);
    }

    #[test]
    fn per_set_count_must_match() {
        let only_one = [buffer(20, 64)];
        let result = DescriptorSetBuilder::new(vk::DescriptorSetLayout::from_raw(1), 2)
            .storage_buffers_per_set(0, &only_one)
            .plan();
        assert!(result.is_err());
    }
}
