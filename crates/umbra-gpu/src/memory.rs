//! GPU memory management.
//!
//! Buffers are created through [`GpuAllocator`] and destroyed explicitly with
//! [`GpuAllocator::free_buffer`]. Device-local buffers receive data only through
//! [`GpuBuffer::upload`], which stages through a transient host-visible buffer and
//! an immediate submission. Host-visible buffers may be written in place.

use crate::command::CommandRecorder;
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
    live: usize,
}

impl GpuAllocator {
    /// Create a new allocator.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
            live: 0,
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))
    }

    fn allocate(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        let allocation = self
            .inner()?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| GpuError::AllocationFailed(format!("{name}: {e}")))?;
        self.live += 1;
        Ok(allocation)
    }

    fn release(&mut self, allocation: Option<Allocation>) -> Result<()> {
        if let Some(allocation) = allocation {
            self.inner()?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
            self.live = self.live.saturating_sub(1);
        }
        Ok(())
    }

    /// Number of allocations made through this allocator and not yet freed.
    pub const fn live_allocations(&self) -> usize {
        self.live
    }

    /// Free an allocation on a path that is already failing.
    fn discard(&mut self, name: &str, allocation: Allocation) {
        if let Err(e) = self.release(Some(allocation)) {
            tracing::warn!("Could not free '{name}' after a failed bind: {e}");
        }
    }

    /// Allocate a buffer.
    ///
    /// `location` picks the strategy: `CpuToGpu`/`GpuToCpu` buffers come back
    /// persistently mapped, `GpuOnly` buffers can only be filled by GPU copies.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        if size == 0 {
            return Err(GpuError::InvalidState(format!(
                "Buffer '{name}' requested with zero size"
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = match self.allocate(name, requirements, location, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        let allocation = bound_or_undo(bound, allocation, |allocation| {
            self.discard(name, allocation);
            unsafe { self.device.destroy_buffer(buffer, None) };
        })?;

        Ok(GpuBuffer {
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Free a buffer allocation.
    ///
    /// Freeing a buffer that was already freed does nothing.
    pub fn free_buffer(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        if buffer.buffer == vk::Buffer::null() {
            return Ok(());
        }

        self.release(buffer.allocation.take())?;

        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
        }
        buffer.buffer = vk::Buffer::null();

        Ok(())
    }

    /// Allocate and bind device memory for an image.
    pub fn create_image(
        &mut self,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<(vk::Image, Allocation)> {
        let image = unsafe { self.device.create_image(create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = match self.allocate(name, requirements, location, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        let allocation = bound_or_undo(bound, allocation, |allocation| {
            self.discard(name, allocation);
            unsafe { self.device.destroy_image(image, None) };
        })?;

        Ok((image, allocation))
    }

    /// Free an image and its allocation.
    pub fn free_image(&mut self, image: vk::Image, allocation: Option<Allocation>) -> Result<()> {
        self.release(allocation)?;
        unsafe {
            self.device.destroy_image(image, None);
        }
        Ok(())
    }

    /// Shutdown the allocator, freeing all GPU memory.
    ///
    /// This must be called before the Vulkan device is destroyed.
    /// Any remaining allocations are logged as leaks.
    pub fn shutdown(&mut self) {
        drop(self.allocator.take());
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Pass `resource` through if binding succeeded, otherwise hand it to `undo`.
fn bound_or_undo<T>(
    bound: ash::prelude::VkResult<()>,
    resource: T,
    undo: impl FnOnce(T),
) -> Result<T> {
    match bound {
        Ok(()) => Ok(resource),
        Err(e) => {
            undo(resource);
            Err(e.into())
        }
    }
}

/// Check that `usage` covers every flag in `required`.
pub fn require_usage(
    usage: vk::BufferUsageFlags,
    required: vk::BufferUsageFlags,
    operation: &str,
) -> Result<()> {
    if usage.contains(required) {
        Ok(())
    } else {
        Err(GpuError::InvalidState(format!(
            "{operation} needs {required:?}, buffer only has {usage:?}"
        )))
    }
}

/// Check that `len` bytes starting at `offset` fit in a buffer of `capacity` bytes.
pub fn check_range(capacity: u64, offset: u64, len: u64) -> Result<()> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
    if end > capacity {
        return Err(GpuError::InvalidState(format!(
            "Range {offset}..{end} exceeds buffer size {capacity}"
        )));
    }
    Ok(())
}

/// A GPU buffer with its allocation.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
}

impl GpuBuffer {
    /// Get the device address of this buffer.
    pub fn device_address(&self, device: &ash::Device) -> vk::DeviceAddress {
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        unsafe { device.get_buffer_device_address(&info) }
    }

    /// Pointer to the persistently mapped memory, if host-visible.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
    }

    /// Write typed data at the start of the buffer (must be host-visible).
    pub fn write<T: Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Write raw bytes to the buffer at the given offset (must be host-visible).
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;
        check_range(self.size, offset, data.len() as u64)?;

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }

        Ok(())
    }

    /// Copy the whole buffer back to the host (must be host-visible).
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;
        let len = usize::try_from(self.size)
            .map_err(|_| GpuError::InvalidState("Buffer too large to map".to_string()))?;

        let mut out = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr, out.as_mut_ptr(), len);
        }
        Ok(out)
    }

    /// Read the first `count` elements of type `T` (must be host-visible).
    pub fn read<T: Pod>(&self, count: usize) -> Result<Vec<T>> {
        let bytes = self.read_bytes()?;
        let needed = count * std::mem::size_of::<T>();
        if needed > bytes.len() {
            return Err(GpuError::InvalidState(format!(
                "Cannot read {count} elements ({needed} bytes) from a {} byte buffer",
                bytes.len()
            )));
        }
        Ok(bytemuck::pod_collect_to_vec(&bytes[..needed]))
    }

    /// Upload a slice into this buffer through a transient staging buffer.
    ///
    /// Blocks until the copy has finished on the GPU. The staging buffer is
    /// released before returning, whether or not the copy succeeded. Uploading
    /// an empty slice does nothing.
    pub fn upload<T: Pod>(&self, gpu: &GpuContext, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            return Ok(());
        }
        require_usage(self.usage, vk::BufferUsageFlags::TRANSFER_DST, "Staged upload")?;
        check_range(self.size, 0, bytes.len() as u64)?;

        let size = bytes.len() as u64;
        let mut staging = gpu.allocator().lock().create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "staging",
        )?;

        let src = staging.buffer;
        let dst = self.buffer;
        let result = staging.write_bytes(0, bytes).and_then(|()| {
            gpu.immediate_submit(|rec| {
                rec.copy_buffer(
                    src,
                    dst,
                    &[vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size,
                    }],
                );
            })
        });

        gpu.allocator().lock().free_buffer(&mut staging)?;
        result
    }

    /// Copy `size` bytes from `src` into this buffer with an immediate submission.
    pub fn copy_from(&self, gpu: &GpuContext, src: &Self, size: u64) -> Result<()> {
        require_usage(src.usage, vk::BufferUsageFlags::TRANSFER_SRC, "Buffer copy source")?;
        require_usage(self.usage, vk::BufferUsageFlags::TRANSFER_DST, "Buffer copy target")?;
        check_range(src.size, 0, size)?;
        check_range(self.size, 0, size)?;

        let (src, dst) = (src.buffer, self.buffer);
        gpu.immediate_submit(|rec| {
            rec.copy_buffer(
                src,
                dst,
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                }],
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_must_cover_operation() {
        let usage = vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST;
        assert!(require_usage(usage, vk::BufferUsageFlags::TRANSFER_DST, "upload").is_ok());
        assert!(require_usage(usage, vk::BufferUsageFlags::TRANSFER_SRC, "copy").is_err());
        assert!(require_usage(
            usage,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            "both"
        )
        .is_ok());
    }

    #[test]
    fn failed_bind_releases_resource() {
        let mut released = Vec::new();
        let err = bound_or_undo(Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY), 7u32, |r| {
            released.push(r);
        })
        .unwrap_err();
        assert!(matches!(err, GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)));
        assert_eq!(released, vec![7]);

        let kept = bound_or_undo(Ok(()), 9u32, |r| released.push(r)).unwrap();
        assert_eq!(kept, 9);
        assert_eq!(released, vec![7]);
    }

    #[test]
    fn range_checks() {
        assert!(check_range(64, 0, 64).is_ok());
        assert!(check_range(64, 32, 32).is_ok());
        assert!(check_range(64, 32, 33).is_err());
        assert!(check_range(64, u64::MAX, 2).is_err());
    }

    #[test]
    fn unmapped_buffer_rejects_host_access() {
        let buffer = GpuBuffer {
            buffer: vk::Buffer::null(),
            allocation: None,
            size: 16,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER,
        };
        assert!(buffer.mapped_ptr().is_none());
        assert!(buffer.write(&[1u32, 2, 3, 4]).is_err());
        assert!(buffer.read_bytes().is_err());
    }
}
