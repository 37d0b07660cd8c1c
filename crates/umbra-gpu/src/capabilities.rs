//! GPU capability detection.

use ash::vk;
use std::ffi::CStr;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub api_version: u32,
    pub driver_version: u32,

    /// Dynamic rendering (VK 1.3 core)
    pub supports_dynamic_rendering: bool,
    /// Synchronization2 (VK 1.3 core)
    pub supports_synchronization2: bool,
    pub supports_buffer_device_address: bool,
    /// Depth-only image layouts (VK 1.2 feature)
    pub supports_separate_depth_stencil_layouts: bool,
    /// Needed for layered shadow rendering
    pub supports_geometry_shader: bool,
    pub supports_shader_int64: bool,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    pub max_image_array_layers: u32,
    pub max_push_constants_size: u32,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut features_1_2);
        unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
        let features = features2.features;

        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let has_vulkan_1_3 = api_at_least_1_3(properties.api_version);

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            api_version: properties.api_version,
            driver_version: properties.driver_version,

            supports_dynamic_rendering: has_vulkan_1_3,
            supports_synchronization2: has_vulkan_1_3,
            supports_buffer_device_address: features_1_2.buffer_device_address == vk::TRUE,
            supports_separate_depth_stencil_layouts: features_1_2
                .separate_depth_stencil_layouts
                == vk::TRUE,
            supports_geometry_shader: features.geometry_shader == vk::TRUE,
            supports_shader_int64: features.shader_int64 == vk::TRUE,

            device_local_memory_mb,
            max_image_array_layers: properties.limits.max_image_array_layers,
            max_push_constants_size: properties.limits.max_push_constants_size,
        }
    }

    /// Requirements the renderer needs that this device lacks.
    pub fn missing_requirements(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !api_at_least_1_3(self.api_version) {
            missing.push("Vulkan 1.3");
        }
        if !self.supports_dynamic_rendering {
            missing.push("dynamic rendering");
        }
        if !self.supports_synchronization2 {
            missing.push("synchronization2");
        }
        if !self.supports_buffer_device_address {
            missing.push("buffer device address");
        }
        if !self.supports_separate_depth_stencil_layouts {
            missing.push("separate depth/stencil layouts");
        }
        if !self.supports_geometry_shader {
            missing.push("geometry shaders");
        }
        if !self.supports_shader_int64 {
            missing.push("64-bit shader integers");
        }
        // Shadow maps hold six layers per light.
        if (self.max_image_array_layers as usize)
            < umbra_core::constants::MAX_LIGHTS * umbra_core::constants::SHADOW_FACES
        {
            missing.push("enough image array layers for shadow maps");
        }
        // The largest push constant block is 152 bytes.
        if self.max_push_constants_size < 152 {
            missing.push("152 bytes of push constants");
        }
        missing
    }

    /// Check if the GPU meets minimum requirements for the renderer.
    pub fn meets_requirements(&self) -> bool {
        self.missing_requirements().is_empty()
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// Whether a packed API version is 1.3 or newer.
pub const fn api_at_least_1_3(api_version: u32) -> bool {
    let major = vk::api_version_major(api_version);
    let minor = vk::api_version_minor(api_version);
    major > 1 || (major == 1 && minor >= 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capable() -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Amd,
            device_name: "Test GPU".to_string(),
            api_version: vk::make_api_version(0, 1, 3, 250),
            driver_version: 1,
            supports_dynamic_rendering: true,
            supports_synchronization2: true,
            supports_buffer_device_address: true,
            supports_separate_depth_stencil_layouts: true,
            supports_geometry_shader: true,
            supports_shader_int64: true,
            device_local_memory_mb: 512,
            max_image_array_layers: 2048,
            max_push_constants_size: 256,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn api_version_gate() {
        assert!(api_at_least_1_3(vk::make_api_version(0, 1, 3, 0)));
        assert!(api_at_least_1_3(vk::make_api_version(0, 1, 4, 0)));
        assert!(!api_at_least_1_3(vk::make_api_version(0, 1, 2, 198)));
    }

    #[test]
    fn requirements_report_what_is_missing() {
        assert!(capable().meets_requirements());

        let mut caps = capable();
        caps.supports_geometry_shader = false;
        caps.max_push_constants_size = 128;
        let missing = caps.missing_requirements();
        assert_eq!(missing.len(), 2);
        assert!(missing.contains(&"geometry shaders"));
        assert!(!caps.meets_requirements());
    }

    #[test]
    fn depth_only_layouts_are_required() {
        let mut caps = capable();
        caps.supports_separate_depth_stencil_layouts = false;
        assert_eq!(caps.missing_requirements(), vec!["separate depth/stencil layouts"]);
        assert!(!caps.meets_requirements());
    }
}
