//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation failed.
    #[error("Shader module creation failed: {0}")]
    ShaderModule(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// Resource not found.
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Image file could not be decoded.
    #[error("Image decode failed: {0}")]
    ImageDecode(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Asset loading error.
    #[error(transparent)]
    Asset(#[from] umbra_core::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Whether this is the swapchain reporting it no longer matches the surface.
    pub const fn is_out_of_date(&self) -> bool {
        matches!(self, Self::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_detection() {
        assert!(GpuError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR).is_out_of_date());
        assert!(!GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST).is_out_of_date());
        assert!(!GpuError::NoSuitableDevice.is_out_of_date());
    }

    #[test]
    fn asset_errors_convert() {
        let err: GpuError = umbra_core::Error::MissingAsset("light.vert.spv".into()).into();
        assert!(matches!(err, GpuError::Asset(_)));
        assert_eq!(err.to_string(), "Asset missing: light.vert.spv");
    }
}
