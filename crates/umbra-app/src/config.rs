//! Application configuration.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Frame rate cap; `None` for unlimited.
    pub target_fps: Option<u32>,
    pub vsync: bool,
    /// Vulkan validation layers; on in debug builds by default.
    pub validation: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Umbra".to_string(),
            width: 800,
            height: 800,
            target_fps: None,
            vsync: true,
            validation: cfg!(debug_assertions),
        }
    }
}

impl AppConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub const fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    #[must_use]
    pub const fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    #[must_use]
    pub const fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Minimum time per frame under the frame rate cap.
    pub fn frame_budget(&self) -> Option<Duration> {
        self.target_fps
            .filter(|&fps| fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!((config.width, config.height), (800, 800));
        assert!(config.vsync);
        assert_eq!(config.validation, cfg!(debug_assertions));
        assert_eq!(config.frame_budget(), None);
    }

    #[test]
    fn builder_overrides() {
        let config = AppConfig::new("test")
            .with_size(1280, 720)
            .with_vsync(false)
            .with_validation(true)
            .with_target_fps(50);
        assert_eq!(config.title, "test");
        assert_eq!((config.width, config.height), (1280, 720));
        assert!(!config.vsync);
        assert!(config.validation);
        assert_eq!(config.frame_budget(), Some(Duration::from_millis(20)));
    }

    #[test]
    fn zero_fps_means_uncapped() {
        assert_eq!(AppConfig::default().with_target_fps(0).frame_budget(), None);
    }
}
