//! Per-frame context and frame timing.

use std::time::Duration;

use umbra_gpu::{GpuImage, VulkanRecorder};

/// The frame being recorded.
pub struct FrameContext<'a> {
    /// Records into the current frame slot's command buffer.
    pub recorder: VulkanRecorder<'a>,
    /// Frame slot index, `frame_number % frames_in_flight`.
    pub slot: usize,
    pub image_index: u32,
    /// The acquired swapchain image, in `UNDEFINED` layout.
    pub swapchain_image: GpuImage,
    /// Seconds since the previous frame.
    pub dt: f32,
    pub frame_number: u64,
}

/// Frame rate statistics, logged at shutdown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub frames: u64,
    pub min_fps: f64,
    pub max_fps: f64,
    fps_sum: f64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self {
            frames: 0,
            min_fps: f64::MAX,
            max_fps: 0.0,
            fps_sum: 0.0,
        }
    }
}

impl FrameStats {
    /// Record one frame of duration `dt`. Zero-length frames are ignored.
    pub fn record(&mut self, dt: Duration) {
        let seconds = dt.as_secs_f64();
        if seconds <= 0.0 {
            return;
        }
        let fps = 1.0 / seconds;
        self.frames += 1;
        self.min_fps = self.min_fps.min(fps);
        self.max_fps = self.max_fps.max(fps);
        self.fps_sum += fps;
    }

    pub fn average_fps(&self) -> Option<f64> {
        (self.frames > 0).then(|| self.fps_sum / self.frames as f64)
    }

    pub fn log(&self) {
        let Some(avg) = self.average_fps() else {
            return;
        };
        tracing::info!("FPS Statistics:");
        tracing::info!("  Min: {:.1}", self.min_fps);
        tracing::info!("  Max: {:.1}", self.max_fps);
        tracing::info!("  Avg: {:.1}", avg);
        tracing::info!("  Total frames: {}", self.frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn tracks_min_max_average() {
        let mut stats = FrameStats::default();
        stats.record(Duration::from_millis(10));
        stats.record(Duration::from_millis(20));
        stats.record(Duration::ZERO);

        assert_eq!(stats.frames, 2);
        assert_relative_eq!(stats.min_fps, 50.0, epsilon = 1e-9);
        assert_relative_eq!(stats.max_fps, 100.0, epsilon = 1e-9);
        assert_relative_eq!(stats.average_fps().unwrap_or_default(), 75.0, epsilon = 1e-9);
    }

    #[test]
    fn no_average_without_frames() {
        assert_eq!(FrameStats::default().average_fps(), None);
    }
}
