//! Screenshot capture.
//!
//! Frames are picked by index on the command line and saved with the `image`
//! crate once the renderer has read them back.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgba};
use thiserror::Error;
use umbra_gpu::GpuError;

const DEFAULT_PATTERN: &str = "screenshot_{}.png";

/// Which frames to capture and where to put them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    /// Output path; `{}` is replaced by the frame number.
    pub output_pattern: String,
    pub frames: BTreeSet<u64>,
    /// Stop the application once the last requested frame is saved.
    pub exit_after_capture: bool,
}

impl ScreenshotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output(mut self, pattern: impl Into<String>) -> Self {
        self.enabled = true;
        self.output_pattern = pattern.into();
        self
    }

    #[must_use]
    pub fn with_frames(mut self, frames: impl IntoIterator<Item = u64>) -> Self {
        self.enabled = true;
        self.frames.extend(frames);
        self
    }

    #[must_use]
    pub const fn with_exit_after(mut self, exit: bool) -> Self {
        self.exit_after_capture = exit;
        self
    }

    pub fn output_path(&self, frame: u64) -> PathBuf {
        PathBuf::from(self.output_pattern.replace("{}", &frame.to_string()))
    }

    pub fn should_capture(&self, frame: u64) -> bool {
        self.enabled && self.frames.contains(&frame)
    }

    /// Whether every requested frame lies before `current_frame`.
    pub fn all_captured(&self, current_frame: u64) -> bool {
        self.enabled
            && self
                .frames
                .last()
                .is_some_and(|&last| current_frame > last)
    }

    /// Apply one command line flag.
    ///
    /// `value` is the argument following `flag`. Returns how many arguments
    /// were consumed: 0 if the flag is not a screenshot flag.
    pub fn apply_flag(&mut self, flag: &str, value: Option<&str>) -> usize {
        match (flag, value) {
            ("-S" | "--screenshot", _) => {
                self.enabled = true;
                1
            }
            ("-o" | "--output", Some(pattern)) => {
                self.output_pattern = pattern.to_string();
                2
            }
            ("-f" | "--frames", Some(list)) => {
                self.frames = parse_frame_indices(list);
                2
            }
            ("--exit-after", _) => {
                self.exit_after_capture = true;
                1
            }
            _ => 0,
        }
    }

    /// Fill in defaults once all flags are applied: frame 0 and
    /// `screenshot_{}.png`.
    pub fn finish(&mut self) {
        if !self.enabled {
            return;
        }
        if self.output_pattern.is_empty() {
            self.output_pattern = DEFAULT_PATTERN.to_string();
        }
        if self.frames.is_empty() {
            self.frames.insert(0);
        }
    }

    /// Parse every screenshot flag in `args`, skipping the program name and
    /// anything unrecognised.
    pub fn parse_args(args: &[String]) -> Self {
        let mut config = Self::default();
        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).map(String::as_str);
            i += config.apply_flag(&args[i], value).max(1);
        }
        config.finish();
        config
    }
}

/// Parse frame indices like `"0,5,10-15"`. Ranges are inclusive; malformed
/// parts are skipped.
pub fn parse_frame_indices(s: &str) -> BTreeSet<u64> {
    let mut frames = BTreeSet::new();
    for part in s.split(',').map(str::trim) {
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.trim().parse::<u64>(), end.trim().parse::<u64>()) {
                frames.extend(start..=end);
            }
        } else if let Ok(frame) = part.parse::<u64>() {
            frames.insert(frame);
        }
    }
    frames
}

/// Save tightly packed RGBA8 pixels; the format follows the extension.
pub fn save_screenshot(
    data: Vec<u8>,
    width: u32,
    height: u32,
    path: impl AsRef<Path>,
) -> Result<(), ScreenshotError> {
    let path = path.as_ref();
    let image = ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data)
        .ok_or(ScreenshotError::InvalidImageData { width, height })?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| ScreenshotError::SaveFailed(e.to_string()))?;
    }
    image
        .save(path)
        .map_err(|e| ScreenshotError::SaveFailed(e.to_string()))?;

    tracing::info!("Screenshot saved: {}", path.display());
    Ok(())
}

#[derive(Error, Debug)]
pub enum ScreenshotError {
    #[error("Failed to read screenshot data: {0}")]
    Readback(#[from] GpuError),
    #[error("Pixel data does not fit a {width}x{height} RGBA8 image")]
    InvalidImageData { width: u32, height: u32 },
    #[error("Failed to save screenshot: {0}")]
    SaveFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("viewer")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parse_frame_lists() {
        assert_eq!(parse_frame_indices("5"), BTreeSet::from([5]));
        assert_eq!(parse_frame_indices("0, 5,10"), BTreeSet::from([0, 5, 10]));
        assert_eq!(parse_frame_indices("3-6"), BTreeSet::from([3, 4, 5, 6]));
        assert_eq!(
            parse_frame_indices("0,5-7,x,10"),
            BTreeSet::from([0, 5, 6, 7, 10])
        );
    }

    #[test]
    fn screenshot_flag_gets_defaults() {
        let config = ScreenshotConfig::parse_args(&args(&["-S"]));
        assert!(config.enabled);
        assert_eq!(config.output_pattern, DEFAULT_PATTERN);
        assert_eq!(config.frames, BTreeSet::from([0]));
    }

    #[test]
    fn full_flag_set() {
        let config = ScreenshotConfig::parse_args(&args(&[
            "--screenshot",
            "--output",
            "out/frame_{}.png",
            "-f",
            "1-3",
            "--exit-after",
            "--unrelated",
        ]));
        assert_eq!(config.output_path(2), PathBuf::from("out/frame_2.png"));
        assert_eq!(config.frames, BTreeSet::from([1, 2, 3]));
        assert!(config.exit_after_capture);
        assert!(config.should_capture(3));
        assert!(!config.should_capture(4));
    }

    #[test]
    fn disabled_without_flag() {
        let config = ScreenshotConfig::parse_args(&args(&["-f", "4"]));
        assert!(!config.enabled);
        assert!(!config.should_capture(4));
        assert!(!config.all_captured(100));
    }

    #[test]
    fn all_captured_after_last_frame() {
        let config = ScreenshotConfig::new().with_frames([2, 7]);
        assert!(!config.all_captured(7));
        assert!(config.all_captured(8));
    }

    #[test]
    fn rejects_short_pixel_data() {
        let err = save_screenshot(vec![0; 10], 2, 2, "unused.png").unwrap_err();
        assert!(matches!(
            err,
            ScreenshotError::InvalidImageData {
                width: 2,
                height: 2
            }
        ));
    }
}
