//! Test harness for the Umbra engine.
//!
//! Provides headless rendering of the deferred pipeline and image
//! comparison against stored baselines.

pub mod compare;
pub mod harness;

pub use compare::{diff_image, image_difference, VisualRegressionTest};
pub use harness::{camera_facing_origin, test_assets, HeadlessRenderer};

use std::path::PathBuf;

use thiserror::Error;
use umbra_gpu::GpuError;

#[derive(Error, Debug)]
pub enum TestError {
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
    #[error("Image comparison failed: {0}")]
    ImageComparison(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, TestError>;

/// Visual regression test configuration.
#[derive(Debug, Clone)]
pub struct VisualTestConfig {
    /// Largest accepted mean channel difference, 0.0 to 1.0.
    pub threshold: f64,
    pub baseline_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for VisualTestConfig {
    fn default() -> Self {
        Self {
            threshold: 0.001,
            baseline_dir: PathBuf::from("res/test_data/baselines"),
            output_dir: PathBuf::from("target/test_output"),
        }
    }
}
