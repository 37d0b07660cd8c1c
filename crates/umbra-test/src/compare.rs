//! Image comparison against stored baselines.

use image::{Rgba, RgbaImage};

use crate::harness::HeadlessRenderer;
use crate::{Result, TestError, VisualTestConfig};
use umbra_render::{Camera, Scene};

/// Channel difference above which a pixel is marked in a diff image.
const DIFF_MARK: u8 = 10;

/// Mean absolute RGB difference, normalized to 0.0 to 1.0.
pub fn image_difference(a: &RgbaImage, b: &RgbaImage) -> Result<f64> {
    if a.dimensions() != b.dimensions() {
        return Err(TestError::ImageComparison(format!(
            "Image dimensions don't match: {:?} vs {:?}",
            a.dimensions(),
            b.dimensions()
        )));
    }

    let total: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| {
            (0..3)
                .map(|c| u64::from(pa[c].abs_diff(pb[c])))
                .sum::<u64>()
        })
        .sum();

    let max = u64::from(a.width()) * u64::from(a.height()) * 3 * 255;
    if max == 0 {
        return Ok(0.0);
    }
    Ok(total as f64 / max as f64)
}

/// `a` dimmed, with pixels that differ noticeably from `b` in red.
pub fn diff_image(a: &RgbaImage, b: &RgbaImage) -> RgbaImage {
    RgbaImage::from_fn(a.width(), a.height(), |x, y| {
        let pa = a.get_pixel(x, y);
        let differs = b
            .get_pixel_checked(x, y)
            .map_or(true, |pb| (0..3).any(|c| pa[c].abs_diff(pb[c]) > DIFF_MARK));
        if differs {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([pa[0] / 2, pa[1] / 2, pa[2] / 2, 255])
        }
    })
}

/// Renders scenes headlessly and compares them with baseline images.
///
/// A missing baseline is created from the first render.
pub struct VisualRegressionTest {
    config: VisualTestConfig,
    renderer: HeadlessRenderer,
}

impl VisualRegressionTest {
    pub fn new(config: VisualTestConfig, scene: Scene) -> Result<Self> {
        Self::with_dimensions(config, scene, 256, 256)
    }

    pub fn with_dimensions(
        config: VisualTestConfig,
        scene: Scene,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let renderer = HeadlessRenderer::new(width, height, scene)?;
        Ok(Self { config, renderer })
    }

    /// Render at `time_ms` and compare with the baseline called `name`.
    pub fn run_test(&mut self, name: &str, camera: &Camera, time_ms: f64) -> Result<()> {
        let image = self.renderer.render(camera, time_ms)?;
        self.compare_and_save(name, &image)
    }

    fn compare_and_save(&self, name: &str, image: &RgbaImage) -> Result<()> {
        std::fs::create_dir_all(&self.config.baseline_dir)?;
        std::fs::create_dir_all(&self.config.output_dir)?;

        let file = format!("{name}.png");
        let baseline_path = self.config.baseline_dir.join(&file);
        let output_path = self.config.output_dir.join(&file);
        image.save(&output_path)?;

        if !baseline_path.exists() {
            image.save(&baseline_path)?;
            tracing::info!("Created new baseline: {}", baseline_path.display());
            return Ok(());
        }

        let baseline = image::open(&baseline_path)?.to_rgba8();
        let difference = image_difference(&baseline, image)?;
        if difference > self.config.threshold {
            let diff_path = self.config.output_dir.join(format!("{name}_diff.png"));
            diff_image(&baseline, image).save(&diff_path)?;
            return Err(TestError::ImageComparison(format!(
                "Image difference {difference:.4} exceeds threshold {:.4} (see {})",
                self.config.threshold,
                diff_path.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::camera_facing_origin;
    use approx::assert_relative_eq;

    fn solid(width: u32, height: u32, value: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([value, value, value, 255]))
    }

    #[test]
    fn identical_images_do_not_differ() {
        let a = solid(4, 4, 90);
        assert_relative_eq!(image_difference(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn black_and_white_differ_fully() {
        let difference = image_difference(&solid(2, 2, 0), &solid(2, 2, 255)).unwrap();
        assert_relative_eq!(difference, 1.0);
    }

    #[test]
    fn alpha_is_ignored() {
        let a = solid(1, 1, 100);
        let b = RgbaImage::from_pixel(1, 1, Rgba([100, 100, 100, 0]));
        assert_relative_eq!(image_difference(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let err = image_difference(&solid(2, 2, 0), &solid(3, 2, 0)).unwrap_err();
        assert!(matches!(err, TestError::ImageComparison(_)));
    }

    #[test]
    fn diff_marks_changed_pixels() {
        let a = solid(2, 1, 200);
        let mut b = a.clone();
        b.put_pixel(1, 0, Rgba([0, 200, 200, 255]));

        let diff = diff_image(&a, &b);
        assert_eq!(diff.get_pixel(0, 0).0, [100, 100, 100, 255]);
        assert_eq!(diff.get_pixel(1, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    #[ignore = "Requires GPU hardware"]
    fn demo_scene_matches_baseline() {
        let mut test =
            VisualRegressionTest::new(VisualTestConfig::default(), Scene::demo()).unwrap();
        test.run_test("demo_scene", &camera_facing_origin(1.0), 0.0)
            .unwrap();
    }
}
