use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::map_colors2;
use imageproc::morphology::dilate;
use tracing::debug;

use super::traits::{DiffBackend, DiffOutput};
use crate::config::DetectionConfig;
use crate::frame::PreparedFrame;
use crate::geometry::Contour;

/// `DiffBackend` built on `image` and `imageproc`.
///
/// Mirrors the classic OpenCV motion recipe: Gaussian blur with a sigma
/// derived from the kernel size, binary threshold, 3x3 dilation repeated
/// `dilate_iterations` times, outer contours only.
#[derive(Debug, Clone)]
pub struct ImageprocBackend {
    sigma: f32,
    threshold: u8,
    dilate_iterations: u8,
}

impl ImageprocBackend {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            sigma: sigma_for_kernel(config.blur_kernel),
            threshold: config.diff_threshold,
            dilate_iterations: config.dilate_iterations,
        }
    }
}

/// Sigma OpenCV picks for a Gaussian kernel of size `k` when none is given.
pub fn sigma_for_kernel(k: u32) -> f32 {
    0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

impl DiffBackend for ImageprocBackend {
    fn prepare(&self, image: &DynamicImage) -> PreparedFrame {
        let gray = gaussian_blur_f32(&image.to_luma8(), self.sigma);
        PreparedFrame {
            color: image.to_rgb8(),
            gray,
        }
    }

    fn difference(&self, base: &GrayImage, current: &GrayImage) -> DiffOutput {
        let delta: GrayImage =
            map_colors2(base, current, |a: Luma<u8>, b: Luma<u8>| Luma([a[0].abs_diff(b[0])]));
        let binary = threshold(&delta, self.threshold, ThresholdType::Binary);

        // k iterations of a 3x3 square dilation cover the same pixels as one
        // L-infinity dilation of radius k.
        let mask = if self.dilate_iterations > 0 {
            dilate(&binary, Norm::LInf, self.dilate_iterations)
        } else {
            binary
        };

        let contours: Vec<Contour> = find_contours::<i32>(&mask)
            .into_iter()
            .filter(|c| c.parent.is_none() && matches!(c.border_type, BorderType::Outer))
            .map(|c| Contour::new(c.points))
            .collect();

        debug!(
            width = mask.width(),
            height = mask.height(),
            contours = contours.len(),
            "difference computed"
        );

        DiffOutput {
            delta,
            mask,
            contours,
        }
    }

    fn name(&self) -> &str {
        "imageproc"
    }
}
