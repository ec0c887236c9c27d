use image::{DynamicImage, GrayImage};

use crate::frame::PreparedFrame;
use crate::geometry::Contour;

/// Everything the differencing step produces for one pair of frames.
#[derive(Debug, Clone)]
pub struct DiffOutput {
    /// Per-pixel absolute difference.
    pub delta: GrayImage,
    /// Thresholded and dilated difference.
    pub mask: GrayImage,
    /// Outer borders of the connected regions in `mask`.
    pub contours: Vec<Contour>,
}

/// Image-processing operations the detector relies on.
///
/// Implementations own the pixel work; selection and classification stay
/// on the caller's side so they can run against any backend.
pub trait DiffBackend: Send + Sync {
    /// Grayscale conversion and smoothing.
    fn prepare(&self, image: &DynamicImage) -> PreparedFrame;

    /// Absolute difference, threshold, dilation and external contours.
    /// Both buffers have the same dimensions.
    fn difference(&self, base: &GrayImage, current: &GrayImage) -> DiffOutput;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
