pub mod backend;
pub mod select;
pub mod traits;

use image::{DynamicImage, GrayImage, ImageReader};
use std::path::Path;
use tracing::{debug, info};

pub use backend::ImageprocBackend;
pub use select::find_max;
pub use traits::{DiffBackend, DiffOutput};

use crate::config::DetectionConfig;
use crate::direction::{Classifier, Direction};
use crate::frame::{FrameError, PreparedFrame, TimestampedFrame};
use crate::geometry::BoundingBox;

/// Outcome of comparing one frame against the reference.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Box around the largest qualifying region, if any.
    pub target: Option<BoundingBox>,
    /// Set whenever `target` is.
    pub direction: Option<Direction>,
    pub contour_count: usize,
    pub delta: GrayImage,
    pub mask: GrayImage,
}

impl Detection {
    /// Console label: the direction, or `None` when nothing moved enough.
    pub fn label(&self) -> &'static str {
        match self.direction {
            Some(direction) => direction.label(),
            None => "None",
        }
    }
}

/// Runs a `DiffBackend` and turns its contours into a pan direction.
pub struct Detector<B> {
    backend: B,
    classifier: Classifier,
    min_area: f64,
}

impl<B: DiffBackend> Detector<B> {
    pub fn new(backend: B, config: &DetectionConfig) -> Self {
        Self {
            backend,
            classifier: Classifier::new(config.limit_perc, config.down_left_axis),
            min_area: config.min_area,
        }
    }

    pub fn prepare(&self, image: &DynamicImage) -> PreparedFrame {
        self.backend.prepare(image)
    }

    /// Read an image file and prepare it.
    pub fn load(&self, path: &Path) -> Result<PreparedFrame, DetectError> {
        let image = ImageReader::open(path)
            .map_err(|e| DetectError::Load(path.display().to_string(), e.to_string()))?
            .with_guessed_format()
            .map_err(|e| DetectError::Load(path.display().to_string(), e.to_string()))?
            .decode()
            .map_err(|e| DetectError::Load(path.display().to_string(), e.to_string()))?;
        debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "image loaded"
        );
        Ok(self.prepare(&image))
    }

    /// Decode a stream frame and prepare it.
    pub fn prepare_frame(&self, frame: &TimestampedFrame) -> Result<PreparedFrame, DetectError> {
        let image = frame.decode()?;
        Ok(self.prepare(&image))
    }

    pub fn detect(
        &self,
        base: &PreparedFrame,
        current: &PreparedFrame,
    ) -> Result<Detection, DetectError> {
        if base.dimensions() != current.dimensions() {
            return Err(DetectError::SizeMismatch {
                base: base.dimensions(),
                current: current.dimensions(),
            });
        }

        let DiffOutput {
            delta,
            mask,
            contours,
        } = self.backend.difference(&base.gray, &current.gray);

        let (screen_w, screen_h) = current.dimensions();
        let target = find_max(&contours, self.min_area).and_then(|c| c.bounding_box());
        let direction = target
            .as_ref()
            .map(|t| self.classifier.classify(t, screen_w, screen_h));

        info!(
            backend = self.backend.name(),
            contours = contours.len(),
            target = ?target,
            direction = direction.map(Direction::label),
            "frame comparison"
        );

        Ok(Detection {
            target,
            direction,
            contour_count: contours.len(),
            delta,
            mask,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("failed to load image {0}: {1}")]
    Load(String, String),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("frame sizes differ: reference is {base:?}, current is {current:?}")]
    SizeMismatch {
        base: (u32, u32),
        current: (u32, u32),
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::DownLeftAxis;
    use crate::geometry::{rect_contour, Contour};
    use image::RgbImage;

    /// Returns a fixed set of contours regardless of pixels.
    struct FixedContours(Vec<Contour>);

    impl DiffBackend for FixedContours {
        fn prepare(&self, image: &DynamicImage) -> PreparedFrame {
            PreparedFrame {
                color: image.to_rgb8(),
                gray: image.to_luma8(),
            }
        }

        fn difference(&self, base: &GrayImage, _current: &GrayImage) -> DiffOutput {
            DiffOutput {
                delta: base.clone(),
                mask: base.clone(),
                contours: self.0.clone(),
            }
        }
    }

    fn blank(w: u32, h: u32) -> PreparedFrame {
        PreparedFrame {
            color: RgbImage::new(w, h),
            gray: GrayImage::new(w, h),
        }
    }

    fn detector(contours: Vec<Contour>) -> Detector<FixedContours> {
        Detector::new(FixedContours(contours), &DetectionConfig::default())
    }

    #[test]
    fn largest_region_drives_direction() {
        // 1000x1000, margin 100. The big box centers near the top-right corner.
        let d = detector(vec![
            rect_contour(400, 400, 30, 30),
            rect_contour(920, 10, 60, 60),
        ]);
        let detection = d.detect(&blank(1000, 1000), &blank(1000, 1000)).unwrap();
        assert_eq!(detection.direction, Some(Direction::UpRight));
        assert_eq!(detection.label(), "UpRight");
        assert_eq!(detection.target, Some(BoundingBox::new(920, 10, 61, 61)));
        assert_eq!(detection.contour_count, 2);
    }

    #[test]
    fn small_regions_give_no_direction() {
        let d = detector(vec![rect_contour(0, 0, 10, 10)]);
        let detection = d.detect(&blank(640, 480), &blank(640, 480)).unwrap();
        assert!(detection.target.is_none());
        assert!(detection.direction.is_none());
        assert_eq!(detection.label(), "None");
    }

    #[test]
    fn centered_region_has_empty_label() {
        let d = detector(vec![rect_contour(300, 220, 40, 40)]);
        let detection = d.detect(&blank(640, 480), &blank(640, 480)).unwrap();
        assert_eq!(detection.direction, Some(Direction::Center));
        assert_eq!(detection.label(), "");
    }

    #[test]
    fn screen_size_comes_from_the_frame() {
        // 1280x720 with the corrected DownLeft axis: bottom-left box reports DownLeft.
        let config = DetectionConfig {
            down_left_axis: DownLeftAxis::Height,
            ..DetectionConfig::default()
        };
        let d = Detector::new(FixedContours(vec![rect_contour(10, 660, 40, 40)]), &config);
        let detection = d.detect(&blank(1280, 720), &blank(1280, 720)).unwrap();
        assert_eq!(detection.direction, Some(Direction::DownLeft));

        // Same box with the historical axis falls through to Left.
        let d = detector(vec![rect_contour(10, 660, 40, 40)]);
        let detection = d.detect(&blank(1280, 720), &blank(1280, 720)).unwrap();
        assert_eq!(detection.direction, Some(Direction::Left));
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let d = detector(vec![]);
        let result = d.detect(&blank(640, 480), &blank(320, 240));
        assert!(matches!(
            result,
            Err(DetectError::SizeMismatch {
                base: (640, 480),
                current: (320, 240)
            })
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let d = detector(vec![]);
        let err = d.load(Path::new("/nonexistent/base.jpg")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/base.jpg"));
    }

    #[test]
    fn end_to_end_with_imageproc() {
        use image::Rgb;

        let config = DetectionConfig {
            limit_perc: 0.25,
            ..DetectionConfig::default()
        };
        let d = Detector::new(ImageprocBackend::new(&config), &config);

        let base = d.prepare(&DynamicImage::ImageRgb8(RgbImage::new(400, 400)));
        let mut moved = RgbImage::new(400, 400);
        for y in 300..360 {
            for x in 300..360 {
                moved.put_pixel(x, y, Rgb([200, 200, 200]));
            }
        }
        let current = d.prepare(&DynamicImage::ImageRgb8(moved));

        let detection = d.detect(&base, &current).unwrap();
        assert_eq!(detection.direction, Some(Direction::DownRight));
        assert_eq!(detection.contour_count, 1);
    }
}
