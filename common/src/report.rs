use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{OutputConfig, MAX_BOX_THICKNESS};
use crate::frame::TimestampedFrame;
use crate::geometry::BoundingBox;

/// Writes the debug images a detection run leaves behind.
pub struct Reporter {
    config: OutputConfig,
}

impl Reporter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Copy of `frame` with the target outlined. Thicker outlines grow outward,
    /// capped at `MAX_BOX_THICKNESS` rings.
    pub fn annotate(&self, frame: &RgbImage, target: &BoundingBox) -> RgbImage {
        let mut canvas = frame.clone();
        let color = Rgb(self.config.box_color);
        for i in 0..self.config.box_thickness.min(MAX_BOX_THICKNESS) {
            let grow = i as i32;
            let rect = Rect::at(target.x - grow, target.y - grow)
                .of_size(target.width + 2 * i, target.height + 2 * i);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
        canvas
    }

    pub fn write_detection(
        &self,
        frame: &RgbImage,
        target: &BoundingBox,
    ) -> Result<PathBuf, ReportError> {
        let annotated = self.annotate(frame, target);
        let path = &self.config.detection;
        save_rgb(&annotated, path)?;
        info!(path = %path.display(), target = ?target, "detection image written");
        Ok(path.clone())
    }

    /// Drop a detection image left by an earlier comparison so it never
    /// outlives the frame it described.
    pub fn clear_detection(&self) -> Result<(), ReportError> {
        let path = &self.config.detection;
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "stale detection image removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ReportError::Write(path.display().to_string(), e)),
        }
    }

    /// Raw difference and threshold mask.
    pub fn write_masks(&self, delta: &GrayImage, mask: &GrayImage) -> Result<(), ReportError> {
        save_gray(delta, &self.config.delta)?;
        save_gray(mask, &self.config.threshold)?;
        debug!(
            delta = %self.config.delta.display(),
            threshold = %self.config.threshold.display(),
            "difference masks written"
        );
        Ok(())
    }

    /// The reference frame is already JPEG, so its bytes go to disk as-is.
    pub fn write_reference(&self, frame: &TimestampedFrame) -> Result<PathBuf, ReportError> {
        let path = &self.config.reference;
        std::fs::write(path, &frame.jpeg)
            .map_err(|e| ReportError::Write(path.display().to_string(), e))?;
        info!(path = %path.display(), seq = frame.seq, "reference snapshot written");
        Ok(path.clone())
    }
}

fn save_rgb(image: &RgbImage, path: &Path) -> Result<(), ReportError> {
    image
        .save(path)
        .map_err(|e| ReportError::Save(path.display().to_string(), e.to_string()))
}

fn save_gray(image: &GrayImage, path: &Path) -> Result<(), ReportError> {
    image
        .save(path)
        .map_err(|e| ReportError::Save(path.display().to_string(), e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to save image {0}: {1}")]
    Save(String, String),
    #[error("failed to write {0}: {1}")]
    Write(String, std::io::Error),
}
