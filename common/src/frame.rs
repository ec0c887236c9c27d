use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, ImageReader, RgbImage};
use std::io::Cursor;

/// An encoded JPEG frame pulled from a camera stream, with capture metadata.
#[derive(Debug, Clone)]
pub struct TimestampedFrame {
    pub jpeg: Vec<u8>,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl TimestampedFrame {
    pub fn new(jpeg: Vec<u8>, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            jpeg,
            captured_at_ms,
            seq,
        }
    }

    /// Stamp a frame with the current wall clock.
    pub fn now(jpeg: Vec<u8>, seq: u64) -> Self {
        Self::new(jpeg, Utc::now().timestamp_millis(), seq)
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.captured_at_ms).unwrap_or_else(Utc::now)
    }

    pub fn decode(&self) -> Result<DynamicImage, FrameError> {
        if self.jpeg.is_empty() {
            return Err(FrameError::Empty { seq: self.seq });
        }
        ImageReader::new(Cursor::new(self.jpeg.as_slice()))
            .with_guessed_format()
            .map_err(|e| FrameError::Decode {
                seq: self.seq,
                reason: e.to_string(),
            })?
            .decode()
            .map_err(|e| FrameError::Decode {
                seq: self.seq,
                reason: e.to_string(),
            })
    }
}

/// A decoded frame ready for differencing: the color original for
/// annotation plus the smoothed grayscale buffer the diff runs on.
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    pub color: RgbImage,
    pub gray: GrayImage,
}

impl PreparedFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        self.gray.dimensions()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame {seq} has no data")]
    Empty { seq: u64 },
    #[error("failed to decode frame {seq}: {reason}")]
    Decode { seq: u64, reason: String },
}
