use ptz_motion_common::config::{StreamConfig, StreamMode};
use ptz_motion_common::frame::TimestampedFrame;
use std::time::Duration;
use tracing::info;

use crate::mjpeg::{MjpegSource, SnapshotSource};
use crate::rtsp::FfmpegSource;
use crate::WatchError;

/// Something that yields camera frames one at a time.
///
/// `Ok(None)` means no frame could be grabbed and the caller should stop.
/// Errors are reserved for failures to reach the camera at all.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    async fn next_frame(&mut self) -> Result<Option<TimestampedFrame>, WatchError>;

    /// Human-readable origin for logging.
    fn describe(&self) -> &str {
        "unnamed"
    }
}

/// The configured camera stream.
pub enum StreamSource {
    Rtsp(FfmpegSource),
    Mjpeg(MjpegSource),
    Snapshot(SnapshotSource),
}

impl StreamSource {
    pub async fn open(config: &StreamConfig) -> Result<Self, WatchError> {
        let mode = config.mode.resolve(&config.url);
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        info!(url = config.url, mode = ?mode, "opening camera stream");

        Ok(match mode {
            StreamMode::Rtsp => StreamSource::Rtsp(FfmpegSource::spawn(&config.ffmpeg, &config.url)?),
            StreamMode::Snapshot => StreamSource::Snapshot(SnapshotSource::open(&config.url, timeout)?),
            StreamMode::Mjpeg | StreamMode::Auto => {
                StreamSource::Mjpeg(MjpegSource::open(&config.url, timeout).await?)
            }
        })
    }
}

impl FrameSource for StreamSource {
    async fn next_frame(&mut self) -> Result<Option<TimestampedFrame>, WatchError> {
        match self {
            StreamSource::Rtsp(s) => s.next_frame().await,
            StreamSource::Mjpeg(s) => s.next_frame().await,
            StreamSource::Snapshot(s) => s.next_frame().await,
        }
    }

    fn describe(&self) -> &str {
        match self {
            StreamSource::Rtsp(s) => s.describe(),
            StreamSource::Mjpeg(s) => s.describe(),
            StreamSource::Snapshot(s) => s.describe(),
        }
    }
}

/// Find the position of `needle` in `haystack`.
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
