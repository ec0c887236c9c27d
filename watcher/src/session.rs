use ptz_motion_common::config::StreamConfig;
use ptz_motion_common::direction::Direction;
use ptz_motion_common::frame::PreparedFrame;
use ptz_motion_common::report::Reporter;
use ptz_motion_common::vision::{DiffBackend, Detector};
use std::time::Duration;
use tracing::info;

use crate::source::FrameSource;
use crate::WatchError;

/// What a watch run did before it stopped.
#[derive(Debug, Default)]
pub struct WatchSummary {
    pub frames_read: u64,
    pub comparisons: u32,
    /// One entry per comparison; `None` when nothing qualified as motion.
    pub directions: Vec<Option<Direction>>,
}

/// Compares live frames against the first frame grabbed.
///
/// The first frame becomes the reference and is followed by a settle pause.
/// Every later frame is compared against it until `comparisons` have run
/// (0 = no limit) or the source stops producing frames.
pub struct WatchSession<B> {
    detector: Detector<B>,
    reporter: Reporter,
    settle: Duration,
    comparisons: u32,
}

impl<B: DiffBackend> WatchSession<B> {
    pub fn new(detector: Detector<B>, reporter: Reporter, stream: &StreamConfig) -> Self {
        Self {
            detector,
            reporter,
            settle: stream.settle(),
            comparisons: stream.comparisons,
        }
    }

    pub async fn run<S: FrameSource>(&self, source: &mut S) -> Result<WatchSummary, WatchError> {
        let mut summary = WatchSummary::default();
        let mut reference: Option<PreparedFrame> = None;

        loop {
            let Some(frame) = source.next_frame().await? else {
                info!(source = source.describe(), "no frame grabbed, stopping");
                break;
            };
            summary.frames_read += 1;
            info!(
                seq = frame.seq,
                bytes = frame.jpeg.len(),
                captured_at = %frame.captured_at(),
                "frame read"
            );

            let Some(base) = reference.as_ref() else {
                let prepared = self.detector.prepare_frame(&frame)?;
                self.reporter.write_reference(&frame)?;
                reference = Some(prepared);
                info!(settle = ?self.settle, "reference frame stored, settling");
                tokio::time::sleep(self.settle).await;
                continue;
            };

            let current = self.detector.prepare_frame(&frame)?;
            let detection = self.detector.detect(base, &current)?;
            self.reporter.write_masks(&detection.delta, &detection.mask)?;
            match &detection.target {
                Some(target) => {
                    self.reporter.write_detection(&current.color, target)?;
                }
                None => self.reporter.clear_detection()?,
            }
            println!("{}", detection.label());

            summary.comparisons += 1;
            summary.directions.push(detection.direction);

            if self.comparisons != 0 && summary.comparisons >= self.comparisons {
                info!(comparisons = summary.comparisons, "comparison limit reached");
                break;
            }
        }

        Ok(summary)
    }
}
