use ptz_motion_common::frame::TimestampedFrame;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::source::{find_subsequence, FrameSource};
use crate::WatchError;

const SOI: &[u8] = &[0xFF, 0xD8];
const EOI: &[u8] = &[0xFF, 0xD9];

/// Splits a concatenated stream of JPEG images on start/end-of-image
/// markers. Entropy-coded JPEG data byte-stuffs 0xFF, so EOI only appears
/// at the end of an image.
#[derive(Default)]
pub struct JpegSplitter {
    buffer: Vec<u8>,
    /// Where to resume looking for EOI in the current image.
    scan_from: usize,
}

impl JpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn next_jpeg(&mut self) -> Option<Vec<u8>> {
        let Some(start) = find_subsequence(&self.buffer, SOI) else {
            // A trailing 0xFF may be the first half of the next SOI
            let keep = usize::from(self.buffer.last() == Some(&0xFF));
            let discard = self.buffer.len() - keep;
            self.buffer.drain(..discard);
            self.scan_from = 0;
            return None;
        };
        if start > 0 {
            self.buffer.drain(..start);
            self.scan_from = 0;
        }

        let from = self.scan_from.max(SOI.len());
        match find_subsequence(&self.buffer[from..], EOI) {
            Some(pos) => {
                let end = from + pos + EOI.len();
                let jpeg: Vec<u8> = self.buffer.drain(..end).collect();
                self.scan_from = 0;
                Some(jpeg)
            }
            None => {
                self.scan_from = self.buffer.len().saturating_sub(1).max(SOI.len());
                None
            }
        }
    }
}

/// RTSP camera read through an `ffmpeg` child process that re-encodes the
/// stream as MJPEG on stdout. The child is killed when the source is dropped.
pub struct FfmpegSource {
    url: String,
    _child: Child,
    stdout: ChildStdout,
    splitter: JpegSplitter,
    read_buf: Vec<u8>,
    seq: u64,
}

impl FfmpegSource {
    pub fn spawn(ffmpeg: &str, url: &str) -> Result<Self, WatchError> {
        let mut cmd = Command::new(ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error"]);
        if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
            cmd.args(["-rtsp_transport", "tcp"]);
        }
        cmd.args(["-i", url, "-f", "image2pipe", "-vcodec", "mjpeg", "-q:v", "2", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| WatchError::Spawn(ffmpeg.to_string(), e))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            WatchError::Spawn(
                ffmpeg.to_string(),
                std::io::Error::other("could not get stdout handle"),
            )
        })?;

        info!(ffmpeg, url, pid = child.id(), "ffmpeg reader started");

        Ok(Self {
            url: url.to_string(),
            _child: child,
            stdout,
            splitter: JpegSplitter::new(),
            read_buf: vec![0u8; 64 * 1024],
            seq: 0,
        })
    }
}

impl FrameSource for FfmpegSource {
    async fn next_frame(&mut self) -> Result<Option<TimestampedFrame>, WatchError> {
        loop {
            if let Some(jpeg) = self.splitter.next_jpeg() {
                let seq = self.seq;
                self.seq += 1;
                debug!(seq, bytes = jpeg.len(), "frame decoded by ffmpeg");
                return Ok(Some(TimestampedFrame::now(jpeg, seq)));
            }
            match self.stdout.read(&mut self.read_buf).await {
                Ok(0) => {
                    info!(url = self.url, "ffmpeg output ended");
                    return Ok(None);
                }
                Ok(n) => self.splitter.push(&self.read_buf[..n]),
                Err(e) => {
                    warn!(error = %e, url = self.url, "failed reading ffmpeg output");
                    return Ok(None);
                }
            }
        }
    }

    fn describe(&self) -> &str {
        &self.url
    }
}
