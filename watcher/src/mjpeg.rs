use bytes::{Buf, Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use ptz_motion_common::frame::TimestampedFrame;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::source::{find_subsequence, FrameSource};
use crate::WatchError;

const DEFAULT_BOUNDARY: &str = "frame";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Parse state for a `multipart/x-mixed-replace` body.
enum ParseState {
    /// Looking for the boundary marker `--<boundary>\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of part headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for an MJPEG multipart body. Feed it chunks as they
/// arrive and pull complete JPEG parts out.
pub struct MultipartParser {
    boundary: Vec<u8>,
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl MultipartParser {
    /// `boundary` may be given with or without its leading `--`.
    pub fn new(boundary: &str) -> Self {
        let name = boundary.strip_prefix("--").unwrap_or(boundary);
        Self {
            boundary: format!("--{name}\r\n").into_bytes(),
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete part, or `None` until more data is pushed.
    pub fn next_jpeg(&mut self) -> Option<Vec<u8>> {
        let marker_len = self.boundary.len();
        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, &self.boundary) {
                        self.buffer.advance(pos + marker_len);
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep the tail in case the boundary spans chunks
                        if self.buffer.len() > marker_len {
                            self.buffer.advance(self.buffer.len() - marker_len);
                        }
                        return None;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    let pos = find_subsequence(&self.buffer, HEADER_END)?;
                    self.buffer.advance(pos + HEADER_END.len());
                    self.jpeg_start = 0;
                    self.state = ParseState::CollectingJpeg;
                }
                ParseState::CollectingJpeg => {
                    let Some(pos) =
                        find_subsequence(&self.buffer[self.jpeg_start..], &self.boundary)
                    else {
                        // Skip re-scanning what we've already seen
                        self.jpeg_start = self.buffer.len().saturating_sub(marker_len);
                        return None;
                    };

                    let jpeg_end = self.jpeg_start + pos;
                    // Strip trailing \r\n before the boundary
                    let end = if self.buffer[..jpeg_end].ends_with(b"\r\n") {
                        jpeg_end - 2
                    } else {
                        jpeg_end
                    };
                    let jpeg = self.buffer[..end].to_vec();
                    self.buffer.advance(jpeg_end + marker_len);
                    self.state = ParseState::SeekingHeaderEnd;

                    if !jpeg.is_empty() {
                        return Some(jpeg);
                    }
                }
            }
        }
    }
}

/// Boundary parameter of a `Content-Type` header value, without quotes.
pub fn boundary_from_content_type(value: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let (key, val) = param.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            let val = val.trim().trim_matches('"');
            (!val.is_empty()).then(|| val.to_string())
        } else {
            None
        }
    })
}

/// Live MJPEG-over-HTTP stream.
pub struct MjpegSource {
    url: String,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    parser: MultipartParser,
    seq: u64,
}

impl MjpegSource {
    pub async fn open(url: &str, connect_timeout: Duration) -> Result<Self, WatchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(WatchError::HttpConnect)?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(WatchError::HttpConnect)?;

        if !response.status().is_success() {
            return Err(WatchError::HttpStatus(response.status().as_u16()));
        }

        let boundary = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_from_content_type)
            .unwrap_or_else(|| DEFAULT_BOUNDARY.to_string());

        info!(status = %response.status(), url, boundary = %boundary, "connected to MJPEG stream");

        Ok(Self {
            url: url.to_string(),
            body: response.bytes_stream().boxed(),
            parser: MultipartParser::new(&boundary),
            seq: 0,
        })
    }
}

impl FrameSource for MjpegSource {
    async fn next_frame(&mut self) -> Result<Option<TimestampedFrame>, WatchError> {
        loop {
            if let Some(jpeg) = self.parser.next_jpeg() {
                let seq = self.seq;
                self.seq += 1;
                debug!(seq, bytes = jpeg.len(), "MJPEG part received");
                return Ok(Some(TimestampedFrame::now(jpeg, seq)));
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.parser.push(&chunk),
                Some(Err(e)) => {
                    warn!(error = %e, url = self.url, "MJPEG stream error");
                    return Ok(None);
                }
                None => {
                    info!(url = self.url, "MJPEG stream ended");
                    return Ok(None);
                }
            }
        }
    }

    fn describe(&self) -> &str {
        &self.url
    }
}

/// One HTTP GET per frame, for cameras that expose a still-image endpoint.
pub struct SnapshotSource {
    client: reqwest::Client,
    url: String,
    seq: u64,
}

impl SnapshotSource {
    pub fn open(url: &str, connect_timeout: Duration) -> Result<Self, WatchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(WatchError::HttpConnect)?;
        Ok(Self {
            client,
            url: url.to_string(),
            seq: 0,
        })
    }
}

impl FrameSource for SnapshotSource {
    /// A failure on the very first request means the camera is unreachable
    /// and is returned as an error; later failures end the stream.
    async fn next_frame(&mut self) -> Result<Option<TimestampedFrame>, WatchError> {
        let first = self.seq == 0;
        let response = match self.client.get(&self.url).send().await {
            Ok(resp) => resp,
            Err(e) if first => return Err(WatchError::HttpConnect(e)),
            Err(e) => {
                warn!(error = %e, url = self.url, "failed to fetch camera frame");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            if first {
                return Err(WatchError::HttpStatus(response.status().as_u16()));
            }
            warn!(status = %response.status(), "non-success response from camera");
            return Ok(None);
        }

        match response.bytes().await {
            Ok(body) => {
                let seq = self.seq;
                self.seq += 1;
                Ok(Some(TimestampedFrame::now(body.to_vec(), seq)))
            }
            Err(e) => {
                warn!(error = %e, "failed to read camera frame body");
                Ok(None)
            }
        }
    }

    fn describe(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(body: &[u8]) -> Vec<u8> {
        let mut out = b"--frame\r\nContent-Type: image/jpeg\r\n".to_vec();
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\r\n");
        out
    }

    #[test]
    fn splits_consecutive_parts() {
        let mut stream = part(b"\xFF\xD8first\xFF\xD9");
        stream.extend(part(b"\xFF\xD8second\xFF\xD9"));
        stream.extend_from_slice(b"--frame\r\n");

        let mut parser = MultipartParser::new("frame");
        parser.push(&stream);
        assert_eq!(parser.next_jpeg().unwrap(), b"\xFF\xD8first\xFF\xD9");
        assert_eq!(parser.next_jpeg().unwrap(), b"\xFF\xD8second\xFF\xD9");
        assert!(parser.next_jpeg().is_none());
    }

    #[test]
    fn survives_byte_by_byte_delivery() {
        let mut stream = part(b"alpha");
        stream.extend(part(b"beta"));
        stream.extend_from_slice(b"--frame\r\n");

        let mut parser = MultipartParser::new("frame");
        let mut got = Vec::new();
        for byte in &stream {
            parser.push(std::slice::from_ref(byte));
            while let Some(jpeg) = parser.next_jpeg() {
                got.push(jpeg);
            }
        }
        assert_eq!(got, vec![b"alpha".to_vec(), b"beta".to_vec()]);
    }

    #[test]
    fn incomplete_part_waits_for_more() {
        let mut parser = MultipartParser::new("frame");
        parser.push(&part(b"pending"));
        assert!(parser.next_jpeg().is_none());
        parser.push(b"--frame\r\n");
        assert_eq!(parser.next_jpeg().unwrap(), b"pending");
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let mut stream = b"HTTP noise before the first part".to_vec();
        stream.extend(part(b"payload"));
        stream.extend_from_slice(b"--frame\r\n");
        let mut parser = MultipartParser::new("--frame");
        parser.push(&stream);
        assert_eq!(parser.next_jpeg().unwrap(), b"payload");
    }

    #[test]
    fn custom_boundary() {
        let mut parser = MultipartParser::new("myboundary");
        parser.push(b"--myboundary\r\nContent-Type: image/jpeg\r\n\r\nxyz\r\n--myboundary\r\n");
        assert_eq!(parser.next_jpeg().unwrap(), b"xyz");
    }

    #[test]
    fn boundary_parameter_parsing() {
        assert_eq!(
            boundary_from_content_type("multipart/x-mixed-replace; boundary=frame").as_deref(),
            Some("frame")
        );
        assert_eq!(
            boundary_from_content_type("multipart/x-mixed-replace;Boundary=\"--cam\"").as_deref(),
            Some("--cam")
        );
        assert_eq!(boundary_from_content_type("image/jpeg"), None);
        assert_eq!(boundary_from_content_type("multipart/x-mixed-replace; boundary="), None);
    }

    mod http {
        use super::*;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        const TIMEOUT: Duration = Duration::from_secs(5);

        /// Answers one connection per canned response, then stops listening.
        async fn serve(responses: Vec<Vec<u8>>) -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                for response in responses {
                    let (mut socket, _) = listener.accept().await.unwrap();
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while find_subsequence(&request, HEADER_END).is_none() {
                        let n = socket.read(&mut buf).await.unwrap();
                        if n == 0 {
                            break;
                        }
                        request.extend_from_slice(&buf[..n]);
                    }
                    socket.write_all(&response).await.unwrap();
                    socket.shutdown().await.ok();
                }
            });
            format!("http://{addr}/video")
        }

        fn not_found() -> Vec<u8> {
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec()
        }

        fn jpeg_response(body: &[u8]) -> Vec<u8> {
            let mut out = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .into_bytes();
            out.extend_from_slice(body);
            out
        }

        #[tokio::test]
        async fn stream_open_rejects_error_status() {
            let url = serve(vec![not_found()]).await;
            let result = MjpegSource::open(&url, TIMEOUT).await;
            assert!(matches!(result, Err(WatchError::HttpStatus(404))));
        }

        #[tokio::test]
        async fn stream_open_fails_when_nothing_listens() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);
            let result = MjpegSource::open(&format!("http://{addr}/video"), TIMEOUT).await;
            assert!(matches!(result, Err(WatchError::HttpConnect(_))));
        }

        #[tokio::test]
        async fn stream_uses_advertised_boundary() {
            let mut response = b"HTTP/1.1 200 OK\r\n\
                Content-Type: multipart/x-mixed-replace; boundary=camfeed\r\n\
                Connection: close\r\n\r\n"
                .to_vec();
            for body in [&b"\xFF\xD8one\xFF\xD9"[..], &b"\xFF\xD8two\xFF\xD9"[..]] {
                response.extend_from_slice(b"--camfeed\r\nContent-Type: image/jpeg\r\n\r\n");
                response.extend_from_slice(body);
                response.extend_from_slice(b"\r\n");
            }
            response.extend_from_slice(b"--camfeed\r\n");

            let url = serve(vec![response]).await;
            let mut source = MjpegSource::open(&url, TIMEOUT).await.unwrap();

            let first = source.next_frame().await.unwrap().unwrap();
            assert_eq!((first.seq, first.jpeg.as_slice()), (0, &b"\xFF\xD8one\xFF\xD9"[..]));
            let second = source.next_frame().await.unwrap().unwrap();
            assert_eq!((second.seq, second.jpeg.as_slice()), (1, &b"\xFF\xD8two\xFF\xD9"[..]));
            assert!(source.next_frame().await.unwrap().is_none());
        }

        #[tokio::test]
        async fn snapshot_first_failure_is_an_error() {
            let url = serve(vec![not_found()]).await;
            let mut source = SnapshotSource::open(&url, TIMEOUT).unwrap();
            let result = source.next_frame().await;
            assert!(matches!(result, Err(WatchError::HttpStatus(404))));
        }

        #[tokio::test]
        async fn snapshot_later_status_failure_ends_stream() {
            let url = serve(vec![jpeg_response(b"\xFF\xD8snap\xFF\xD9"), not_found()]).await;
            let mut source = SnapshotSource::open(&url, TIMEOUT).unwrap();

            let frame = source.next_frame().await.unwrap().unwrap();
            assert_eq!(frame.jpeg, b"\xFF\xD8snap\xFF\xD9");
            assert!(source.next_frame().await.unwrap().is_none());
        }

        #[tokio::test]
        async fn snapshot_later_connect_failure_ends_stream() {
            let url = serve(vec![jpeg_response(b"\xFF\xD8snap\xFF\xD9")]).await;
            let mut source = SnapshotSource::open(&url, TIMEOUT).unwrap();

            assert!(source.next_frame().await.unwrap().is_some());
            assert!(source.next_frame().await.unwrap().is_none());
        }
    }
}
