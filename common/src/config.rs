use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::direction::DownLeftAxis;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Reference and current images for the still-image detector.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_path")]
    pub base: PathBuf,
    #[serde(default = "default_current_path")]
    pub current: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_url")]
    pub url: String,
    #[serde(default)]
    pub mode: StreamMode,
    /// Pause after the reference frame is captured.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: f64,
    /// Number of comparisons before the watcher stops. 0 = until the stream ends.
    #[serde(default = "default_comparisons")]
    pub comparisons: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    /// Pick from the URL scheme: rtsp:// uses ffmpeg, http(s):// is read as MJPEG.
    #[default]
    Auto,
    Rtsp,
    Mjpeg,
    Snapshot,
}

impl StreamMode {
    /// Resolve `Auto` against a concrete URL.
    pub fn resolve(self, url: &str) -> StreamMode {
        match self {
            StreamMode::Auto if url.starts_with("rtsp://") || url.starts_with("rtsps://") => {
                StreamMode::Rtsp
            }
            StreamMode::Auto => StreamMode::Mjpeg,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Gaussian kernel edge length in pixels, must be odd.
    #[serde(default = "default_blur_kernel")]
    pub blur_kernel: u32,
    #[serde(default = "default_diff_threshold")]
    pub diff_threshold: u8,
    #[serde(default = "default_dilate_iterations")]
    pub dilate_iterations: u8,
    /// Contours smaller than this are treated as noise.
    #[serde(default = "default_min_area")]
    pub min_area: f64,
    /// Margin band along each edge, as a fraction of the frame dimension.
    #[serde(default = "default_limit_perc")]
    pub limit_perc: f64,
    #[serde(default)]
    pub down_left_axis: DownLeftAxis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_detection_path")]
    pub detection: PathBuf,
    #[serde(default = "default_reference_path")]
    pub reference: PathBuf,
    #[serde(default = "default_delta_path")]
    pub delta: PathBuf,
    #[serde(default = "default_threshold_path")]
    pub threshold: PathBuf,
    #[serde(default = "default_box_color")]
    pub box_color: [u8; 3],
    #[serde(default = "default_box_thickness")]
    pub box_thickness: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base: default_base_path(),
            current: default_current_path(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            mode: StreamMode::default(),
            settle_secs: default_settle_secs(),
            comparisons: default_comparisons(),
            connect_timeout_secs: default_connect_timeout(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

impl StreamConfig {
    /// Settle pause as a `Duration`. Values `validate` rejects map to zero.
    pub fn settle(&self) -> Duration {
        Duration::try_from_secs_f64(self.settle_secs).unwrap_or(Duration::ZERO)
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            blur_kernel: default_blur_kernel(),
            diff_threshold: default_diff_threshold(),
            dilate_iterations: default_dilate_iterations(),
            min_area: default_min_area(),
            limit_perc: default_limit_perc(),
            down_left_axis: DownLeftAxis::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            detection: default_detection_path(),
            reference: default_reference_path(),
            delta: default_delta_path(),
            threshold: default_threshold_path(),
            box_color: default_box_color(),
            box_thickness: default_box_thickness(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the path given on the command line, else `config.toml` if it
    /// exists in the working directory, else built-in defaults.
    pub fn from_args(arg: Option<PathBuf>) -> Result<Self, ConfigError> {
        match arg {
            Some(path) => Self::load(&path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_PATH);
                if fallback.exists() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.detection;
        if !(d.limit_perc > 0.0 && d.limit_perc <= 0.5) {
            return Err(ConfigError::Invalid(format!(
                "detection.limit_perc must be in (0, 0.5], got {}",
                d.limit_perc
            )));
        }
        if d.blur_kernel == 0 || d.blur_kernel % 2 == 0 {
            return Err(ConfigError::Invalid(format!(
                "detection.blur_kernel must be a positive odd number, got {}",
                d.blur_kernel
            )));
        }
        if !(d.min_area >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "detection.min_area must be non-negative, got {}",
                d.min_area
            )));
        }
        if !(1..=MAX_BOX_THICKNESS).contains(&self.output.box_thickness) {
            return Err(ConfigError::Invalid(format!(
                "output.box_thickness must be in 1..={MAX_BOX_THICKNESS}, got {}",
                self.output.box_thickness
            )));
        }
        if Duration::try_from_secs_f64(self.stream.settle_secs).is_err() {
            return Err(ConfigError::Invalid(format!(
                "stream.settle_secs must be a non-negative number of seconds, got {}",
                self.stream.settle_secs
            )));
        }
        Ok(())
    }
}

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Widest rectangle outline `output.box_thickness` may ask for.
pub const MAX_BOX_THICKNESS: u32 = 64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_base_path() -> PathBuf {
    "base.jpg".into()
}
fn default_current_path() -> PathBuf {
    "diff.jpg".into()
}
fn default_stream_url() -> String {
    "rtsp://192.168.1.128:554/12".into()
}
fn default_settle_secs() -> f64 {
    5.0
}
fn default_comparisons() -> u32 {
    1
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_ffmpeg() -> String {
    "ffmpeg".into()
}
fn default_blur_kernel() -> u32 {
    21
}
fn default_diff_threshold() -> u8 {
    25
}
fn default_dilate_iterations() -> u8 {
    2
}
fn default_min_area() -> f64 {
    500.0
}
fn default_limit_perc() -> f64 {
    0.1
}
fn default_detection_path() -> PathBuf {
    "detection.jpg".into()
}
fn default_reference_path() -> PathBuf {
    "first.jpg".into()
}
fn default_delta_path() -> PathBuf {
    "delta.jpg".into()
}
fn default_threshold_path() -> PathBuf {
    "tresh.jpg".into()
}
fn default_box_color() -> [u8; 3] {
    [0, 255, 0]
}
fn default_box_thickness() -> u32 {
    2
}
fn default_log_level() -> String {
    "info".into()
}
