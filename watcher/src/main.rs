mod mjpeg;
mod rtsp;
mod session;
mod source;

use ptz_motion_common::config::Config;
use ptz_motion_common::report::{ReportError, Reporter};
use ptz_motion_common::vision::{DetectError, Detector, ImageprocBackend};
use session::WatchSession;
use source::StreamSource;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("failed to spawn {0}: {1}")]
    Spawn(String, std::io::Error),
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let config = match Config::from_args(std::env::args().nth(1).map(PathBuf::from)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        url = config.stream.url,
        mode = ?config.stream.mode,
        settle_secs = config.stream.settle_secs,
        comparisons = config.stream.comparisons,
        limit_perc = config.detection.limit_perc,
        "starting live watcher"
    );

    if let Err(e) = run(&config).await {
        error!(error = %e, "watcher failed");
        std::process::exit(1);
    }
}

async fn run(config: &Config) -> Result<(), WatchError> {
    let mut source = StreamSource::open(&config.stream).await?;

    let detector = Detector::new(ImageprocBackend::new(&config.detection), &config.detection);
    let session = WatchSession::new(detector, Reporter::new(config.output.clone()), &config.stream);

    let summary = session.run(&mut source).await?;
    info!(
        frames_read = summary.frames_read,
        comparisons = summary.comparisons,
        "watcher finished"
    );
    Ok(())
}
