use ptz_motion_common::config::Config;
use ptz_motion_common::report::{ReportError, Reporter};
use ptz_motion_common::vision::{DetectError, Detection, Detector, ImageprocBackend};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

fn main() {
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
        base = %config.source.base.display(),
        current = %config.source.current.display(),
        limit_perc = config.detection.limit_perc,
        min_area = config.detection.min_area,
        "starting still-image detection"
    );

    match run(&config) {
        Ok(detection) => println!("{}", detection.label()),
        Err(e) => {
            error!(error = %e, "detection failed");
            std::process::exit(1);
        }
    }
}

fn run(config: &Config) -> Result<Detection, DetectorError> {
    let detector = Detector::new(ImageprocBackend::new(&config.detection), &config.detection);
    let reporter = Reporter::new(config.output.clone());

    let base = detector.load(&config.source.base)?;
    let current = detector.load(&config.source.current)?;

    let detection = detector.detect(&base, &current)?;
    if let Some(target) = &detection.target {
        reporter.write_detection(&current.color, target)?;
    }
    Ok(detection)
}
