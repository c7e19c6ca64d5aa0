use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use distance_calibration::io::{BoardConfig, CameraConfig, SessionConfig};

/// Derive the marker-size to distance calibration constant from live video
/// and operator-entered distances.
#[derive(Parser)]
#[command(name = "distance-calibration", version)]
struct Cli {
    /// Board configuration (YAML): ArUco dictionary and marker ids.
    board_config: PathBuf,

    /// Camera configuration (YAML): intrinsics and capture resolution.
    camera_config: PathBuf,

    /// Index of the capture device.
    #[arg(long, default_value_t = 0)]
    camera_index: i32,

    /// Per-frame display wait in milliseconds.
    #[arg(long, default_value_t = 2)]
    wait_ms: u64,

    /// Directory to write the session log to.
    #[arg(long, default_value = ".")]
    log_dir: PathBuf,

    /// Run without the preview window.
    #[arg(long)]
    headless: bool,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            camera_index: self.camera_index,
            frame_wait: Duration::from_millis(self.wait_ms),
            log_dir: self.log_dir.clone(),
            headless: self.headless,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.session_config();

    let board = match BoardConfig::load(&cli.board_config) {
        Ok(board) => board,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    let camera = CameraConfig::load_or_default(&cli.camera_config);

    match run(&config, &board, &camera) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Setup failures come back as `Err`; failures after both loops started are
/// reported here and end the process cleanly.
#[cfg(feature = "opencv")]
fn run(config: &SessionConfig, board: &BoardConfig, camera: &CameraConfig) -> Result<ExitCode> {
    use distance_calibration::io::camera::{ArucoExtractor, CameraSource, PreviewWindow};
    use distance_calibration::video::Headless;

    let source = CameraSource::open(config.camera_index, camera)?;
    let extractor = ArucoExtractor::new(board)?;

    if config.headless {
        calibrate(config, source, extractor, Headless::new(config.frame_wait))
    } else {
        let wait_ms = i32::try_from(config.frame_wait.as_millis()).unwrap_or(i32::MAX);
        let window = PreviewWindow::open(wait_ms)?;
        calibrate(config, source, extractor, window)
    }
}

#[cfg(feature = "opencv")]
fn calibrate<D>(
    config: &SessionConfig,
    source: distance_calibration::io::camera::CameraSource,
    extractor: distance_calibration::io::camera::ArucoExtractor,
    display: D,
) -> Result<ExitCode>
where
    D: distance_calibration::video::FrameDisplay<opencv::core::Mat>,
{
    use distance_calibration::calibration::SessionLog;
    use distance_calibration::system::CalibrationSession;
    use std::io::BufReader;
    use tracing::info;

    let log = SessionLog::create_in(&config.log_dir)?;
    let input = BufReader::new(io::stdin());
    let mut session = CalibrationSession::start(input, io::stdout(), log)?;

    if let Err(e) = session.run_video(source, extractor, display) {
        eprintln!("error during capture: {e:#}");
        return Ok(ExitCode::SUCCESS);
    }

    let report = session.finish()?;
    match report.constant {
        Some(constant) => info!(
            "Final constant {} from {} samples ({} rejected)",
            constant, report.accepted, report.rejected
        ),
        None => info!("No samples recorded"),
    }
    if let Some(distance) = report.final_estimate {
        info!("Marker in view at exit is an estimated {:.3} away", distance);
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(not(feature = "opencv"))]
fn run(_config: &SessionConfig, _board: &BoardConfig, _camera: &CameraConfig) -> Result<ExitCode> {
    anyhow::bail!("built without camera support; rebuild with `--features opencv`")
}
