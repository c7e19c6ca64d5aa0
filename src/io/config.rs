use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{debug, warn};

/// Directive line OpenCV's FileStorage puts at the top of its YAML files.
const OPENCV_YAML_DIRECTIVE: &str = "%YAML:1.0";

/// Predefined ArUco / AprilTag dictionaries, named as in OpenCV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ArucoDictionary {
    #[serde(rename = "DICT_4X4_50")]
    Dict4x4_50,
    #[serde(rename = "DICT_4X4_100")]
    Dict4x4_100,
    #[serde(rename = "DICT_4X4_250")]
    Dict4x4_250,
    #[serde(rename = "DICT_4X4_1000")]
    Dict4x4_1000,
    #[serde(rename = "DICT_5X5_50")]
    Dict5x5_50,
    #[serde(rename = "DICT_5X5_100")]
    Dict5x5_100,
    #[serde(rename = "DICT_5X5_250")]
    Dict5x5_250,
    #[serde(rename = "DICT_5X5_1000")]
    Dict5x5_1000,
    #[serde(rename = "DICT_6X6_50")]
    Dict6x6_50,
    #[serde(rename = "DICT_6X6_100")]
    Dict6x6_100,
    #[serde(rename = "DICT_6X6_250")]
    Dict6x6_250,
    #[serde(rename = "DICT_6X6_1000")]
    Dict6x6_1000,
    #[serde(rename = "DICT_7X7_50")]
    Dict7x7_50,
    #[serde(rename = "DICT_7X7_100")]
    Dict7x7_100,
    #[serde(rename = "DICT_7X7_250")]
    Dict7x7_250,
    #[serde(rename = "DICT_7X7_1000")]
    Dict7x7_1000,
    #[serde(rename = "DICT_ARUCO_ORIGINAL")]
    ArucoOriginal,
    #[serde(rename = "DICT_APRILTAG_16h5")]
    AprilTag16h5,
    #[serde(rename = "DICT_APRILTAG_25h9")]
    AprilTag25h9,
    #[serde(rename = "DICT_APRILTAG_36h10")]
    AprilTag36h10,
    #[serde(rename = "DICT_APRILTAG_36h11")]
    AprilTag36h11,
}

impl Default for ArucoDictionary {
    fn default() -> Self {
        Self::ArucoOriginal
    }
}

/// Marker board description: which dictionary to decode and which ids
/// belong to the board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardConfig {
    pub dictionary: ArucoDictionary,

    /// Ids printed on the board. Empty accepts every decoded marker.
    pub marker_ids: Vec<i32>,
}

/// On-disk board layout. Accepts both the plain `dictionary` / `marker_ids`
/// form and the ArUco `BoardConfiguration` keys written by `aruco`'s
/// `saveToFile`.
#[derive(Debug, Deserialize)]
struct BoardFile {
    #[serde(default)]
    dictionary: ArucoDictionary,
    #[serde(default)]
    marker_ids: Vec<i32>,
    #[serde(default)]
    aruco_bc_nmarkers: Option<usize>,
    #[serde(default)]
    aruco_bc_markers: Vec<ArucoBoardMarker>,
}

/// One `aruco_bc_markers` entry. The 3D corners are not needed.
#[derive(Debug, Deserialize)]
struct ArucoBoardMarker {
    id: i32,
}

impl BoardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read board configuration {}", path.display()))?;
        let board = Self::from_yaml_str(&text)
            .with_context(|| format!("Invalid board configuration {}", path.display()))?;
        debug!(
            "Board: {:?}, {} marker ids",
            board.dictionary,
            board.marker_ids.len()
        );
        Ok(board)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: BoardFile = serde_yaml::from_str(&space_flow_keys(strip_opencv_directive(text)))?;

        let mut marker_ids = file.marker_ids;
        marker_ids.extend(file.aruco_bc_markers.iter().map(|m| m.id));
        if let Some(n) = file.aruco_bc_nmarkers {
            if n != file.aruco_bc_markers.len() {
                bail!(
                    "aruco_bc_nmarkers is {n} but {} markers are listed",
                    file.aruco_bc_markers.len()
                );
            }
        }

        Ok(Self {
            dictionary: file.dictionary,
            marker_ids,
        })
    }

    /// Whether a decoded marker id is part of this board.
    pub fn accepts(&self, id: i32) -> bool {
        self.marker_ids.is_empty() || self.marker_ids.contains(&id)
    }
}

/// Camera intrinsics and capture resolution.
///
/// Only the resolution is consumed today; the intrinsics are carried along
/// for the camera that produced the built-in defaults.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// [k1, k2, p1, p2, k3]
    pub distortion: [f64; 5],
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fx: 1.3089596458327883e+03,
            fy: 1.3249652390726415e+03,
            cx: 3.1716402612677911e+02,
            cy: 2.3359932814285278e+02,
            distortion: [
                1.8869609562810794e+00,
                4.2431486029577115e+01,
                -7.9002380674102313e-02,
                -1.0615309141897006e-02,
                -1.2940788383601671e+03,
            ],
            width: 640,
            height: 480,
        }
    }
}

impl CameraConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read camera configuration {}", path.display()))?;
        let camera: Self = serde_yaml::from_str(strip_opencv_directive(&text))
            .with_context(|| format!("Invalid camera configuration {}", path.display()))?;
        if camera.width == 0 || camera.height == 0 {
            bail!("Camera resolution must be non-zero, got {}x{}", camera.width, camera.height);
        }
        Ok(camera)
    }

    /// Load `path`, falling back to the built-in defaults on any failure.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("{:#}. Using built-in camera parameters.", e);
            Self::default()
        })
    }
}

/// Runtime knobs of a calibration session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Capture device index.
    pub camera_index: i32,
    /// Bounded wait per frame for the display / poll step.
    pub frame_wait: Duration,
    /// Directory the session log is created in.
    pub log_dir: PathBuf,
    /// Run without a preview window.
    pub headless: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            frame_wait: Duration::from_millis(2),
            log_dir: PathBuf::from("."),
            headless: false,
        }
    }
}

/// OpenCV writes flow mappings as `{ id:3, corners:[...] }`, which YAML reads
/// as a single plain scalar. Insert the missing space after `key:`.
fn space_flow_keys(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    let mut prev: Option<char> = None;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        let after_key = prev.is_some_and(|p| p.is_alphanumeric() || p == '_');
        if c == ':' && after_key && chars.peek().is_some_and(|n| !n.is_whitespace()) {
            out.push(' ');
        }
        prev = Some(c);
    }
    out
}

fn strip_opencv_directive(text: &str) -> &str {
    text.trim_start()
        .strip_prefix(OPENCV_YAML_DIRECTIVE)
        .unwrap_or(text)
}
