//! OpenCV-backed collaborators: capture device, ArUco detector, preview window.

use anyhow::{Result, bail};
use nalgebra::Point2;
use opencv::core::{Mat, Point, Point2f, Scalar, Vector};
use opencv::objdetect::{self, ArucoDetector, PredefinedDictionaryType};
use opencv::prelude::*;
use opencv::{highgui, imgproc, videoio};
use tracing::{info, warn};

use crate::geometry::Marker;
use crate::video::{FrameDisplay, FrameSource, MarkerExtractor};

use super::config::{ArucoDictionary, BoardConfig, CameraConfig};

pub const WINDOW_NAME: &str = "output video";

/// Width of the marker outline in pixels.
const LINE_WIDTH: i32 = 1;

/// Video capture device. A failed grab is treated as end of stream.
pub struct CameraSource {
    capture: videoio::VideoCapture,
}

impl CameraSource {
    pub fn open(index: i32, camera: &CameraConfig) -> Result<Self> {
        let mut capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            bail!("Could not open video device {index}");
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, f64::from(camera.width))?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, f64::from(camera.height))?;
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)?;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)?;
        if width as u32 != camera.width || height as u32 != camera.height {
            warn!(
                "Requested {}x{}, device delivers {}x{}",
                camera.width, camera.height, width, height
            );
        }
        info!("Opened video device {} at {}x{}", index, width, height);

        Ok(Self { capture })
    }
}

impl FrameSource for CameraSource {
    type Frame = Mat;

    fn next_frame(&mut self) -> Result<Option<Mat>> {
        if !self.capture.grab()? {
            return Ok(None);
        }
        let mut frame = Mat::default();
        if !self.capture.retrieve(&mut frame, 0)? || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

/// ArUco detection restricted to the markers of one board.
pub struct ArucoExtractor {
    detector: ArucoDetector,
    board: BoardConfig,
}

impl ArucoExtractor {
    pub fn new(board: &BoardConfig) -> Result<Self> {
        let dictionary = objdetect::get_predefined_dictionary(predefined_dictionary(board.dictionary))?;
        let mut detector = ArucoDetector::new_def()?;
        detector.set_dictionary(&dictionary)?;
        Ok(Self {
            detector,
            board: board.clone(),
        })
    }
}

impl MarkerExtractor<Mat> for ArucoExtractor {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Marker>> {
        let mut corners = Vector::<Vector<Point2f>>::new();
        let mut ids = Vector::<i32>::new();
        let mut rejected = Vector::<Vector<Point2f>>::new();
        self.detector
            .detect_markers(frame, &mut corners, &mut ids, &mut rejected)?;

        let markers = ids
            .iter()
            .zip(corners.iter())
            .filter(|(id, _)| self.board.accepts(*id))
            .filter_map(|(id, quad)| {
                let points: Vec<Point2<f64>> = quad
                    .iter()
                    .map(|p| Point2::new(f64::from(p.x), f64::from(p.y)))
                    .collect();
                let corners: [Point2<f64>; 4] = points.try_into().ok()?;
                Some(Marker::new(id, corners))
            })
            .collect();
        Ok(markers)
    }
}

/// HighGUI window showing each frame with marker outlines drawn on a copy.
pub struct PreviewWindow {
    wait_ms: i32,
}

impl PreviewWindow {
    pub fn open(wait_ms: i32) -> Result<Self> {
        highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            wait_ms: wait_ms.max(1),
        })
    }
}

impl FrameDisplay<Mat> for PreviewWindow {
    fn show(&mut self, frame: &Mat, markers: &[Marker]) -> Result<()> {
        let mut annotated = frame.try_clone()?;
        let color = Scalar::new(0.0, 0.0, 255.0, 0.0);
        for marker in markers {
            for i in 0..4 {
                let a = pixel(&marker.corners[i]);
                let b = pixel(&marker.corners[(i + 1) % 4]);
                imgproc::line(&mut annotated, a, b, color, LINE_WIDTH, imgproc::LINE_8, 0)?;
            }
        }
        highgui::imshow(WINDOW_NAME, &annotated)?;
        highgui::wait_key(self.wait_ms)?;
        Ok(())
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(WINDOW_NAME);
    }
}

fn pixel(p: &Point2<f64>) -> Point {
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

fn predefined_dictionary(dictionary: ArucoDictionary) -> PredefinedDictionaryType {
    use ArucoDictionary::*;
    use PredefinedDictionaryType as P;
    match dictionary {
        Dict4x4_50 => P::DICT_4X4_50,
        Dict4x4_100 => P::DICT_4X4_100,
        Dict4x4_250 => P::DICT_4X4_250,
        Dict4x4_1000 => P::DICT_4X4_1000,
        Dict5x5_50 => P::DICT_5X5_50,
        Dict5x5_100 => P::DICT_5X5_100,
        Dict5x5_250 => P::DICT_5X5_250,
        Dict5x5_1000 => P::DICT_5X5_1000,
        Dict6x6_50 => P::DICT_6X6_50,
        Dict6x6_100 => P::DICT_6X6_100,
        Dict6x6_250 => P::DICT_6X6_250,
        Dict6x6_1000 => P::DICT_6X6_1000,
        Dict7x7_50 => P::DICT_7X7_50,
        Dict7x7_100 => P::DICT_7X7_100,
        Dict7x7_250 => P::DICT_7X7_250,
        Dict7x7_1000 => P::DICT_7X7_1000,
        ArucoOriginal => P::DICT_ARUCO_ORIGINAL,
        AprilTag16h5 => P::DICT_APRILTAG_16h5,
        AprilTag25h9 => P::DICT_APRILTAG_25h9,
        AprilTag36h10 => P::DICT_APRILTAG_36h10,
        AprilTag36h11 => P::DICT_APRILTAG_36h11,
    }
}
