//! Frame acquisition side of a calibration session.
//!
//! The camera, the marker detector and the preview window are collaborators
//! behind small traits, so the frame loop can run against a real device or
//! against scripted frames in tests.

pub mod video_loop;

use std::thread;
use std::time::Duration;

use anyhow::Result;

use crate::geometry::Marker;

pub use video_loop::{StopReason, VideoLoop, VideoLoopReport, VideoLoopState};

/// Sequential frame supplier.
pub trait FrameSource {
    type Frame;

    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Self::Frame>>;
}

/// Finds markers in a frame.
pub trait MarkerExtractor<F> {
    fn detect(&mut self, frame: &F) -> Result<Vec<Marker>>;
}

/// Shows a frame with its markers. Implementations own the bounded per-frame
/// wait of the loop.
pub trait FrameDisplay<F> {
    fn show(&mut self, frame: &F, markers: &[Marker]) -> Result<()>;
}

/// Display stand-in for headless runs: draws nothing, only paces the loop.
#[derive(Debug, Clone, Copy)]
pub struct Headless {
    pub wait: Duration,
}

impl Headless {
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }
}

impl<F> FrameDisplay<F> for Headless {
    fn show(&mut self, _frame: &F, _markers: &[Marker]) -> Result<()> {
        if !self.wait.is_zero() {
            thread::sleep(self.wait);
        }
        Ok(())
    }
}
