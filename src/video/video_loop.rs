//! The frame loop: acquire, detect, reduce, publish, display.
//!
//! Runs until the shutdown token is set or the source runs dry. The token is
//! checked once at the top of every iteration, so after the operator exits at
//! most the iteration already in flight completes.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::geometry::frame_corner_distance;
use crate::system::SharedState;

use super::{FrameDisplay, FrameSource, MarkerExtractor};

/// State of the frame loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoLoopState {
    Running,
    Stopping,
    Stopped,
}

/// Why the frame loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The operator requested shutdown.
    Cancelled,
    /// The frame source has no more frames.
    EndOfStream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLoopReport {
    /// Frames fully processed.
    pub iterations: u64,
    /// Processed frames in which at least one marker was found.
    pub frames_with_markers: u64,
    pub stop_reason: StopReason,
}

pub struct VideoLoop<S, E, D> {
    source: S,
    extractor: E,
    display: D,
    shared: Arc<SharedState>,
    state: VideoLoopState,
}

impl<S, E, D> VideoLoop<S, E, D>
where
    S: FrameSource,
    E: MarkerExtractor<S::Frame>,
    D: FrameDisplay<S::Frame>,
{
    pub fn new(source: S, extractor: E, display: D, shared: Arc<SharedState>) -> Self {
        Self {
            source,
            extractor,
            display,
            shared,
            state: VideoLoopState::Running,
        }
    }

    pub fn state(&self) -> VideoLoopState {
        self.state
    }

    /// Main loop. Collaborator errors end the loop and are returned as is.
    pub fn run(&mut self) -> Result<VideoLoopReport> {
        info!("Frame loop started");
        self.state = VideoLoopState::Running;
        let mut iterations = 0;
        let mut frames_with_markers = 0;

        let result = loop {
            if self.shared.is_shutdown_requested() {
                break Ok(StopReason::Cancelled);
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(StopReason::EndOfStream),
                Err(e) => break Err(e),
            };

            let markers = match self.extractor.detect(&frame) {
                Ok(markers) => markers,
                Err(e) => break Err(e),
            };

            let corner_distance = frame_corner_distance(&markers);
            self.shared.publish_corner_distance(corner_distance);
            if corner_distance.is_some() {
                frames_with_markers += 1;
            }

            if let Err(e) = self.display.show(&frame, &markers) {
                break Err(e);
            }

            iterations += 1;
            if iterations % 300 == 0 {
                debug!(iterations, frames_with_markers, ?corner_distance, "frame loop progress");
            }
        };

        self.state = VideoLoopState::Stopping;
        let outcome = result.map(|stop_reason| VideoLoopReport {
            iterations,
            frames_with_markers,
            stop_reason,
        });
        self.state = VideoLoopState::Stopped;

        match &outcome {
            Ok(report) => info!(
                "Frame loop stopped ({:?}) after {} frames, {} with markers",
                report.stop_reason, report.iterations, report.frames_with_markers
            ),
            Err(e) => info!("Frame loop aborted after {} frames: {:#}", iterations, e),
        }
        outcome
    }
}
