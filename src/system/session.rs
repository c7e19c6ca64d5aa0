//! Calibration session - thread orchestration.
//!
//! The operator loop gets its own thread because it blocks on input. The
//! frame loop stays on the calling thread, where GUI toolkits expect their
//! window calls. The two only meet through `SharedState`.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use crate::calibration::{OperatorLoop, OperatorReport, SessionLog};
use crate::video::{FrameDisplay, FrameSource, MarkerExtractor, StopReason, VideoLoop, VideoLoopReport};

use super::shared_state::SharedState;

/// Reports of both loops after a graceful session end.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub video: VideoLoopReport,
    pub operator: OperatorReport,
}

pub struct CalibrationSession {
    /// Slot and shutdown token shared by both loops.
    shared: Arc<SharedState>,

    /// Handle to the operator thread.
    operator_handle: Option<JoinHandle<Result<OperatorReport>>>,
}

impl CalibrationSession {
    /// Create the shared state and spawn the operator thread.
    ///
    /// The session log moves into the operator thread and is only ever
    /// touched there.
    pub fn start<R, W, L>(input: R, output: W, log: SessionLog<L>) -> Result<Self>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
        L: Write + Send + 'static,
    {
        let shared = SharedState::new();
        let operator = OperatorLoop::new(Arc::clone(&shared), log, output);
        let operator_handle = thread::Builder::new()
            .name("operator-input".into())
            .spawn(move || operator.run(input))
            .context("Failed to spawn operator thread")?;

        Ok(Self {
            shared,
            operator_handle: Some(operator_handle),
        })
    }

    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Run the frame loop on the calling thread until the operator exits or
    /// the source ends.
    ///
    /// Errors are returned as-is. The shutdown token is only ever set by the
    /// operator, and the operator thread is not waited for.
    pub fn run_video<S, E, D>(&mut self, source: S, extractor: E, display: D) -> Result<VideoLoopReport>
    where
        S: FrameSource,
        E: MarkerExtractor<S::Frame>,
        D: FrameDisplay<S::Frame>,
    {
        let mut video = VideoLoop::new(source, extractor, display, Arc::clone(&self.shared));
        let report = video.run()?;

        if report.stop_reason == StopReason::EndOfStream && !self.shared.is_shutdown_requested() {
            // The last published value stays readable.
            info!("No more frames from the source. Enter -1 to finish the session.");
        }
        Ok(report)
    }

    /// Wait for the operator thread and return its report.
    pub fn finish(mut self) -> Result<OperatorReport> {
        let handle = self
            .operator_handle
            .take()
            .ok_or_else(|| anyhow!("Operator thread already joined"))?;
        handle
            .join()
            .map_err(|_| anyhow!("Operator thread panicked"))?
    }

    /// Start, run the frame loop, then join the operator.
    pub fn run<R, W, L, S, E, D>(
        input: R,
        output: W,
        log: SessionLog<L>,
        source: S,
        extractor: E,
        display: D,
    ) -> Result<SessionOutcome>
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
        L: Write + Send + 'static,
        S: FrameSource,
        E: MarkerExtractor<S::Frame>,
        D: FrameDisplay<S::Frame>,
    {
        let mut session = Self::start(input, output, log)?;
        let video = session.run_video(source, extractor, display)?;
        let operator = session.finish()?;
        Ok(SessionOutcome { video, operator })
    }
}
