//! Interactive operator loop.
//!
//! Blocks on one line of operator input at a time, pairs the entered distance
//! with whatever corner distance the frame loop published last, and feeds the
//! pair to the accumulator. Entering `-1` ends the session and asks the frame
//! loop to stop.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::system::SharedState;

use super::accumulator::{CalibrationAccumulator, Submission};
use super::session_log::SessionLog;

/// Operator input that ends the session.
pub const EXIT_SENTINEL: f64 = -1.0;

pub const PROMPT: &str = "Enter the distance from camera to marker (-1 to exit): ";

/// State of the operator loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    /// Blocked on the next line of input.
    AwaitingInput,
    /// Handling the line just read.
    Processing,
    /// Session over; the shutdown request has been issued.
    Exited,
}

/// One parsed line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorInput {
    Exit,
    Distance(f64),
    Invalid(String),
}

impl OperatorInput {
    pub fn parse(line: &str) -> Self {
        let text = line.trim();
        match text.parse::<f64>() {
            Ok(v) if v == EXIT_SENTINEL => Self::Exit,
            // `+ 0.0` folds "-0" into 0 so the log never records a negative zero.
            Ok(v) if v.is_finite() && v >= 0.0 => Self::Distance(v + 0.0),
            _ => Self::Invalid(text.to_owned()),
        }
    }
}

/// Summary of an operator session.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OperatorReport {
    /// Samples written to the log and folded into the constant.
    pub accepted: usize,
    /// Measurements dropped because no marker was in view.
    pub rejected: usize,
    /// Lines that were not a usable distance.
    pub invalid: usize,
    /// Final calibration constant, if any sample was accepted.
    pub constant: Option<f64>,
    /// Distance the final constant predicts for the marker in view at exit.
    pub final_estimate: Option<f64>,
}

/// The operator side of a calibration session. Owns the accumulator and the
/// session log; the frame loop never touches either.
pub struct OperatorLoop<W: Write, L: Write> {
    shared: Arc<SharedState>,
    accumulator: CalibrationAccumulator,
    log: SessionLog<L>,
    output: W,
    state: OperatorState,
    report: OperatorReport,
}

impl<W: Write, L: Write> OperatorLoop<W, L> {
    pub fn new(shared: Arc<SharedState>, log: SessionLog<L>, output: W) -> Self {
        Self {
            shared,
            accumulator: CalibrationAccumulator::new(),
            log,
            output,
            state: OperatorState::AwaitingInput,
            report: OperatorReport::default(),
        }
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    /// Run until the exit sentinel or end of input.
    ///
    /// Shutdown is requested on every way out of the loop, errors included, so
    /// the frame loop never outlives the operator. The log is flushed and
    /// closed only on a clean exit.
    pub fn run<R: BufRead>(mut self, mut input: R) -> Result<OperatorReport> {
        let result = self.interact(&mut input);
        self.state = OperatorState::Exited;
        self.shared.request_shutdown();
        result?;

        self.log.close()?;
        self.report.constant = self.accumulator.constant();
        self.report.final_estimate = self
            .shared
            .latest_corner_distance()
            .and_then(|corner| self.accumulator.estimate_distance(corner));
        info!(
            accepted = self.report.accepted,
            rejected = self.report.rejected,
            invalid = self.report.invalid,
            "Operator session finished"
        );
        Ok(self.report)
    }

    fn interact<R: BufRead>(&mut self, input: &mut R) -> Result<()> {
        let mut line = String::new();
        loop {
            self.state = OperatorState::AwaitingInput;
            write!(self.output, "{PROMPT}")?;
            self.output.flush()?;

            line.clear();
            let n = input
                .read_line(&mut line)
                .context("Failed to read operator input")?;
            self.state = OperatorState::Processing;
            writeln!(self.output)?;

            if n == 0 {
                info!("Operator input closed");
                writeln!(self.output, "End of input. Exiting.")?;
                return Ok(());
            }

            let measured_distance = match OperatorInput::parse(&line) {
                OperatorInput::Exit => {
                    writeln!(self.output, "User terminated program. Exiting.")?;
                    return Ok(());
                }
                OperatorInput::Invalid(text) => {
                    warn!("Ignoring operator input {:?}", text);
                    writeln!(
                        self.output,
                        "Invalid distance {text:?}: enter a non-negative number, or -1 to exit."
                    )?;
                    self.report.invalid += 1;
                    continue;
                }
                OperatorInput::Distance(d) => d,
            };

            // Exactly one read of the slot per measurement.
            let corner_distance = self.shared.latest_corner_distance();
            match self
                .accumulator
                .submit(corner_distance, measured_distance, &mut self.log)?
            {
                Submission::Accepted { constant, .. } => {
                    self.report.accepted += 1;
                    writeln!(self.output, "updated constant: {constant}")?;
                }
                Submission::NoMarker => {
                    self.report.rejected += 1;
                    writeln!(self.output, "No markers are detected. Data not recorded.")?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Cursor;

    fn run_script(shared: &Arc<SharedState>, script: &str) -> (OperatorReport, String, String) {
        let mut out = Vec::new();
        let mut log_buf = Vec::new();
        let log = SessionLog::from_writer(&mut log_buf).unwrap();
        let operator = OperatorLoop::new(Arc::clone(shared), log, &mut out);
        let report = operator.run(Cursor::new(script.to_owned())).unwrap();
        (
            report,
            String::from_utf8(out).unwrap(),
            String::from_utf8(log_buf).unwrap(),
        )
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(OperatorInput::parse("-1\n"), OperatorInput::Exit);
        assert_eq!(OperatorInput::parse("  -1.0 "), OperatorInput::Exit);
        assert_eq!(OperatorInput::parse("2.5\n"), OperatorInput::Distance(2.5));
        assert_eq!(OperatorInput::parse("0"), OperatorInput::Distance(0.0));
        assert!(matches!(OperatorInput::parse("-0"), OperatorInput::Distance(d) if d.is_sign_positive()));
        assert_eq!(OperatorInput::parse("-3"), OperatorInput::Invalid("-3".into()));
        assert_eq!(OperatorInput::parse("abc"), OperatorInput::Invalid("abc".into()));
        assert_eq!(OperatorInput::parse("inf"), OperatorInput::Invalid("inf".into()));
        assert_eq!(OperatorInput::parse(""), OperatorInput::Invalid(String::new()));
    }

    #[test]
    fn test_accepts_with_marker_in_view() {
        let shared = SharedState::new();
        shared.publish_corner_distance(Some(100.0));
        let (report, out, log) = run_script(&shared, "2\n-1\n");

        assert_eq!(report.accepted, 1);
        assert_eq!(report.constant, Some(200.0));
        assert!(out.contains("updated constant: 200"));
        assert!(out.contains("User terminated program. Exiting."));
        assert_eq!(log.lines().nth(1), Some("100 2"));
        assert!(shared.is_shutdown_requested());
    }

    #[test]
    fn test_rejects_when_no_marker() {
        let shared = SharedState::new();
        shared.publish_corner_distance(None);
        let (report, out, log) = run_script(&shared, "4.2\n-1\n");

        assert_eq!(report.accepted, 0);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.constant, None);
        assert!(out.contains("No markers are detected. Data not recorded."));
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn test_rejects_before_any_frame() {
        let shared = SharedState::new();
        let (report, _, log) = run_script(&shared, "1\n-1\n");
        assert_eq!(report.rejected, 1);
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn test_exit_sentinel_never_logged_or_counted() {
        let shared = SharedState::new();
        shared.publish_corner_distance(Some(75.0));
        let (report, out, log) = run_script(&shared, "-1\n3\n");

        assert_eq!(report, OperatorReport::default());
        assert_eq!(log, "\"corner distance\" \"measured distance\"\n");
        assert_eq!(out.matches(PROMPT).count(), 1);
    }

    #[test]
    fn test_invalid_input_reprompts() {
        let shared = SharedState::new();
        shared.publish_corner_distance(Some(40.0));
        let (report, out, _) = run_script(&shared, "two\n-7\n\n5\n-1\n");

        assert_eq!(report.invalid, 3);
        assert_eq!(report.accepted, 1);
        assert_eq!(out.matches(PROMPT).count(), 5);
        assert_relative_eq!(report.constant.unwrap(), 200.0);
    }

    #[test]
    fn test_end_of_input_exits_cleanly() {
        let shared = SharedState::new();
        shared.publish_corner_distance(Some(10.0));
        let (report, out, _) = run_script(&shared, "3\n");
        assert_eq!(report.accepted, 1);
        assert!(out.contains("End of input. Exiting."));
        assert!(shared.is_shutdown_requested());
    }

    #[test]
    fn test_slot_read_at_submission_time() {
        let shared = SharedState::new();
        shared.publish_corner_distance(Some(100.0));
        let mut out = Vec::new();
        let mut log_buf = Vec::new();
        let log = SessionLog::from_writer(&mut log_buf).unwrap();
        let mut operator = OperatorLoop::new(Arc::clone(&shared), log, &mut out);
        assert_eq!(operator.state(), OperatorState::AwaitingInput);

        operator.interact(&mut Cursor::new("2\n")).unwrap();
        shared.publish_corner_distance(Some(50.0));
        operator.interact(&mut Cursor::new("2\n")).unwrap();
        assert_eq!(operator.state(), OperatorState::Processing);

        let report = operator.run(Cursor::new("-1\n")).unwrap();
        assert_eq!(report.accepted, 2);
        assert_relative_eq!(report.constant.unwrap(), 150.0);
        assert_eq!(
            String::from_utf8(log_buf).unwrap(),
            "\"corner distance\" \"measured distance\"\n100 2\n50 2\n"
        );
    }

    #[test]
    fn test_negative_zero_logged_as_zero() {
        let shared = SharedState::new();
        shared.publish_corner_distance(Some(100.0));
        let (report, _, log) = run_script(&shared, "-0\n-1\n");
        assert_eq!(report.accepted, 1);
        assert_eq!(log.lines().nth(1), Some("100 0"));
    }

    #[test]
    fn test_final_estimate_uses_marker_in_view() {
        let shared = SharedState::new();
        shared.publish_corner_distance(Some(100.0));
        let (report, _, _) = run_script(&shared, "2\n-1\n");
        // k = 200, marker still at 100 px.
        assert_relative_eq!(report.final_estimate.unwrap(), 2.0);

        let shared = SharedState::new();
        shared.publish_corner_distance(Some(100.0));
        let mut out = Vec::new();
        let log = SessionLog::from_writer(Vec::new()).unwrap();
        let mut operator = OperatorLoop::new(Arc::clone(&shared), log, &mut out);
        operator.interact(&mut Cursor::new("2\n")).unwrap();
        shared.publish_corner_distance(Some(50.0));
        let report = operator.run(Cursor::new("-1\n")).unwrap();
        assert_relative_eq!(report.final_estimate.unwrap(), 4.0);

        let shared = SharedState::new();
        shared.publish_corner_distance(None);
        let (report, _, _) = run_script(&shared, "2\n-1\n");
        assert_eq!(report.final_estimate, None);
    }
}
