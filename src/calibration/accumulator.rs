//! Online accumulation of the distance calibration constant.
//!
//! The constant is the mean of `corner_distance * measured_distance` over all
//! accepted samples. Since apparent size is inversely proportional to distance,
//! `constant / corner_distance` estimates the distance of a marker later on.

use std::io::Write;

use anyhow::{Result, bail};
use tracing::debug;

use super::session_log::SessionLog;

/// An accepted (corner distance, measured distance) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    /// Maximum corner distance in pixels.
    pub corner_distance: f64,
    /// Operator-measured camera to marker distance, in the operator's units.
    pub measured_distance: f64,
}

impl CalibrationSample {
    pub fn product(&self) -> f64 {
        self.corner_distance * self.measured_distance
    }
}

/// Result of offering one measurement to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Submission {
    /// The sample was logged and folded in; `constant` is the updated estimate.
    Accepted {
        sample: CalibrationSample,
        constant: f64,
    },
    /// No marker was visible when the measurement was taken. Nothing changed.
    NoMarker,
}

/// Running sum of products and sample count.
#[derive(Debug, Default, Clone)]
pub struct CalibrationAccumulator {
    sum: f64,
    count: usize,
}

impl CalibrationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer one measurement.
    ///
    /// `corner_distance` must be a read of the shared slot taken just before
    /// the call; `None` means no marker was in view and the sample is rejected
    /// without touching the log. Accepted samples are written to `log` before
    /// the statistics change, so a failed write leaves the accumulator as it was.
    pub fn submit<W: Write>(
        &mut self,
        corner_distance: Option<f64>,
        measured_distance: f64,
        log: &mut SessionLog<W>,
    ) -> Result<Submission> {
        if !measured_distance.is_finite() || measured_distance < 0.0 {
            bail!("measured distance must be a non-negative number, got {measured_distance}");
        }

        let Some(corner_distance) = corner_distance else {
            debug!(measured_distance, "sample rejected: no marker in view");
            return Ok(Submission::NoMarker);
        };

        let sample = CalibrationSample {
            corner_distance,
            measured_distance,
        };
        log.append(&sample)?;

        self.sum += sample.product();
        self.count += 1;
        let constant = self.sum / self.count as f64;

        debug!(
            corner_distance,
            measured_distance,
            count = self.count,
            constant,
            "sample accepted"
        );

        Ok(Submission::Accepted { sample, constant })
    }

    /// Number of accepted samples.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Sum of `corner_distance * measured_distance` over accepted samples.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Current calibration constant, defined once a sample was accepted.
    pub fn constant(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Estimate the camera to marker distance for a corner distance.
    pub fn estimate_distance(&self, corner_distance: f64) -> Option<f64> {
        if corner_distance <= 0.0 {
            return None;
        }
        self.constant().map(|k| k / corner_distance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn log_lines(buf: &[u8]) -> Vec<String> {
        String::from_utf8(buf.to_vec())
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn test_two_samples_end_to_end() {
        let mut buf = Vec::new();
        let mut log = SessionLog::from_writer(&mut buf).unwrap();
        let mut acc = CalibrationAccumulator::new();

        let first = acc.submit(Some(100.0), 2.0, &mut log).unwrap();
        assert!(matches!(first, Submission::Accepted { constant, .. } if constant == 200.0));

        let second = acc.submit(Some(50.0), 2.0, &mut log).unwrap();
        match second {
            Submission::Accepted { sample, constant } => {
                assert_eq!(sample.corner_distance, 50.0);
                assert_relative_eq!(constant, 150.0);
            }
            Submission::NoMarker => panic!("sample should be accepted"),
        }
        assert_eq!(acc.count(), 2);
        assert_relative_eq!(acc.sum(), 300.0);

        log.close().unwrap();
        let lines = log_lines(&buf);
        assert_eq!(lines, vec![
            "\"corner distance\" \"measured distance\"",
            "100 2",
            "50 2",
        ]);
    }

    #[test]
    fn test_no_marker_rejects_without_logging() {
        let mut buf = Vec::new();
        let mut log = SessionLog::from_writer(&mut buf).unwrap();
        let mut acc = CalibrationAccumulator::new();

        assert_eq!(acc.submit(None, 1.5, &mut log).unwrap(), Submission::NoMarker);
        assert_eq!(acc.count(), 0);
        assert_eq!(acc.constant(), None);
        assert_eq!(log.records_written(), 0);

        log.close().unwrap();
        assert_eq!(log_lines(&buf).len(), 1);
    }

    #[test]
    fn test_order_does_not_change_constant() {
        let samples = [
            (120.0, 1.5),
            (64.0, 3.0),
            (250.0, 0.75),
            (90.0, 2.0),
            (48.0, 4.0),
        ];
        let orders: [[usize; 5]; 4] = [
            [0, 1, 2, 3, 4],
            [4, 3, 2, 1, 0],
            [2, 0, 4, 1, 3],
            [1, 4, 0, 3, 2],
        ];

        let constants: Vec<f64> = orders
            .iter()
            .map(|order| {
                let mut log = SessionLog::from_writer(Vec::new()).unwrap();
                let mut acc = CalibrationAccumulator::new();
                for &i in order {
                    let (corner, measured) = samples[i];
                    acc.submit(Some(corner), measured, &mut log).unwrap();
                }
                acc.constant().unwrap()
            })
            .collect();

        for c in &constants {
            assert_eq!(*c, constants[0]);
        }
        assert_relative_eq!(constants[0], (180.0 + 192.0 + 187.5 + 180.0 + 192.0) / 5.0);
    }

    #[test]
    fn test_zero_corner_distance_is_accepted() {
        let mut log = SessionLog::from_writer(Vec::new()).unwrap();
        let mut acc = CalibrationAccumulator::new();
        let outcome = acc.submit(Some(0.0), 3.0, &mut log).unwrap();
        assert!(matches!(outcome, Submission::Accepted { constant, .. } if constant == 0.0));
        assert_eq!(acc.count(), 1);
    }

    #[test]
    fn test_negative_measurement_is_refused() {
        let mut log = SessionLog::from_writer(Vec::new()).unwrap();
        let mut acc = CalibrationAccumulator::new();
        assert!(acc.submit(Some(10.0), -2.0, &mut log).is_err());
        assert!(acc.submit(Some(10.0), f64::NAN, &mut log).is_err());
        assert_eq!(acc.count(), 0);
        assert_eq!(log.records_written(), 0);
    }

    #[test]
    fn test_estimate_distance() {
        let mut log = SessionLog::from_writer(Vec::new()).unwrap();
        let mut acc = CalibrationAccumulator::new();
        assert_eq!(acc.estimate_distance(100.0), None);
        acc.submit(Some(100.0), 2.0, &mut log).unwrap();
        assert_relative_eq!(acc.estimate_distance(50.0).unwrap(), 4.0);
        assert_eq!(acc.estimate_distance(0.0), None);
    }
}
