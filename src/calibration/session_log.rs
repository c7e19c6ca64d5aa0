//! Append-only record of the accepted calibration samples.
//!
//! One file per session, named after the local start time:
//!
//! ```text
//! distance_calibration 2024-05-17 14:03:09.log
//! ```
//!
//! The first line is a quoted two-column header, then one
//! `<corner distance> <measured distance>` line per accepted sample.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDateTime};
use csv::{QuoteStyle, Terminator, WriterBuilder};
use tracing::info;

use super::accumulator::CalibrationSample;

const FILE_PREFIX: &str = "distance_calibration";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const HEADER: [&str; 2] = ["corner distance", "measured distance"];

/// File name for a session started at `started_at` (local time).
pub fn log_file_name(started_at: NaiveDateTime) -> String {
    format!("{FILE_PREFIX} {}.log", started_at.format(TIMESTAMP_FORMAT))
}

/// Space-separated sample log. Each record is flushed as soon as it is written.
pub struct SessionLog<W: Write> {
    writer: csv::Writer<W>,
    path: Option<PathBuf>,
    records: usize,
}

impl SessionLog<File> {
    /// Create the log for a session starting now in `dir`.
    pub fn create_in(dir: &Path) -> Result<Self> {
        Self::create_at(dir, Local::now().naive_local())
    }

    /// Create the log for a session started at `started_at` in `dir`.
    ///
    /// Refuses to overwrite an existing file.
    pub fn create_at(dir: &Path, started_at: NaiveDateTime) -> Result<Self> {
        let path = dir.join(log_file_name(started_at));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("Failed to create session log {}", path.display()))?;

        let mut log = Self::from_writer(file)?;
        info!("Logging samples to {}", path.display());
        log.path = Some(path);
        Ok(log)
    }
}

impl<W: Write> SessionLog<W> {
    /// Wrap an arbitrary writer and emit the header line.
    pub fn from_writer(inner: W) -> Result<Self> {
        let writer = WriterBuilder::new()
            .delimiter(b' ')
            .terminator(Terminator::Any(b'\n'))
            .quote_style(QuoteStyle::Necessary)
            .from_writer(inner);

        let mut log = Self {
            writer,
            path: None,
            records: 0,
        };
        log.writer
            .write_record(HEADER)
            .context("Failed to write session log header")?;
        log.writer.flush()?;
        Ok(log)
    }

    /// Append one accepted sample.
    pub fn append(&mut self, sample: &CalibrationSample) -> Result<()> {
        self.writer
            .write_record([
                sample.corner_distance.to_string(),
                sample.measured_distance.to_string(),
            ])
            .context("Failed to write sample to session log")?;
        self.writer.flush().context("Failed to flush session log")?;
        self.records += 1;
        Ok(())
    }

    /// Number of samples written so far (the header is not counted).
    pub fn records_written(&self) -> usize {
        self.records
    }

    /// Path of the backing file, if the log was created on disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush and release the underlying writer.
    pub fn close(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow!("Failed to flush session log: {}", e.error()))
    }
}
