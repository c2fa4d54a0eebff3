//! Precomputed control tracks.
//!
//! A track is a comma-separated file next to the song (`song.wav` → `song.csv`).
//! The first row is a header and is discarded; every following row is one
//! quantum of song time.
//!
//! Row policy:
//! - rows shorter than the channel count are padded with 0.0
//! - columns past the channel count are ignored
//! - cells that don't parse as floats read as 0.0
//!
//! Rows are never dropped, so a bad row can't shift the timing of the rows
//! after it. Affected rows are summarized in a single warning per file.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::ControlFrame;
use crate::error::{LightsError, Result};

/// Control track path for an audio file (extension swapped to `.csv`)
pub fn control_path_for(audio: &Path) -> PathBuf {
    audio.with_extension("csv")
}

/// Sequential reader over a parsed control track
#[derive(Debug, Clone)]
pub struct TrackReader {
    frames: Vec<ControlFrame>,
    cursor: usize,
    quantum: Duration,
}

#[derive(Debug, Default)]
struct RowIssues {
    padded: usize,
    truncated: usize,
    bad_cells: usize,
}

impl TrackReader {
    /// Open and parse a track file.
    ///
    /// Any failure to read the file maps to [`LightsError::MissingControlData`];
    /// the caller decides whether to fall back to passive mode.
    pub fn open(path: &Path, channel_count: usize, quantum: Duration) -> Result<Self> {
        let missing = |reason: String| LightsError::MissingControlData {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| missing(e.to_string()))?;
        let reader = Self::from_reader(file, channel_count, quantum).map_err(|e| match e {
            LightsError::MissingControlData { .. } => e,
            other => missing(other.to_string()),
        })?;

        info!(
            path = %path.display(),
            rows = reader.len(),
            duration_s = reader.duration().as_secs_f32(),
            "Loaded control track"
        );
        Ok(reader)
    }

    /// Parse a track from any reader
    pub fn from_reader<R: Read>(source: R, channel_count: usize, quantum: Duration) -> Result<Self> {
        if channel_count == 0 {
            return Err(LightsError::InvalidArgument(
                "control track needs at least one channel".to_string(),
            ));
        }

        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(source);

        let mut frames = Vec::new();
        let mut issues = RowIssues::default();

        for (line, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }

            let row_index = frames.len();
            if record.len() < channel_count {
                issues.padded += 1;
                debug!(row = line + 1, columns = record.len(), "padding short control row");
            } else if record.len() > channel_count {
                issues.truncated += 1;
                debug!(row = line + 1, columns = record.len(), "ignoring extra control columns");
            }

            let mut values = vec![0.0; channel_count];
            for (value, cell) in values.iter_mut().zip(record.iter()) {
                match cell.parse::<f32>() {
                    Ok(parsed) => *value = parsed,
                    Err(_) => {
                        issues.bad_cells += 1;
                        debug!(row = line + 1, cell, "unparseable control value");
                    }
                }
            }

            frames.push(ControlFrame::new(quantum * row_index as u32, values));
        }

        if issues.padded + issues.truncated + issues.bad_cells > 0 {
            warn!(
                expected_columns = channel_count,
                padded_rows = issues.padded,
                truncated_rows = issues.truncated,
                bad_cells = issues.bad_cells,
                "Control track does not match channel layout; short rows padded with 0, extra columns ignored"
            );
        }

        Ok(Self {
            frames,
            cursor: 0,
            quantum,
        })
    }

    /// Next row if its offset has been reached
    pub fn next_frame(&mut self, elapsed: Duration) -> Option<ControlFrame> {
        let frame = self.frames.get(self.cursor)?;
        if frame.offset > elapsed {
            return None;
        }
        self.cursor += 1;
        Some(frame.clone())
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.frames.len()
    }

    /// Rows consumed so far
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn quantum(&self) -> Duration {
        self.quantum
    }

    /// Song time covered by the track
    pub fn duration(&self) -> Duration {
        self.quantum * self.frames.len() as u32
    }

    pub fn frames(&self) -> &[ControlFrame] {
        &self.frames
    }
}
