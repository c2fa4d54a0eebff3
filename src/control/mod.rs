//! Control data providers.
//!
//! A song's lights are driven either by a precomputed track (one CSV row per
//! quantum) or by live spectral analysis of the decoded audio. Both sit behind
//! [`ControlProvider::next_frame`].

mod calibrate;
mod generate;
mod track;

use std::time::Duration;

use crate::audio::{PcmChunk, SpectralAnalyzer};

pub use calibrate::calibrate_thresholds;
pub use generate::{generate_track, GeneratedTrack};
pub use track::{control_path_for, TrackReader};

/// One timestamped sample of per-channel readings
#[derive(Debug, Clone, PartialEq)]
pub struct ControlFrame {
    /// Offset from song start
    pub offset: Duration,
    /// One magnitude per channel
    pub values: Vec<f32>,
}

impl ControlFrame {
    pub fn new(offset: Duration, values: Vec<f32>) -> Self {
        Self { offset, values }
    }
}

/// Source of control frames for the active session
#[derive(Debug)]
pub enum ControlProvider {
    Static(TrackReader),
    Spectral(SpectralAnalyzer),
}

impl ControlProvider {
    /// Next frame due at `elapsed`, or `None` if nothing is due (or data is exhausted).
    ///
    /// Static tracks yield rows whose offset has been reached; the analyzer
    /// yields one frame per full window and ignores `elapsed`.
    pub fn next_frame(&mut self, elapsed: Duration) -> Option<ControlFrame> {
        match self {
            Self::Static(track) => track.next_frame(elapsed),
            Self::Spectral(analyzer) => analyzer.next_frame(),
        }
    }

    /// Feed decoded audio. Only the analyzer consumes it.
    pub fn push_pcm(&mut self, chunk: &PcmChunk) {
        if let Self::Spectral(analyzer) = self {
            analyzer.push_samples(chunk);
        }
    }

    /// No further frames will ever be produced
    pub fn is_exhausted(&self) -> bool {
        match self {
            Self::Static(track) => track.is_exhausted(),
            Self::Spectral(_) => false,
        }
    }

    pub fn is_spectral(&self) -> bool {
        matches!(self, Self::Spectral(_))
    }
}
