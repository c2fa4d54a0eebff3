//! Spectral analysis configuration.

use serde::{Deserialize, Serialize};

use crate::error::{LightsError, Result};

/// Lowest `min_frequency_hz` accepted; below this the FFT window grows past a second of audio
pub const MIN_FREQUENCY_FLOOR_HZ: f32 = 1.0;

/// Live FFT analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralParams {
    /// Lowest frequency the analysis window must resolve (Hz)
    pub min_frequency_hz: f32,

    /// Threshold applied to every bucket in spectral mode.
    /// Song thresholds are calibrated against precomputed tracks and don't carry over.
    pub threshold: f32,

    /// Apply a Hann window before the FFT
    pub hann_window: bool,
}

impl Default for SpectralParams {
    fn default() -> Self {
        Self {
            min_frequency_hz: 20.0,
            threshold: 0.28,
            hann_window: false,
        }
    }
}

impl SpectralParams {
    /// Samples per FFT window for a given sample rate.
    ///
    /// Resolving `min_frequency_hz` needs `sample_rate / min_frequency_hz` samples;
    /// rounded up to an even count so the real spectrum splits cleanly.
    pub fn window_size(&self, sample_rate_hz: u32) -> usize {
        let half = (sample_rate_hz as f64 / (2.0 * self.min_frequency_hz as f64)).ceil();
        2 * half.max(1.0) as usize
    }

    /// Width of one FFT bin (Hz)
    pub fn bin_width_hz(&self, sample_rate_hz: u32) -> f32 {
        sample_rate_hz as f32 / self.window_size(sample_rate_hz) as f32
    }

    pub fn validate(&self) -> Result<()> {
        let freq = self.min_frequency_hz;
        if !freq.is_finite() || !(freq >= MIN_FREQUENCY_FLOOR_HZ) {
            return Err(LightsError::Config(format!(
                "min_frequency_hz must be at least {} Hz, got {}",
                MIN_FREQUENCY_FLOOR_HZ, freq
            )));
        }
        if !self.threshold.is_finite() {
            return Err(LightsError::Config(format!(
                "spectral threshold must be finite, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}
