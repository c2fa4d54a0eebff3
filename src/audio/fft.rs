//! Live spectral analysis of decoded audio.
//!
//! Samples accumulate until a full window is buffered; only then is the FFT
//! run, so the decoder never waits on analysis. Each window becomes one control
//! frame with one value per channel, where channel `i` averages the magnitude of
//! bins `[2^i, 2^(i+1))`. Low channels are bass.

use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::{debug, warn};

use super::pcm::{AudioFormat, PcmChunk};
use crate::control::ControlFrame;
use crate::error::{LightsError, Result};
use crate::params::SpectralParams;

/// Windowed FFT over a mono downmix of the playing song
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window_size: usize,
    channel_count: usize,
    sample_rate: u32,
    /// Per-sample weights when the Hann window is enabled
    weights: Option<Vec<f32>>,
    buffer: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    /// Mono samples already turned into frames
    consumed: u64,
}

impl fmt::Debug for SpectralAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralAnalyzer")
            .field("window_size", &self.window_size)
            .field("channel_count", &self.channel_count)
            .field("sample_rate", &self.sample_rate)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl SpectralAnalyzer {
    pub fn new(format: &AudioFormat, channel_count: usize, params: &SpectralParams) -> Result<Self> {
        if format.sample_rate == 0 {
            return Err(LightsError::InvalidArgument(
                "sample rate must be > 0".to_string(),
            ));
        }
        if channel_count == 0 {
            return Err(LightsError::InvalidArgument(
                "spectral analysis needs at least one channel".to_string(),
            ));
        }

        let window_size = params.window_size(format.sample_rate);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(window_size);

        debug!(
            window_size,
            bin_width_hz = params.bin_width_hz(format.sample_rate),
            "Spectral analyzer ready"
        );

        Ok(Self {
            fft,
            window_size,
            channel_count,
            sample_rate: format.sample_rate,
            weights: params.hann_window.then(|| hann_weights(window_size)),
            buffer: Vec::with_capacity(window_size * 2),
            scratch: vec![Complex::new(0.0, 0.0); window_size],
            consumed: 0,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Samples waiting for the next window
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn window_ready(&self) -> bool {
        self.buffer.len() >= self.window_size
    }

    /// Buffer a decoded block (downmixed to mono)
    pub fn push_samples(&mut self, chunk: &PcmChunk) {
        self.buffer.extend(chunk.mono());
    }

    /// Analyze the oldest full window, if one is buffered
    pub fn next_frame(&mut self) -> Option<ControlFrame> {
        if !self.window_ready() {
            return None;
        }

        let nanos = self.consumed as u128 * 1_000_000_000 / self.sample_rate as u128;
        let offset = Duration::from_nanos(nanos as u64);
        let window: Vec<f32> = self.buffer.drain(..self.window_size).collect();
        self.consumed += self.window_size as u64;

        match self.spectrum(&window) {
            Ok(bins) => Some(ControlFrame::new(offset, log_buckets(&bins, self.channel_count))),
            Err(e) => {
                warn!("Skipping spectral window: {}", e);
                None
            }
        }
    }

    /// Magnitude spectrum of one window: `len/2 + 1` bins.
    ///
    /// The window must hold exactly [`window_size`](Self::window_size) samples.
    pub fn spectrum(&mut self, window: &[f32]) -> Result<Vec<f32>> {
        if window.is_empty() {
            return Err(LightsError::InvalidArgument(
                "cannot transform an empty sample window".to_string(),
            ));
        }
        if window.len() != self.window_size {
            return Err(LightsError::InvalidArgument(format!(
                "FFT window of {} samples does not match plan of {}",
                window.len(),
                self.window_size
            )));
        }

        match &self.weights {
            Some(weights) => {
                for ((slot, &sample), &w) in self.scratch.iter_mut().zip(window).zip(weights) {
                    *slot = Complex::new(sample * w, 0.0);
                }
            }
            None => {
                for (slot, &sample) in self.scratch.iter_mut().zip(window) {
                    *slot = Complex::new(sample, 0.0);
                }
            }
        }
        self.fft.process(&mut self.scratch);

        let half = self.window_size / 2 + 1;
        Ok(self.scratch[..half].iter().map(|c| c.norm()).collect())
    }
}

/// Average spectrum bins into logarithmic buckets; bucket `i` covers bins
/// `[2^i, 2^(i+1))`. Buckets past the end of the spectrum read 0.0.
pub fn log_buckets(bins: &[f32], bucket_count: usize) -> Vec<f32> {
    (0..bucket_count)
        .map(|i| {
            let start = 1usize.checked_shl(i as u32).unwrap_or(usize::MAX);
            let end = 1usize.checked_shl(i as u32 + 1).unwrap_or(usize::MAX);
            if start >= bins.len() {
                return 0.0;
            }
            let bucket = &bins[start..end.min(bins.len())];
            bucket.iter().sum::<f32>() / bucket.len() as f32
        })
        .collect()
}

/// Symmetric Hann taper: zero at both ends, one in the middle
fn hann_weights(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let span = (size - 1) as f32;
    (0..size)
        .map(|i| {
            let phase = 2.0 * PI * i as f32 / span;
            0.5 - 0.5 * phase.cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn format(sample_rate: u32, channels: u16) -> AudioFormat {
        AudioFormat {
            sample_rate,
            channels,
            bit_depth: 16,
        }
    }

    fn sine(freq_hz: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq_hz * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    fn analyzer(channels: usize, hann_window: bool) -> SpectralAnalyzer {
        let params = SpectralParams {
            hann_window,
            ..SpectralParams::default()
        };
        SpectralAnalyzer::new(&format(8000, 1), channels, &params).unwrap()
    }

    #[test]
    fn test_empty_window_is_invalid() {
        let mut analyzer = analyzer(4, false);
        assert!(matches!(
            analyzer.spectrum(&[]),
            Err(LightsError::InvalidArgument(_))
        ));
        assert!(matches!(
            analyzer.spectrum(&[0.0; 16]),
            Err(LightsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_spectrum_length() {
        let mut analyzer = analyzer(4, false);
        assert_eq!(analyzer.spectrum(&[0.0; 400]).unwrap().len(), 201);
    }

    #[test]
    fn test_dc_lands_in_bin_zero() {
        let mut analyzer = analyzer(4, false);
        let spectrum = analyzer.spectrum(&[1.0; 400]).unwrap();
        assert_relative_eq!(spectrum[0], 400.0, epsilon = 1e-2);
        assert!(spectrum[1..].iter().all(|&m| m < 1e-2));
    }

    #[test]
    fn test_log_buckets_average_power_of_two_ranges() {
        let bins: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let buckets = log_buckets(&bins, 5);

        // [1,2) [2,4) [4,8) [8,10) then past the end
        assert_eq!(buckets, vec![1.0, 2.5, 5.5, 8.5, 0.0]);
    }

    #[test]
    fn test_log_buckets_huge_count_does_not_overflow() {
        let buckets = log_buckets(&[1.0; 4], 80);
        assert_eq!(buckets.len(), 80);
        assert!(buckets[3..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_analyzer_waits_for_full_window() {
        let params = SpectralParams::default();
        let mut analyzer = SpectralAnalyzer::new(&format(8000, 1), 8, &params).unwrap();
        assert_eq!(analyzer.window_size(), 400);

        analyzer.push_samples(&PcmChunk::new(vec![0.0; 399], 1));
        assert!(analyzer.next_frame().is_none());

        analyzer.push_samples(&PcmChunk::new(vec![0.0; 450], 1));
        let frame = analyzer.next_frame().unwrap();
        assert_eq!(frame.values.len(), 8);
        assert_eq!(frame.offset, Duration::ZERO);

        let frame = analyzer.next_frame().unwrap();
        assert_eq!(frame.offset, Duration::from_millis(50));
        assert!(analyzer.next_frame().is_none());
        assert_eq!(analyzer.buffered(), 49);
    }

    #[test]
    fn test_stereo_is_downmixed_before_windowing() {
        let params = SpectralParams::default();
        let mut analyzer = SpectralAnalyzer::new(&format(8000, 2), 4, &params).unwrap();

        // 400 stereo frames = one mono window
        analyzer.push_samples(&PcmChunk::new(vec![0.25; 800], 2));
        assert_eq!(analyzer.buffered(), 400);
        assert!(analyzer.next_frame().is_some());
    }

    #[test]
    fn test_tone_lights_matching_bucket() {
        let params = SpectralParams::default();
        let sample_rate = 8000;
        let mut analyzer = SpectralAnalyzer::new(&format(sample_rate, 1), 8, &params).unwrap();

        // 20 Hz bins at 8 kHz; 600 Hz is bin 30, which falls in bucket 4 ([16, 32))
        let samples = sine(600.0, sample_rate, analyzer.window_size());
        analyzer.push_samples(&PcmChunk::new(samples, 1));
        let frame = analyzer.next_frame().unwrap();

        let loudest = frame
            .values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(loudest, Some(4));
    }

    #[test]
    fn test_hann_window_suppresses_leakage() {
        // 610 Hz sits between bins 30 and 31; compare energy far from the tone
        let tone = sine(610.0, 8000, 400);
        let far = |spectrum: &[f32]| spectrum[100..].iter().cloned().fold(0.0f32, f32::max);

        let plain = analyzer(8, false).spectrum(&tone).unwrap();
        let tapered = analyzer(8, true).spectrum(&tone).unwrap();

        assert!(far(&tapered) * 10.0 < far(&plain));
        let peak = |s: &[f32]| s.iter().cloned().fold(0.0f32, f32::max);
        assert!(peak(&tapered) > 50.0);
    }

    #[test]
    fn test_hann_window_silences_edges() {
        let weights = hann_weights(400);
        assert_relative_eq!(weights[0], 0.0);
        assert_relative_eq!(weights[399], 0.0, epsilon = 1e-6);
        assert!(weights[199] > 0.99 && weights[200] > 0.99);

        // A window that is loud only at its ends reads near-silent when tapered
        let mut edges = vec![0.0f32; 400];
        edges[0] = 1.0;
        edges[399] = 1.0;
        let tapered = analyzer(4, true).spectrum(&edges).unwrap();
        assert!(tapered.iter().all(|&m| m < 1e-3));
    }
}
