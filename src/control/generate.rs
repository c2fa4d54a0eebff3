//! Offline control track generation.
//!
//! Runs the spectral analyzer over a whole song as fast as it decodes and
//! writes one CSV row per analysis window, so static mode lights the song the
//! same way spectral mode would have. The row spacing (`msPerLine`) and the
//! calibrated thresholds go into the song's metadata sidecar.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{calibrate_thresholds, control_path_for, TrackReader};
use crate::audio::{open_wav, wav_samples, PcmChunk, SpectralAnalyzer, CHUNK_FRAMES};
use crate::error::{LightsError, Result};
use crate::params::SpectralParams;

/// Result of analyzing one song
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTrack {
    /// Where the control track was written
    pub path: PathBuf,
    /// Data rows written (header excluded)
    pub rows: usize,
    /// Song time covered by one row, in milliseconds
    pub ms_per_line: f64,
    /// Length of the decoded audio in seconds
    pub duration: f64,
    pub thresholds: Vec<f32>,
}

impl GeneratedTrack {
    /// Row spacing as a duration
    pub fn quantum(&self) -> Duration {
        Duration::from_secs_f64(self.ms_per_line / 1000.0)
    }

    /// Sidecar keys this track provides
    pub fn metadata(&self) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("msPerLine".to_string(), json!(self.ms_per_line));
        metadata.insert("thresholds".to_string(), json!(self.thresholds));
        metadata.insert("duration".to_string(), json!(self.duration));
        metadata
    }
}

/// Header label for a bucket: the frequency range it averages
fn bucket_label(bucket: usize, bin_width_hz: f32) -> String {
    let low = (1u64 << bucket.min(62)) as f32 * bin_width_hz;
    let high = (1u64 << (bucket + 1).min(63)) as f32 * bin_width_hz;
    format!("{:.0}-{:.0} Hz", low, high)
}

/// Analyze `audio` and write its control track next to it (`song.wav` -> `song.csv`).
///
/// A trailing partial window is dropped. Audio shorter than one window is an
/// invalid argument: there is nothing to calibrate against.
pub fn generate_track(
    audio: &Path,
    channel_count: usize,
    params: &SpectralParams,
) -> Result<GeneratedTrack> {
    let (mut reader, format) = open_wav(audio)?;
    let mut analyzer = SpectralAnalyzer::new(&format, channel_count, params)?;
    let window_size = analyzer.window_size();
    let ms_per_line = window_size as f64 * 1000.0 / format.sample_rate as f64;

    let path = control_path_for(audio);
    let mut writer = csv::Writer::from_path(&path)?;
    let bin_width = params.bin_width_hz(format.sample_rate);
    writer.write_record((0..channel_count).map(|i| bucket_label(i, bin_width)))?;

    let block_len = CHUNK_FRAMES * format.channels as usize;
    let mut samples = wav_samples(&mut reader);
    let mut rows = 0usize;
    let mut frames_decoded = 0u64;
    loop {
        let block = samples
            .by_ref()
            .take(block_len)
            .collect::<hound::Result<Vec<f32>>>()
            .map_err(|e| LightsError::Decode {
                path: audio.to_path_buf(),
                reason: e.to_string(),
            })?;
        if block.is_empty() {
            break;
        }
        let exhausted = block.len() < block_len;

        let chunk = PcmChunk::new(block, format.channels);
        frames_decoded += chunk.frames() as u64;
        analyzer.push_samples(&chunk);
        while let Some(frame) = analyzer.next_frame() {
            writer.write_record(frame.values.iter().map(|v| v.to_string()))?;
            rows += 1;
        }

        if exhausted {
            break;
        }
    }
    writer.flush()?;
    debug!(rows, dropped_samples = analyzer.buffered(), "Control track written");

    if rows == 0 {
        return Err(LightsError::InvalidArgument(format!(
            "{} is shorter than one {}-sample analysis window",
            audio.display(),
            window_size
        )));
    }

    let quantum = Duration::from_secs_f64(ms_per_line / 1000.0);
    let track = TrackReader::open(&path, channel_count, quantum)?;
    let thresholds = calibrate_thresholds(&track, channel_count)?;
    let duration = frames_decoded as f64 / format.sample_rate as f64;

    info!(
        path = %path.display(),
        rows,
        ms_per_line,
        "Generated control track"
    );
    Ok(GeneratedTrack {
        path,
        rows,
        ms_per_line,
        duration,
        thresholds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn write_tone(path: &Path, sample_rate: u32, freq_hz: f32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let s = (2.0 * PI * freq_hz * i as f32 / sample_rate as f32).sin();
            writer.write_sample((s * 16000.0) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_bucket_labels() {
        assert_eq!(bucket_label(0, 20.0), "20-40 Hz");
        assert_eq!(bucket_label(3, 20.0), "160-320 Hz");
    }

    #[test]
    fn test_one_row_per_full_window() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("tone.wav");
        // 400-sample windows at 8 kHz; 10.5 windows of audio
        write_tone(&audio, 8000, 100.0, 4200);

        let generated = generate_track(&audio, 4, &SpectralParams::default()).unwrap();
        assert_eq!(generated.rows, 10);
        assert_eq!(generated.ms_per_line, 50.0);
        assert_eq!(generated.quantum(), Duration::from_millis(50));
        assert!((generated.duration - 0.525).abs() < 1e-9);
        assert_eq!(generated.path, dir.path().join("tone.csv"));

        let text = std::fs::read_to_string(&generated.path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("20-40 Hz,40-80 Hz,80-160 Hz,160-320 Hz"));
        assert_eq!(lines.count(), 10);
    }

    #[test]
    fn test_fractional_row_spacing() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("cd.wav");
        write_tone(&audio, 44100, 440.0, 44100);

        let generated = generate_track(&audio, 8, &SpectralParams::default()).unwrap();
        // 2206-sample windows at 44.1 kHz
        assert!((generated.ms_per_line - 50.022_675_736_961_45).abs() < 1e-9);
        assert_eq!(generated.rows, 19);
        assert_eq!(generated.metadata()["msPerLine"], json!(generated.ms_per_line));
    }

    #[test]
    fn test_audio_shorter_than_window_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("blip.wav");
        write_tone(&audio, 8000, 100.0, 100);

        let result = generate_track(&audio, 4, &SpectralParams::default());
        assert!(matches!(result, Err(LightsError::InvalidArgument(_))));
    }

    #[test]
    fn test_missing_audio_is_decode_error() {
        let result = generate_track(Path::new("/no/such/song.wav"), 4, &SpectralParams::default());
        assert!(matches!(result, Err(LightsError::Decode { .. })));
    }
}
