//! Playback timeline: decodes songs on a worker thread and reports to the engine.
//!
//! The decoder pushes `Started`, PCM blocks and finally `Ended`/`Stopped` into
//! the engine queue. Every message carries the generation of the song it
//! belongs to so the engine can drop stragglers from a song it already tore down.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tracing::{debug, error, info, warn};

use super::pcm::{normalize_sample, AudioFormat, PcmChunk};
use crate::engine::EngineEvent;
use crate::error::{LightsError, Result};

/// Multi-channel frames per decoded block (~23 ms at 44.1 kHz)
pub const CHUNK_FRAMES: usize = 1024;

/// Timeline notifications from the decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// First samples are about to play
    Started { format: AudioFormat },
    /// Playback was cut short (stop request or decode error)
    Stopped,
    /// The song played to its end
    Ended,
}

/// Something that can start a song and feed the engine queue
pub trait PlaybackSource {
    /// Start playing `path`. Errors here mean the song can't be played at all.
    fn start(
        &mut self,
        path: &Path,
        generation: u64,
        events: Sender<EngineEvent>,
    ) -> Result<PlaybackHandle>;
}

/// Control over a playing song; dropping it stops the decoder
#[derive(Debug)]
pub struct PlaybackHandle {
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl PlaybackHandle {
    pub fn new(stop: Arc<AtomicBool>, thread: Option<thread::JoinHandle<()>>) -> Self {
        Self { stop, thread }
    }

    /// Handle with no worker behind it
    pub fn detached() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)), None)
    }

    /// Ask the decoder to stop. Returns immediately.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Stop and wait for the decoder thread to exit
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Decoder thread panicked");
            }
        }
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// WAV decoder with optional audio output
pub struct WavSource {
    /// Play through the output device
    pub output: bool,
    /// Forward PCM blocks to the engine (needed for spectral mode only)
    pub forward_pcm: bool,
}

impl WavSource {
    pub fn new(output: bool, forward_pcm: bool) -> Self {
        Self {
            output,
            forward_pcm,
        }
    }
}

impl PlaybackSource for WavSource {
    fn start(
        &mut self,
        path: &Path,
        generation: u64,
        events: Sender<EngineEvent>,
    ) -> Result<PlaybackHandle> {
        let (reader, format) = open_wav(path)?;
        info!(
            "Playing {} ({} ch @ {}Hz, {} bit)",
            path.display(),
            format.channels,
            format.sample_rate,
            format.bit_depth
        );

        let stop = Arc::new(AtomicBool::new(false));
        let decoder = Decoder {
            format,
            generation,
            events,
            stop: Arc::clone(&stop),
            output: self.output,
            forward_pcm: self.forward_pcm,
        };
        let thread = thread::Builder::new()
            .name(format!("decoder-{}", generation))
            .spawn(move || decoder.run(reader))?;

        Ok(PlaybackHandle::new(stop, Some(thread)))
    }
}

struct Decoder {
    format: AudioFormat,
    generation: u64,
    events: Sender<EngineEvent>,
    stop: Arc<AtomicBool>,
    output: bool,
    forward_pcm: bool,
}

impl Decoder {
    fn run<R: Read>(self, mut reader: hound::WavReader<R>) {
        let mut out = AudioOut::open(&self.format, self.output);
        if !self.send_event(PlaybackEvent::Started {
            format: self.format,
        }) {
            return;
        }

        let mut samples = wav_samples(&mut reader);

        let block_len = CHUNK_FRAMES * self.format.channels as usize;
        let outcome = loop {
            if self.stop.load(Ordering::Relaxed) {
                debug!(generation = self.generation, "decoder stopped on request");
                break PlaybackEvent::Stopped;
            }

            let mut block = Vec::with_capacity(block_len);
            let mut failed = false;
            for sample in samples.by_ref().take(block_len) {
                match sample {
                    Ok(s) => block.push(s),
                    Err(e) => {
                        error!("Audio decode failed mid-song: {}", e);
                        failed = true;
                        break;
                    }
                }
            }

            let exhausted = block.len() < block_len;
            if !block.is_empty() {
                let chunk = PcmChunk::new(block, self.format.channels);
                out.write(&chunk, &self.stop);
                if self.forward_pcm
                    && self
                        .events
                        .send(EngineEvent::Pcm {
                            generation: self.generation,
                            chunk,
                        })
                        .is_err()
                {
                    return;
                }
            }

            if failed {
                break PlaybackEvent::Stopped;
            }
            if exhausted {
                break PlaybackEvent::Ended;
            }
        };

        out.drain(&self.stop);
        self.send_event(outcome);
    }

    fn send_event(&self, event: PlaybackEvent) -> bool {
        self.events
            .send(EngineEvent::Playback {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Open a WAV file and check that its format is playable
pub fn open_wav(path: &Path) -> Result<(hound::WavReader<BufReader<File>>, AudioFormat)> {
    let decode_error = |reason: String| LightsError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let reader = hound::WavReader::open(path).map_err(|e| decode_error(e.to_string()))?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(decode_error(format!(
            "unusable format: {} channels @ {}Hz",
            spec.channels, spec.sample_rate
        )));
    }

    let format = AudioFormat {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bit_depth: spec.bits_per_sample,
    };
    Ok((reader, format))
}

/// Interleaved samples scaled to [-1.0, 1.0], whatever the stored sample format
pub fn wav_samples<R: Read>(
    reader: &mut hound::WavReader<R>,
) -> Box<dyn Iterator<Item = hound::Result<f32>> + '_> {
    let spec = reader.spec();
    let bits = spec.bits_per_sample;
    match spec.sample_format {
        hound::SampleFormat::Float => Box::new(reader.samples::<f32>()),
        hound::SampleFormat::Int => Box::new(
            reader
                .samples::<i32>()
                .map(move |s| s.map(|v| normalize_sample(v, bits))),
        ),
    }
}

/// Where decoded samples go: an output device, or nowhere at real-time pace
enum AudioOut {
    Paced {
        started: Instant,
        frames: u64,
        sample_rate: u32,
    },
    #[cfg(feature = "audio-output")]
    Device(super::device::OutputDevice),
}

impl AudioOut {
    fn open(format: &AudioFormat, enabled: bool) -> Self {
        #[cfg(feature = "audio-output")]
        {
            if enabled {
                match super::device::OutputDevice::open(format) {
                    Ok(device) => return Self::Device(device),
                    Err(e) => warn!("{}; continuing without sound", e),
                }
            }
        }
        #[cfg(not(feature = "audio-output"))]
        {
            if enabled {
                warn!("Built without the audio-output feature; decoding at real-time pace only");
            }
        }

        Self::Paced {
            started: Instant::now(),
            frames: 0,
            sample_rate: format.sample_rate,
        }
    }

    /// Hand a block to the output, blocking until it is due
    fn write(&mut self, chunk: &PcmChunk, stop: &AtomicBool) {
        match self {
            Self::Paced {
                started,
                frames,
                sample_rate,
            } => {
                let due = frames_to_duration(*frames, *sample_rate);
                let elapsed = started.elapsed();
                if due > elapsed && !stop.load(Ordering::Relaxed) {
                    thread::sleep(due - elapsed);
                }
                *frames += chunk.frames() as u64;
            }
            #[cfg(feature = "audio-output")]
            Self::Device(device) => device.write(chunk, stop),
        }
    }

    /// Wait for queued audio to finish playing
    fn drain(&mut self, stop: &AtomicBool) {
        match self {
            Self::Paced {
                started,
                frames,
                sample_rate,
            } => {
                let end = frames_to_duration(*frames, *sample_rate);
                let elapsed = started.elapsed();
                if end > elapsed && !stop.load(Ordering::Relaxed) {
                    thread::sleep(end - elapsed);
                }
            }
            #[cfg(feature = "audio-output")]
            Self::Device(device) => device.drain(stop),
        }
    }
}

fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    Duration::from_nanos((frames as u128 * 1_000_000_000 / sample_rate.max(1) as u128) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn write_wav(path: &Path, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let s = if i % 2 == 0 { 16384 } else { -16384 };
            writer.write_sample(s as i16).unwrap();
            writer.write_sample(s as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_frames_to_duration() {
        assert_eq!(frames_to_duration(44100, 44100), Duration::from_secs(1));
        assert_eq!(frames_to_duration(400, 8000), Duration::from_millis(50));
    }

    #[test]
    fn test_missing_file_is_decode_error() {
        let (tx, _rx) = unbounded();
        let mut source = WavSource::new(false, true);
        let err = source
            .start(Path::new("/definitely/not/here.wav"), 1, tx)
            .unwrap_err();
        assert!(matches!(err, LightsError::Decode { .. }));
    }

    #[test]
    fn test_decoder_reports_timeline_and_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        // 2048 frames at 64 kHz = 32 ms of audio
        write_wav(&path, 64_000, 2048);

        let (tx, rx) = unbounded();
        let mut source = WavSource::new(false, true);
        let _handle = source.start(&path, 7, tx).unwrap();

        let mut events = Vec::new();
        let mut pcm_frames = 0;
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(5)) {
            match event {
                EngineEvent::Playback { generation, event } => {
                    assert_eq!(generation, 7);
                    let done = event == PlaybackEvent::Ended;
                    events.push(event);
                    if done {
                        break;
                    }
                }
                EngineEvent::Pcm { chunk, .. } => {
                    assert_eq!(chunk.samples[0], 0.5);
                    pcm_frames += chunk.frames();
                }
                _ => {}
            }
        }

        assert_eq!(
            events.first(),
            Some(&PlaybackEvent::Started {
                format: AudioFormat {
                    sample_rate: 64_000,
                    channels: 2,
                    bit_depth: 16,
                }
            })
        );
        assert_eq!(events.last(), Some(&PlaybackEvent::Ended));
        assert_eq!(pcm_frames, 2048);
    }

    #[test]
    fn test_stop_request_ends_with_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        // ~2 s of audio; we stop long before the end
        write_wav(&path, 8000, 16_000);

        let (tx, rx) = unbounded();
        let mut source = WavSource::new(false, false);
        let mut handle = source.start(&path, 1, tx).unwrap();
        handle.stop();

        let mut last = None;
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(5)) {
            if let EngineEvent::Playback { event, .. } = event {
                let done = matches!(event, PlaybackEvent::Stopped | PlaybackEvent::Ended);
                last = Some(event);
                if done {
                    break;
                }
            }
        }
        assert_eq!(last, Some(PlaybackEvent::Stopped));
    }
}
