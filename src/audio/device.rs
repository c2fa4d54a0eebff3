//! Audio output through the default cpal device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, SendTimeoutError, Sender};
use tracing::{error, info};

use super::pcm::{AudioFormat, PcmChunk};
use crate::error::{LightsError, Result};

/// Decoded blocks allowed to queue ahead of the device (~200 ms at 44.1 kHz)
const QUEUED_BLOCKS: usize = 8;

/// Output stream fed from the decoder thread.
///
/// The queue is bounded, so a full queue blocks the decoder and the device
/// clock ends up pacing decoding.
pub struct OutputDevice {
    tx: Sender<Arc<[f32]>>,
    /// Audio output stream (kept alive)
    _stream: cpal::Stream,
}

impl OutputDevice {
    pub fn open(format: &AudioFormat) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| LightsError::AudioOutput("no audio output device found".to_string()))?;

        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        info!(
            "Audio: {} @ {}Hz",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            format.sample_rate
        );

        let (tx, rx) = bounded::<Arc<[f32]>>(QUEUED_BLOCKS);
        let mut pending: Option<Arc<[f32]>> = None;
        let mut pos = 0;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for out in data.iter_mut() {
                        if pending.as_ref().map_or(true, |p| pos >= p.len()) {
                            pending = rx.try_recv().ok();
                            pos = 0;
                        }
                        // Underrun plays silence
                        *out = match pending.as_ref().and_then(|p| p.get(pos)) {
                            Some(&sample) => {
                                pos += 1;
                                sample
                            }
                            None => 0.0,
                        };
                    }
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| LightsError::AudioOutput(format!("failed to build audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| LightsError::AudioOutput(format!("failed to start audio stream: {}", e)))?;

        Ok(Self {
            tx,
            _stream: stream,
        })
    }

    /// Queue a block, waiting while the device is behind
    pub fn write(&mut self, chunk: &PcmChunk, stop: &AtomicBool) {
        let mut block = Arc::clone(&chunk.samples);
        loop {
            match self.tx.send_timeout(block, Duration::from_millis(50)) {
                Ok(()) => return,
                Err(SendTimeoutError::Timeout(returned)) => {
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                    block = returned;
                }
                Err(SendTimeoutError::Disconnected(_)) => return,
            }
        }
    }

    /// Wait until the device has pulled everything queued
    pub fn drain(&mut self, stop: &AtomicBool) {
        while !self.tx.is_empty() && !stop.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(10));
        }
    }
}
