//! Decoded audio blocks passed from the decoder to the control loop.

use std::sync::Arc;

/// Format of the song currently playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

/// Block of interleaved samples, already normalized to [-1.0, 1.0]
#[derive(Debug, Clone)]
pub struct PcmChunk {
    pub samples: Arc<[f32]>,
    pub channels: u16,
}

impl PcmChunk {
    pub fn new(samples: Vec<f32>, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            channels: channels.max(1),
        }
    }

    /// Number of multi-channel frames in the block
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Average interleaved channels down to mono
    pub fn mono(&self) -> impl Iterator<Item = f32> + '_ {
        let channels = self.channels as usize;
        self.samples
            .chunks_exact(channels)
            .map(move |frame| frame.iter().sum::<f32>() / channels as f32)
    }
}

/// Scale an integer sample to [-1.0, 1.0] by its bit depth
pub fn normalize_sample(sample: i32, bit_depth: u16) -> f32 {
    let full_scale = (1u64 << bit_depth.clamp(1, 32).saturating_sub(1)) as f32;
    sample as f32 / full_scale
}
