//! Audio decoding and spectral analysis.
//!
//! Decodes songs into PCM on a worker thread (optionally playing them through
//! the output device) and turns PCM into per-channel control frames via FFT.

#[cfg(feature = "audio-output")]
mod device;
mod fft;
mod pcm;
mod system;

// Re-export public types
pub use fft::{log_buckets, SpectralAnalyzer};
pub use pcm::{normalize_sample, AudioFormat, PcmChunk};
pub use system::{
    open_wav, wav_samples, PlaybackEvent, PlaybackHandle, PlaybackSource, WavSource, CHUNK_FRAMES,
};
