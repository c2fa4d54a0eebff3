//! Threshold evaluation: continuous channel values to on/off activations.

use crate::params::ChannelParams;

/// Boolean projection of a control frame through per-channel thresholds
pub type ActivationVector = Vec<bool>;

/// A channel is active only when its value is strictly above its threshold.
/// NaN values never activate.
#[inline]
pub fn is_active(value: f32, threshold: f32) -> bool {
    value > threshold
}

/// Evaluate a whole frame. The result has one entry per threshold;
/// values missing from a short frame count as 0.0.
pub fn evaluate(values: &[f32], thresholds: &[f32]) -> ActivationVector {
    thresholds
        .iter()
        .enumerate()
        .map(|(i, &threshold)| is_active(values.get(i).copied().unwrap_or(0.0), threshold))
        .collect()
}

/// Resolve the threshold table for a session.
///
/// Song thresholds win where present; shorter tables fall back to the configured
/// defaults and entries past `channel_count` are ignored.
pub fn resolve_thresholds(song: Option<&[f32]>, params: &ChannelParams) -> Vec<f32> {
    let song = song.unwrap_or(&[]);
    (0..params.channel_count)
        .map(|i| song.get(i).copied().unwrap_or_else(|| params.default_for(i)))
        .collect()
}
