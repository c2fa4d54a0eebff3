//! Per-song threshold calibration from a control track.

use crate::error::{LightsError, Result};

use super::TrackReader;

/// Fraction of the quietest readings ignored before picking a threshold
const DISCARD_FRACTION: usize = 10;

/// Derive one threshold per channel from a track's history.
///
/// For each channel the lowest tenth of its readings is discarded and the
/// median of the rest becomes the threshold, so a channel is lit for roughly
/// the louder half of the song.
pub fn calibrate_thresholds(track: &TrackReader, channel_count: usize) -> Result<Vec<f32>> {
    if track.is_empty() {
        return Err(LightsError::InvalidArgument(
            "cannot calibrate thresholds from an empty track".to_string(),
        ));
    }

    let thresholds = (0..channel_count)
        .map(|channel| {
            let mut history: Vec<f32> = track
                .frames()
                .iter()
                .map(|f| f.values.get(channel).copied().unwrap_or(0.0))
                .filter(|v| !v.is_nan())
                .collect();
            if history.is_empty() {
                return 0.0;
            }
            history.sort_by(|a, b| a.total_cmp(b));

            let kept = &history[history.len() / DISCARD_FRACTION..];
            kept[kept.len() / 2]
        })
        .collect();

    Ok(thresholds)
}
