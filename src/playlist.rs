//! Song discovery and metadata.
//!
//! The music directory is scanned recursively for `.wav` files that have a
//! JSON metadata sidecar of the same name (`song.wav` + `song.json`). Songs
//! without a sidecar are not eligible to play.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LightsError, Result};

/// Audio extensions the decoder can play
const SUPPORTED_EXTENSIONS: &[&str] = &["wav"];

/// Playlist entry as stored in the metadata sidecar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    /// Length in seconds (if known)
    #[serde(default)]
    pub duration: Option<f64>,
    /// Per-channel thresholds; missing entries use the configured defaults
    #[serde(default)]
    pub thresholds: Vec<f32>,
    /// Control track row spacing in milliseconds (fractional), overriding the
    /// configured quantum
    #[serde(
        default,
        rename = "msPerLine",
        skip_serializing_if = "Option::is_none"
    )]
    pub ms_per_line: Option<f64>,
    /// Path to the audio file (filled in by the scan)
    #[serde(default)]
    pub filename: PathBuf,
}

impl Song {
    /// Load the sidecar for an audio file
    pub fn load(audio: &Path) -> Result<Self> {
        let text = fs::read_to_string(sidecar_path(audio))?;
        let mut song: Song = serde_json::from_str(&text)?;
        song.filename = audio.to_path_buf();
        Ok(song)
    }

    /// File name without directories, as reported in status replies
    pub fn basename(&self) -> String {
        self.filename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Song thresholds, or `None` when the sidecar has none
    pub fn thresholds(&self) -> Option<&[f32]> {
        if self.thresholds.is_empty() {
            None
        } else {
            Some(&self.thresholds)
        }
    }

    /// Row spacing for this song's control track
    pub fn quantum(&self, default: Duration) -> Duration {
        self.ms_per_line
            .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok())
            .filter(|q| !q.is_zero())
            .unwrap_or(default)
    }
}

/// Metadata sidecar path for an audio file (extension swapped to `.json`)
pub fn sidecar_path(audio: &Path) -> PathBuf {
    audio.with_extension("json")
}

/// Store calibrated thresholds in a sidecar, keeping every other key as-is
pub fn write_thresholds(sidecar: &Path, thresholds: &[f32]) -> Result<()> {
    let mut updates = serde_json::Map::new();
    updates.insert("thresholds".to_string(), serde_json::json!(thresholds));
    update_sidecar(sidecar, updates)
}

/// Merge `updates` into a sidecar (created if missing); other keys are kept
pub fn update_sidecar(
    sidecar: &Path,
    updates: serde_json::Map<String, serde_json::Value>,
) -> Result<()> {
    let mut metadata: serde_json::Value = match fs::read_to_string(sidecar) {
        Ok(text) => serde_json::from_str(&text)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => serde_json::json!({}),
        Err(e) => return Err(e.into()),
    };
    let Some(object) = metadata.as_object_mut() else {
        return Err(LightsError::Playlist(format!(
            "{} is not a JSON object",
            sidecar.display()
        )));
    };
    let keys: Vec<String> = updates.keys().cloned().collect();
    object.extend(updates);

    fs::write(sidecar, serde_json::to_string_pretty(&metadata)?)?;
    info!(path = %sidecar.display(), ?keys, "Updated song metadata");
    Ok(())
}

/// All songs eligible to play
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    songs: Vec<Song>,
}

impl Playlist {
    pub fn from_songs(songs: Vec<Song>) -> Self {
        Self { songs }
    }

    /// Scan a directory recursively for songs with metadata
    pub fn scan_directory(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(LightsError::Playlist(format!(
                "music directory {} does not exist",
                path.display()
            )));
        }

        let mut songs = Vec::new();
        scan_directory_recursive(path, &mut songs)?;
        songs.sort_by(|a, b| a.filename.cmp(&b.filename));

        info!(dir = %path.display(), songs = songs.len(), "Playlist loaded");
        Ok(Self { songs })
    }

    pub fn songs(&self) -> &[Song] {
        &self.songs
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Look a song up by full path or by file name
    pub fn find(&self, name: &str) -> Option<&Song> {
        let wanted = Path::new(name);
        self.songs
            .iter()
            .find(|s| s.filename == wanted)
            .or_else(|| self.songs.iter().find(|s| s.basename() == name))
    }

    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Song> {
        self.songs.choose(rng)
    }

    /// Song list as sent to remote clients
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.songs).unwrap_or_else(|_| serde_json::json!([]))
    }
}

fn scan_directory_recursive(path: &Path, songs: &mut Vec<Song>) -> Result<()> {
    for entry in fs::read_dir(path)? {
        let path = entry?.path();

        if path.is_dir() {
            scan_directory_recursive(&path, songs)?;
            continue;
        }

        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if !supported {
            continue;
        }

        if !sidecar_path(&path).is_file() {
            debug!(path = %path.display(), "no metadata sidecar; skipping");
            continue;
        }
        match Song::load(&path) {
            Ok(song) => songs.push(song),
            Err(e) => warn!(path = %path.display(), "Unreadable song metadata: {}", e),
        }
    }
    Ok(())
}
