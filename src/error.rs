//! Error handling for the lighting engine.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result alias used throughout the library.
pub type Result<T> = std::result::Result<T, LightsError>;

/// Errors raised by the control engine and its collaborators.
///
/// Only `Config` and an empty playlist are fatal to the process; everything on
/// the lighting side is logged and degraded around.
#[derive(Debug, Error)]
pub enum LightsError {
    /// The song's control track is missing or unreadable.
    #[error("no control data at {path}: {reason}")]
    MissingControlData {
        /// Path the control track was expected at.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// A caller passed a value the operation cannot work with.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The audio file could not be opened or decoded.
    #[error("failed to decode {path}: {reason}")]
    Decode {
        /// Audio file that failed.
        path: PathBuf,
        /// Decoder message.
        reason: String,
    },

    /// No usable audio output device.
    #[error("audio output: {0}")]
    AudioOutput(String),

    /// The light hardware link failed.
    #[error("light transport: {0}")]
    Transport(String),

    /// Playlist is empty or a song could not be resolved.
    #[error("playlist: {0}")]
    Playlist(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}
