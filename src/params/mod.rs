//! Parameter definitions with physical units and documented semantics.
//!
//! Every tunable lives here with:
//! - Physical units (milliseconds, Hz)
//! - Documented defaults
//! - A `validate()` that rejects values the engine can't run with
//!
//! The whole tree deserializes from TOML; missing keys take their defaults.

mod audio;
mod channels;
mod timing;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LightsError, Result};

// Re-export all types
pub use audio::SpectralParams;
pub use channels::ChannelParams;
pub use timing::TimingParams;

/// Environment variable that overrides the serial device path
pub const SERIAL_PORT_ENV: &str = "LIGHTSHOW_SERIAL";

/// Where channel activation data comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Precomputed `.csv` track next to each song
    #[default]
    Static,
    /// Live FFT of the decoded audio
    Spectral,
}

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightsConfig {
    pub mode: ControlMode,

    /// Root folder scanned for songs with metadata sidecars
    pub music_dir: PathBuf,

    /// Serial device the light controller is attached to; `None` runs without lights
    pub serial_port: Option<PathBuf>,

    /// Baud rate set on the serial line when it is opened; `None` leaves the
    /// line as configured (`stty -F <port> <baud> raw -echo`)
    pub serial_baud: Option<u32>,

    /// Play decoded audio through the output device (needs the `audio-output` feature)
    pub audio_output: bool,

    pub channels: ChannelParams,
    pub timing: TimingParams,
    pub spectral: SpectralParams,
}

impl Default for LightsConfig {
    fn default() -> Self {
        Self {
            mode: ControlMode::Static,
            music_dir: PathBuf::from("./music"),
            serial_port: None,
            serial_baud: None,
            audio_output: true,
            channels: ChannelParams::default(),
            timing: TimingParams::default(),
            spectral: SpectralParams::default(),
        }
    }
}

impl LightsConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides (currently only the serial device)
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var_os(SERIAL_PORT_ENV) {
            if !port.is_empty() {
                self.serial_port = Some(PathBuf::from(port));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.serial_baud == Some(0) {
            return Err(LightsError::Config("serial_baud must be > 0".to_string()));
        }
        self.channels.validate()?;
        self.timing.validate()?;
        self.spectral.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_controller() {
        let config = LightsConfig::default();

        assert_eq!(config.channels.channel_count, 32);
        assert_eq!(config.timing.quantum_ms, 25);
        assert_eq!(config.timing.min_dwell_ms, 200);
        assert_eq!(config.spectral.min_frequency_hz, 20.0);
        assert_eq!(config.mode, ControlMode::Static);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LightsConfig::from_toml(
            r#"
            mode = "spectral"
            serial_port = "/dev/ttyACM0"
            serial_baud = 115200

            [channels]
            channel_count = 8

            [timing]
            min_dwell_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, ControlMode::Spectral);
        assert_eq!(config.serial_port, Some(PathBuf::from("/dev/ttyACM0")));
        assert_eq!(config.serial_baud, Some(115_200));
        assert_eq!(config.channels.channel_count, 8);
        assert_eq!(config.channels.default_threshold, 0.8);
        assert_eq!(config.timing.min_dwell_ms, 50);
        assert_eq!(config.timing.quantum_ms, 25);
    }

    #[test]
    fn test_invalid_toml_values_rejected() {
        let result = LightsConfig::from_toml(
            r#"
            [timing]
            quantum_ms = 0
            "#,
        );
        assert!(result.is_err());
    }
}
