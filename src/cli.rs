//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::error::Result;
use crate::params::{ControlMode, LightsConfig};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "lightshow")]
#[command(about = "Drive light channels in sync with music playback", long_about = None)]
pub struct Args {
    /// TOML configuration file (missing keys take their defaults)
    #[arg(long, short, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Where channel data comes from: static (control tracks) or spectral (live FFT)
    #[arg(long, global = true, value_enum)]
    pub mode: Option<ControlMode>,

    /// Serial device of the light controller (also LIGHTSHOW_SERIAL)
    #[arg(long, global = true, value_name = "PATH")]
    pub serial_port: Option<PathBuf>,

    /// Baud rate to set on the serial device
    #[arg(long, global = true, value_name = "BAUD")]
    pub serial_baud: Option<u32>,

    /// Music directory to scan for songs
    #[arg(long, global = true, value_name = "DIR")]
    pub music_dir: Option<PathBuf>,

    /// Number of light channels
    #[arg(long, global = true, value_name = "N")]
    pub channels: Option<usize>,

    /// Minimum time between toggles of one channel (milliseconds)
    #[arg(long, global = true, value_name = "MS")]
    pub dwell_ms: Option<u64>,

    /// Control track row spacing (milliseconds)
    #[arg(long, global = true, value_name = "MS")]
    pub quantum_ms: Option<u64>,

    /// Decode at real-time pace without playing sound
    #[arg(long, global = true)]
    pub no_audio: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Play music and drive the lights (default)
    Run,

    /// Derive per-channel thresholds from a control track
    Calibrate {
        /// Control track (.csv)
        track: PathBuf,

        /// Store the thresholds in the song's metadata sidecar
        #[arg(long)]
        write: bool,
    },

    /// Analyze a song and write its control track, row spacing and thresholds
    Generate {
        /// Audio file (.wav); the track lands next to it as .csv
        audio: PathBuf,

        /// Write the control track only, leaving the metadata sidecar alone
        #[arg(long)]
        track_only: bool,
    },

    /// Replay a control track without timing and print the command stream
    Simulate {
        /// Control track (.csv)
        track: PathBuf,

        /// Song metadata to take thresholds from (defaults to the sidecar next to the track)
        #[arg(long, value_name = "FILE")]
        metadata: Option<PathBuf>,
    },
}

impl Args {
    /// Subcommand to run; `run` when none was given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    /// Configuration file (if any), then environment, then command-line flags
    pub fn load_config(&self) -> Result<LightsConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Config: {}", path.display());
                LightsConfig::load(path)?
            }
            None => LightsConfig::default(),
        };
        config.apply_env();
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Apply flags given on the command line
    pub fn apply_overrides(&self, config: &mut LightsConfig) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(port) = &self.serial_port {
            config.serial_port = Some(port.clone());
        }
        if let Some(baud) = self.serial_baud {
            config.serial_baud = Some(baud);
        }
        if let Some(dir) = &self.music_dir {
            config.music_dir = dir.clone();
        }
        if let Some(channels) = self.channels {
            config.channels.channel_count = channels;
        }
        if let Some(dwell) = self.dwell_ms {
            config.timing.min_dwell_ms = dwell;
        }
        if let Some(quantum) = self.quantum_ms {
            config.timing.quantum_ms = quantum;
        }
        if self.no_audio {
            config.audio_output = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_run() {
        let args = Args::parse_from(["lightshow"]);
        assert_eq!(args.command(), Command::Run);
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "lightshow",
            "--mode",
            "spectral",
            "--channels",
            "8",
            "--dwell-ms",
            "50",
            "--no-audio",
            "run",
        ]);
        let mut config = LightsConfig::default();
        args.apply_overrides(&mut config);

        assert_eq!(config.mode, ControlMode::Spectral);
        assert_eq!(config.channels.channel_count, 8);
        assert_eq!(config.timing.min_dwell_ms, 50);
        assert_eq!(config.timing.quantum_ms, 25);
        assert!(!config.audio_output);
    }

    #[test]
    fn test_calibrate_subcommand() {
        let args = Args::parse_from(["lightshow", "calibrate", "song.csv", "--write"]);
        assert_eq!(
            args.command(),
            Command::Calibrate {
                track: PathBuf::from("song.csv"),
                write: true,
            }
        );
    }

    #[test]
    fn test_generate_subcommand() {
        let args = Args::parse_from(["lightshow", "--channels", "16", "generate", "song.wav"]);
        assert_eq!(
            args.command(),
            Command::Generate {
                audio: PathBuf::from("song.wav"),
                track_only: false,
            }
        );
        assert_eq!(args.channels, Some(16));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = Args::parse_from(["lightshow", "--quantum-ms", "0"]);
        assert!(args.load_config().is_err());
    }
}
