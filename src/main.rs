//! Lightshow - drives light channels in sync with music
//!
//! Plays songs from the music directory and turns each song's control track
//! (or a live FFT of the audio) into on/off commands for the light controller.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lightshow::audio::WavSource;
use lightshow::channels::resolve_thresholds;
use lightshow::cli::{Args, Command};
use lightshow::control::{calibrate_thresholds, generate_track, TrackReader};
use lightshow::engine::Engine;
use lightshow::params::{ControlMode, LightsConfig};
use lightshow::playlist::{sidecar_path, update_sidecar, write_thresholds, Playlist, Song};
use lightshow::remote::spawn_stdin_remote;
use lightshow::session::replay_track;
use lightshow::transport::LightLink;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.load_config().context("Failed to load configuration")?;

    match args.command() {
        Command::Run => run(config),
        Command::Calibrate { track, write } => calibrate(&config, &track, write),
        Command::Generate { audio, track_only } => generate(&config, &audio, track_only),
        Command::Simulate { track, metadata } => simulate(&config, &track, metadata.as_deref()),
    }
}

fn run(config: LightsConfig) -> Result<()> {
    let playlist = Playlist::scan_directory(&config.music_dir)
        .with_context(|| format!("Failed to scan {}", config.music_dir.display()))?;
    if playlist.is_empty() {
        bail!(
            "No playable songs in {} (each .wav needs a .json metadata file)",
            config.music_dir.display()
        );
    }

    let link = match &config.serial_port {
        Some(port) => LightLink::open(port, config.serial_baud),
        None => {
            warn!("No serial port configured; running without lights");
            LightLink::disabled()
        }
    };
    let source = WavSource::new(config.audio_output, config.mode == ControlMode::Spectral);

    let mut engine = Engine::new(config, playlist, Box::new(source), link);
    let notifier = spawn_stdin_remote(engine.sender()).context("Failed to start remote")?;
    engine.set_notifier(notifier);

    engine.run()?;
    info!("Goodbye");
    Ok(())
}

fn calibrate(config: &LightsConfig, track_path: &Path, write: bool) -> Result<()> {
    let song = Song::load(track_path).ok();
    let quantum = song
        .as_ref()
        .map_or(config.timing.quantum(), |s| s.quantum(config.timing.quantum()));

    let track = TrackReader::open(track_path, config.channels.channel_count, quantum)?;
    let thresholds = calibrate_thresholds(&track, config.channels.channel_count)?;
    println!("{}", serde_json::to_string(&thresholds)?);

    if write {
        let sidecar = sidecar_path(track_path);
        write_thresholds(&sidecar, &thresholds)
            .with_context(|| format!("Failed to update {}", sidecar.display()))?;
    }
    Ok(())
}

fn generate(config: &LightsConfig, audio: &Path, track_only: bool) -> Result<()> {
    let generated = generate_track(audio, config.channels.channel_count, &config.spectral)
        .with_context(|| format!("Failed to analyze {}", audio.display()))?;
    println!(
        "{}: {} rows, {:.3} ms per row",
        generated.path.display(),
        generated.rows,
        generated.ms_per_line
    );

    if !track_only {
        let sidecar = sidecar_path(audio);
        update_sidecar(&sidecar, generated.metadata())
            .with_context(|| format!("Failed to update {}", sidecar.display()))?;
    }
    Ok(())
}

fn simulate(config: &LightsConfig, track_path: &Path, metadata: Option<&Path>) -> Result<()> {
    let song = match metadata {
        Some(path) => Some(
            Song::load(path).with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => Song::load(track_path).ok(),
    };
    let quantum = song
        .as_ref()
        .map_or(config.timing.quantum(), |s| s.quantum(config.timing.quantum()));
    let thresholds = resolve_thresholds(
        song.as_ref().and_then(|s| s.thresholds()),
        &config.channels,
    );

    let track = TrackReader::open(track_path, config.channels.channel_count, quantum)?;
    let rows = track.len();
    let commands = replay_track(track, &thresholds, &config.timing);

    for (index, command) in commands.iter().enumerate() {
        if command.is_empty() {
            continue;
        }
        // The closing all-off lands one quantum past the last row
        let offset = quantum * index as u32;
        println!("{:>8} {}", offset.as_millis(), command);
    }
    info!(rows, commands = commands.iter().filter(|c| !c.is_empty()).count(), "Replay done");
    Ok(())
}
