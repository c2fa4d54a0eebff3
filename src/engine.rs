//! The control loop.
//!
//! Everything that touches channel state runs here, on one thread, driven by a
//! single event queue: playback timeline events and PCM from the decoder,
//! requests from the remote, link changes and shutdown. Static control tracks
//! are paced by waiting on that queue with a deadline, so dropping the session
//! also drops its pending wake.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::audio::{
    AudioFormat, PcmChunk, PlaybackEvent, PlaybackHandle, PlaybackSource, SpectralAnalyzer,
};
use crate::channels::resolve_thresholds;
use crate::control::{control_path_for, ControlProvider, TrackReader};
use crate::error::{LightsError, Result};
use crate::params::{ControlMode, LightsConfig};
use crate::playlist::{Playlist, Song};
use crate::remote::{Notification, RemoteCommand};
use crate::session::SongSession;
use crate::transport::LightLink;

/// Everything the control loop reacts to
#[derive(Debug)]
pub enum EngineEvent {
    /// Timeline event from the decoder of song `generation`
    Playback {
        generation: u64,
        event: PlaybackEvent,
    },
    /// Decoded audio from the decoder of song `generation`
    Pcm { generation: u64, chunk: PcmChunk },
    Remote(RemoteCommand),
    /// The remote connected or went away
    Link { connected: bool },
    Shutdown,
}

struct NowPlaying {
    song: Song,
    generation: u64,
    handle: PlaybackHandle,
}

struct QueuedSong {
    song: Song,
    reply: Sender<Value>,
}

/// Owns the playlist, the playing song and its lighting session
pub struct Engine {
    config: LightsConfig,
    playlist: Playlist,
    events_tx: Sender<EngineEvent>,
    events_rx: Receiver<EngineEvent>,
    source: Box<dyn PlaybackSource>,
    link: LightLink,
    notifier: Option<Sender<Notification>>,
    rng: StdRng,

    now_playing: Option<NowPlaying>,
    session: Option<SongSession>,
    queued: Option<QueuedSong>,
    /// Bumped for every song started; events from older decoders are ignored
    generation: u64,

    /// A remote is driving song selection
    connected: bool,
    /// Stopped by the remote; nothing plays until a song is queued
    halted: bool,
    stop_after_current: bool,

    started_at: Instant,
    /// Startup grace period has passed (or was cut short)
    kicked_off: bool,
}

impl Engine {
    pub fn new(
        config: LightsConfig,
        playlist: Playlist,
        source: Box<dyn PlaybackSource>,
        link: LightLink,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            config,
            playlist,
            events_tx,
            events_rx,
            source,
            link,
            notifier: None,
            rng: StdRng::from_entropy(),
            now_playing: None,
            session: None,
            queued: None,
            generation: 0,
            connected: false,
            halted: false,
            stop_after_current: false,
            started_at: Instant::now(),
            kicked_off: false,
        }
    }

    /// Fixed random seed (reproducible song picks)
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Where "song finished" notifications go
    pub fn set_notifier(&mut self, notifier: Sender<Notification>) {
        self.notifier = Some(notifier);
    }

    /// Handle for pushing events into the loop
    pub fn sender(&self) -> Sender<EngineEvent> {
        self.events_tx.clone()
    }

    pub fn now_playing(&self) -> Option<&Song> {
        self.now_playing.as_ref().map(|p| &p.song)
    }

    pub fn session(&self) -> Option<&SongSession> {
        self.session.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Run until shutdown. An empty playlist is the only fatal condition.
    pub fn run(&mut self) -> Result<()> {
        if self.playlist.is_empty() {
            return Err(LightsError::Playlist(
                "no songs with metadata found; nothing to play".to_string(),
            ));
        }
        info!(
            songs = self.playlist.len(),
            mode = ?self.config.mode,
            channels = self.config.channels.channel_count,
            "Engine running"
        );

        loop {
            let event = match self.next_timeout(Instant::now()) {
                Some(timeout) => match self.events_rx.recv_timeout(timeout) {
                    Ok(event) => Some(event),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.events_rx.recv() {
                    Ok(event) => Some(event),
                    Err(_) => break,
                },
            };

            if let Some(event) = event {
                if !self.handle_event(event) {
                    break;
                }
            }
            self.on_wake(Instant::now());
        }

        self.shutdown();
        Ok(())
    }

    /// How long the loop may block before something is due
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        let session_wake = self.session.as_ref().and_then(|s| s.next_wake(now));
        let grace = if self.kicked_off {
            None
        } else {
            let deadline = self.started_at + self.config.timing.startup_grace();
            Some(deadline.saturating_duration_since(now))
        };

        match (session_wake, grace) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run whatever is due at `now`: the startup kick and any static frames
    pub fn on_wake(&mut self, now: Instant) {
        if !self.kicked_off
            && now.saturating_duration_since(self.started_at) >= self.config.timing.startup_grace()
        {
            self.kicked_off = true;
            self.advance();
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let command = session.tick(session.elapsed(now));
        self.link.send(&command);

        if session.is_exhausted() {
            if let Some(off) = session.finish() {
                info!("Control track exhausted; lights off until the song ends");
                self.link.send(&off);
            }
        }
    }

    /// Apply one event. Returns `false` when the loop should exit.
    pub fn handle_event(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::Playback { generation, event } => {
                if !self.is_current(generation) {
                    debug!(generation, ?event, "ignoring event from a previous song");
                    return true;
                }
                match event {
                    PlaybackEvent::Started { format } => self.start_session(&format),
                    PlaybackEvent::Stopped | PlaybackEvent::Ended => self.song_finished(),
                }
            }
            EngineEvent::Pcm { generation, chunk } => {
                if !self.is_current(generation) {
                    return true;
                }
                if let Some(session) = self.session.as_mut() {
                    for command in session.on_pcm(&chunk) {
                        self.link.send(&command);
                    }
                }
            }
            EngineEvent::Remote(command) => self.handle_remote(command),
            EngineEvent::Link { connected } => {
                if connected {
                    info!("Remote connected");
                    if !self.link.is_available() {
                        self.link.reconnect();
                    }
                } else {
                    warn!("Remote disconnected; picking songs at random");
                }
                self.connected = connected;
                self.kicked_off = true;
                self.advance();
            }
            EngineEvent::Shutdown => {
                info!("Shutting down");
                return false;
            }
        }
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        self.now_playing
            .as_ref()
            .map_or(false, |p| p.generation == generation)
    }

    fn handle_remote(&mut self, command: RemoteCommand) {
        match command {
            RemoteCommand::GetStatus { reply } => {
                let playing = self
                    .now_playing
                    .as_ref()
                    .map(|p| p.song.basename())
                    .unwrap_or_else(|| "none".to_string());
                let _ = reply.send(json!({ "playing": playing }));
            }
            RemoteCommand::ListSongs { reply } => {
                let _ = reply.send(self.playlist.to_json());
            }
            RemoteCommand::PlayNext { song, reply } => {
                let Some(found) = self.playlist.find(&song).cloned() else {
                    warn!("Requested song {:?} is not in the playlist", song);
                    let _ = reply.send(json!({ "confirm": false, "error": "unknown song" }));
                    return;
                };
                info!(song = %found.basename(), "Queued next song");
                if let Some(previous) = self.queued.take() {
                    let _ = previous.reply.send(json!({ "confirm": false, "error": "replaced" }));
                }
                self.queued = Some(QueuedSong { song: found, reply });
                self.halted = false;
                self.stop_after_current = false;
                self.advance();
            }
            RemoteCommand::Stop { immediately: true } => {
                info!("Stopping playback now");
                self.halted = true;
                self.stop_after_current = false;
                self.stop_playback();
            }
            RemoteCommand::Stop { immediately: false } => {
                if self.now_playing.is_some() {
                    info!("Stopping after the current song");
                    self.stop_after_current = true;
                } else {
                    self.halted = true;
                }
            }
        }
    }

    /// Lights off first, then the next song (if any) is picked
    fn song_finished(&mut self) {
        self.finish_session();
        if let Some(playing) = self.now_playing.take() {
            info!(song = %playing.song.basename(), "Song finished");
            self.notify(Notification::SongFinished {
                song: playing.song.basename(),
            });
        }
        if self.stop_after_current {
            self.stop_after_current = false;
            self.halted = true;
            info!("Playback halted");
        }
        self.advance();
    }

    /// Cut the current song and clear the lights before returning
    fn stop_playback(&mut self) {
        if let Some(mut playing) = self.now_playing.take() {
            playing.handle.stop();
            self.notify(Notification::SongFinished {
                song: playing.song.basename(),
            });
        }
        self.finish_session();
    }

    fn finish_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Some(off) = session.finish() {
                self.link.send(&off);
            }
        }
    }

    /// Start the next song if playback is idle
    fn advance(&mut self) {
        if self.now_playing.is_some() || self.halted {
            return;
        }
        if let Some(queued) = self.queued.take() {
            self.play_song(queued.song, Some(queued.reply));
            return;
        }
        if self.connected {
            debug!("Idle; waiting for the remote to queue a song");
            return;
        }
        match self.playlist.random(&mut self.rng).cloned() {
            Some(song) => {
                info!(song = %song.basename(), "Playing random song");
                self.play_song(song, None);
            }
            None => error!("Playlist is empty; nothing to play"),
        }
    }

    /// Start a song; if it can't be decoded, fall back to random songs that
    /// haven't failed yet
    fn play_song(&mut self, song: Song, mut reply: Option<Sender<Value>>) {
        let mut song = song;
        let mut failed: Vec<PathBuf> = Vec::new();

        loop {
            self.generation += 1;
            match self
                .source
                .start(&song.filename, self.generation, self.events_tx.clone())
            {
                Ok(handle) => {
                    info!(song = %song.basename(), generation = self.generation, "Now playing");
                    if let Some(reply) = reply.take() {
                        let _ = reply.send(json!({ "confirm": true }));
                    }
                    self.now_playing = Some(NowPlaying {
                        song,
                        generation: self.generation,
                        handle,
                    });
                    return;
                }
                Err(e) => {
                    error!("Cannot play {}: {}", song.filename.display(), e);
                    if let Some(reply) = reply.take() {
                        let _ = reply.send(json!({ "confirm": false, "error": e.to_string() }));
                    }
                    failed.push(song.filename.clone());

                    let candidates: Vec<&Song> = self
                        .playlist
                        .songs()
                        .iter()
                        .filter(|s| !failed.contains(&s.filename))
                        .collect();
                    match candidates.choose(&mut self.rng) {
                        Some(next) => song = (*next).clone(),
                        None => {
                            error!("No playable songs left");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// New lighting session for the song that just started
    fn start_session(&mut self, format: &AudioFormat) {
        self.finish_session();
        if !self.link.is_available() && self.link.reconnect() {
            info!("Light controller back");
        }
        let Some(playing) = self.now_playing.as_ref() else {
            return;
        };
        let song = &playing.song;
        let channel_count = self.config.channels.channel_count;
        let quantum = song.quantum(self.config.timing.quantum());

        let (provider, thresholds) = match self.config.mode {
            ControlMode::Static => {
                let path = control_path_for(&song.filename);
                let provider = match TrackReader::open(&path, channel_count, quantum) {
                    Ok(track) => Some(ControlProvider::Static(track)),
                    Err(e) => {
                        warn!("{}; lights off for this song", e);
                        None
                    }
                };
                let thresholds = resolve_thresholds(song.thresholds(), &self.config.channels);
                (provider, thresholds)
            }
            ControlMode::Spectral => {
                let provider =
                    match SpectralAnalyzer::new(format, channel_count, &self.config.spectral) {
                        Ok(analyzer) => Some(ControlProvider::Spectral(analyzer)),
                        Err(e) => {
                            warn!("{}; lights off for this song", e);
                            None
                        }
                    };
                (provider, vec![self.config.spectral.threshold; channel_count])
            }
        };

        self.session = Some(SongSession::new(
            song.basename(),
            song.duration(),
            provider,
            &thresholds,
            &self.config.timing,
            quantum,
        ));
        self.on_wake(Instant::now());
    }

    fn notify(&self, notification: Notification) {
        if let Some(notifier) = &self.notifier {
            let _ = notifier.send(notification);
        }
    }

    /// Stop playback and leave the lights dark
    fn shutdown(&mut self) {
        if let Some(playing) = self.now_playing.take() {
            playing.handle.join();
        }
        self.finish_session();
        if let Some(queued) = self.queued.take() {
            let _ = queued.reply.send(json!({ "confirm": false, "error": "shutting down" }));
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
