//! The active song session.
//!
//! A session owns the channel bank and the control provider for exactly one
//! song. Channels start off when it is created and are forced off exactly once
//! when it finishes, whether the track ran out, the song ended or playback was
//! stopped.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::audio::PcmChunk;
use crate::channels::ChannelBank;
use crate::command::Command;
use crate::control::{ControlProvider, TrackReader};
use crate::params::TimingParams;
use crate::scheduler::Scheduler;

/// Lighting state for the song currently playing
#[derive(Debug)]
pub struct SongSession {
    song_id: String,
    duration: Option<Duration>,
    started_at: Instant,
    /// `None` runs the song with lights off (passive mode)
    provider: Option<ControlProvider>,
    bank: ChannelBank,
    scheduler: Scheduler,
    finished: bool,
}

impl SongSession {
    pub fn new(
        song_id: impl Into<String>,
        duration: Option<Duration>,
        provider: Option<ControlProvider>,
        thresholds: &[f32],
        timing: &TimingParams,
        quantum: Duration,
    ) -> Self {
        let song_id = song_id.into();
        let mode = match &provider {
            None => "passive",
            Some(p) if p.is_spectral() => "spectral",
            Some(_) => "static",
        };
        info!(
            song = %song_id,
            mode,
            channels = thresholds.len(),
            duration_s = duration.map(|d| d.as_secs_f32()),
            "Session started"
        );

        Self {
            song_id,
            duration,
            started_at: Instant::now(),
            provider,
            bank: ChannelBank::new(thresholds, timing.min_dwell()),
            scheduler: Scheduler::new(quantum),
            finished: false,
        }
    }

    pub fn song_id(&self) -> &str {
        &self.song_id
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn bank(&self) -> &ChannelBank {
        &self.bank
    }

    pub fn is_passive(&self) -> bool {
        self.provider.is_none()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Static frames consumed so far
    pub fn frames_processed(&self) -> u64 {
        self.scheduler.next_index()
    }

    /// Song time at `now`, measured from session creation
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// How long the engine may wait before the next static tick.
    /// `None` when nothing is scheduled (passive, spectral or finished sessions).
    pub fn next_wake(&self, now: Instant) -> Option<Duration> {
        match &self.provider {
            Some(ControlProvider::Static(track)) if !self.finished && !track.is_exhausted() => {
                Some(self.scheduler.next_wake(self.elapsed(now)))
            }
            _ => None,
        }
    }

    /// Process every static frame due at `elapsed` and return this tick's deltas.
    /// Empty when nothing changed (the caller suppresses the write).
    pub fn tick(&mut self, elapsed: Duration) -> Command {
        if self.finished {
            return Command::new();
        }
        let provider = match self.provider.as_mut() {
            Some(provider) if !provider.is_spectral() => provider,
            _ => return Command::new(),
        };

        let due = self.scheduler.frames_due(elapsed);
        if due > 1 {
            debug!(frames = due, "catching up after late wakeup");
        }
        for _ in 0..due {
            match provider.next_frame(elapsed) {
                Some(frame) => {
                    self.bank.process(&frame);
                }
                None => break,
            }
            self.scheduler.advance();
        }
        self.bank.take_command()
    }

    /// Feed decoded audio to a spectral session; one command per completed window
    /// (empty commands are dropped)
    pub fn on_pcm(&mut self, chunk: &PcmChunk) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.finished {
            return commands;
        }
        let provider = match self.provider.as_mut() {
            Some(provider) if provider.is_spectral() => provider,
            _ => return commands,
        };

        provider.push_pcm(chunk);
        while let Some(frame) = provider.next_frame(Duration::MAX) {
            self.bank.process(&frame);
            let command = self.bank.take_command();
            if !command.is_empty() {
                commands.push(command);
            }
        }
        commands
    }

    /// Static track fully consumed
    pub fn is_exhausted(&self) -> bool {
        self.provider.as_ref().map_or(false, |p| p.is_exhausted())
    }

    /// Force every channel off. Returns the all-off command the first time only.
    pub fn finish(&mut self) -> Option<Command> {
        if self.finished {
            return None;
        }
        self.finished = true;

        if let Some(ControlProvider::Static(track)) = &self.provider {
            debug!(rows = track.position(), of = track.len(), "control rows consumed");
        }
        info!(song = %self.song_id, "Session finished; lights off");
        Some(self.bank.force_all_off())
    }
}

/// Run a whole static track without wall-clock pacing.
///
/// Yields one command per quantum (empty when nothing changed) followed by the
/// closing all-off command. Identical inputs always give identical output.
pub fn replay_track(
    track: TrackReader,
    thresholds: &[f32],
    timing: &TimingParams,
) -> Vec<Command> {
    let quantum = track.quantum();
    let mut session = SongSession::new(
        "replay",
        Some(track.duration()),
        Some(ControlProvider::Static(track)),
        thresholds,
        timing,
        quantum,
    );

    let mut commands = Vec::new();
    while !session.is_exhausted() {
        let due_at = session.scheduler.deadline(session.scheduler.next_index());
        commands.push(session.tick(due_at));
    }
    commands.extend(session.finish());
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFormat, SpectralAnalyzer};
    use crate::params::SpectralParams;

    const Q: Duration = Duration::from_millis(25);

    fn timing(min_dwell_ms: u64) -> TimingParams {
        TimingParams {
            min_dwell_ms,
            ..TimingParams::default()
        }
    }

    fn static_session(csv: &str, thresholds: &[f32], dwell_ms: u64) -> SongSession {
        let track = TrackReader::from_reader(csv.as_bytes(), thresholds.len(), Q).unwrap();
        SongSession::new(
            "test.wav",
            None,
            Some(ControlProvider::Static(track)),
            thresholds,
            &timing(dwell_ms),
            Q,
        )
    }

    const SCENARIO: &str = "a,b,c\n0.6,0.4,0.9\n0.6,0.1,0.9\n0.2,0.9,0.9\n";

    #[test]
    fn test_scenario_ticks() {
        let mut session = static_session(SCENARIO, &[0.5; 3], 0);

        assert_eq!(session.tick(Duration::ZERO).to_string(), "p0s1p2s1");
        assert_eq!(session.tick(Q).to_string(), "");
        assert_eq!(session.tick(Q * 2).to_string(), "p0s0p1s1");
        assert!(session.is_exhausted());
    }

    #[test]
    fn test_catch_up_collapses_into_one_command() {
        let mut session = static_session(SCENARIO, &[0.5; 3], 0);

        // One late wakeup covers all three rows
        let command = session.tick(Q * 2 + Duration::from_millis(3));
        assert_eq!(command.to_string(), "p1s1p2s1");
        assert!(session.is_exhausted());
    }

    #[test]
    fn test_tick_before_first_deadline_processes_nothing_extra() {
        let mut session = static_session(SCENARIO, &[0.5; 3], 0);
        session.tick(Duration::ZERO);
        assert!(session.tick(Duration::from_millis(10)).is_empty());
        assert_eq!(
            session.next_wake(session.started_at + Duration::from_millis(10)),
            Some(Duration::from_millis(15))
        );
    }

    #[test]
    fn test_stop_emits_all_off_once() {
        let mut session = static_session(SCENARIO, &[0.5; 3], 0);
        session.tick(Duration::ZERO);

        let off = session.finish().unwrap();
        assert_eq!(off.to_string(), "p0s0p1s0p2s0");
        assert!(session.is_finished());
        assert!(session.finish().is_none());

        // Nothing scheduled or emitted after the stop
        assert_eq!(session.next_wake(Instant::now()), None);
        assert!(session.tick(Q * 2).is_empty());
    }

    #[test]
    fn test_passive_session_stays_dark() {
        let mut session = SongSession::new("quiet.wav", None, None, &[0.5; 4], &timing(200), Q);

        assert!(session.is_passive());
        assert_eq!(session.next_wake(Instant::now()), None);
        assert!(session.tick(Duration::from_secs(3)).is_empty());
        assert!(session
            .on_pcm(&PcmChunk::new(vec![1.0; 4096], 1))
            .is_empty());
        assert_eq!(session.finish().map(|c| c.len()), Some(4));
    }

    #[test]
    fn test_spectral_session_fires_per_window() {
        let format = AudioFormat {
            sample_rate: 8000,
            channels: 1,
            bit_depth: 16,
        };
        let analyzer = SpectralAnalyzer::new(&format, 4, &SpectralParams::default()).unwrap();
        let mut session = SongSession::new(
            "live.wav",
            None,
            Some(ControlProvider::Spectral(analyzer)),
            &[0.28; 4],
            &timing(0),
            Q,
        );

        // Not scheduled by the clock
        assert_eq!(session.next_wake(Instant::now()), None);
        assert!(session.on_pcm(&PcmChunk::new(vec![0.0; 399], 1)).is_empty());

        // Window completes with silence: a frame is processed but nothing changes
        assert!(session.on_pcm(&PcmChunk::new(vec![0.0; 1], 1)).is_empty());

        // 100 Hz over 400 samples at 8 kHz is bin 5, bucket 2 ([4, 8))
        let tone: Vec<f32> = (0..400)
            .map(|i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / 8000.0).sin())
            .collect();
        let commands = session.on_pcm(&PcmChunk::new(tone, 1));
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].to_string(), "p2s1");
    }

    #[test]
    fn test_replay_is_deterministic() {
        let track = || TrackReader::from_reader(SCENARIO.as_bytes(), 3, Q).unwrap();
        let first = replay_track(track(), &[0.5; 3], &timing(0));
        let second = replay_track(track(), &[0.5; 3], &timing(0));

        assert_eq!(first, second);
        let lines: Vec<String> = first.iter().map(|c| c.to_string()).collect();
        assert_eq!(lines, vec!["p0s1p2s1", "", "p0s0p1s1", "p0s0p1s0p2s0"]);
    }
}
