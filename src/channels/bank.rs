//! Per-channel debounce state owned by a song session.

use std::time::Duration;

use tracing::trace;

use super::threshold::{is_active, ActivationVector};
use crate::command::Command;
use crate::control::ControlFrame;

/// One light output with its debounce state
#[derive(Debug, Clone)]
pub struct Channel {
    pub index: usize,
    pub threshold: f32,
    /// Current state (`true` = on)
    pub state: bool,
    /// Song time of the last permitted toggle; `None` until the first one
    pub last_toggle: Option<Duration>,
    pub min_dwell: Duration,
    /// State last written to the wire
    emitted: bool,
}

impl Channel {
    fn new(index: usize, threshold: f32, min_dwell: Duration) -> Self {
        Self {
            index,
            threshold,
            state: false,
            last_toggle: None,
            min_dwell,
            emitted: false,
        }
    }

    /// Whether the dwell interval has elapsed at `now`
    pub fn dwell_elapsed(&self, now: Duration) -> bool {
        match self.last_toggle {
            None => true,
            Some(at) => now.saturating_sub(at) >= self.min_dwell,
        }
    }

    /// Propose a new state; returns whether the transition was permitted
    pub fn propose(&mut self, on: bool, now: Duration) -> bool {
        if on == self.state || !self.dwell_elapsed(now) {
            return false;
        }
        self.state = on;
        self.last_toggle = Some(now);
        true
    }
}

/// All channels of the active session.
///
/// Created fresh (everything off) for each song and dropped with it.
#[derive(Debug, Clone)]
pub struct ChannelBank {
    channels: Vec<Channel>,
}

impl ChannelBank {
    /// One channel per threshold entry
    pub fn new(thresholds: &[f32], min_dwell: Duration) -> Self {
        Self {
            channels: thresholds
                .iter()
                .enumerate()
                .map(|(index, &threshold)| Channel::new(index, threshold, min_dwell))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn states(&self) -> Vec<bool> {
        self.channels.iter().map(|c| c.state).collect()
    }

    pub fn thresholds(&self) -> Vec<f32> {
        self.channels.iter().map(|c| c.threshold).collect()
    }

    /// Threshold a frame against this bank's channels
    pub fn evaluate(&self, frame: &ControlFrame) -> ActivationVector {
        self.channels
            .iter()
            .map(|c| is_active(frame.values.get(c.index).copied().unwrap_or(0.0), c.threshold))
            .collect()
    }

    /// Run an activation vector through the debouncer.
    /// Returns the number of transitions that were permitted.
    pub fn apply(&mut self, activation: &[bool], now: Duration) -> usize {
        let mut toggled = 0;
        for (channel, &on) in self.channels.iter_mut().zip(activation) {
            if channel.propose(on, now) {
                toggled += 1;
            }
        }
        toggled
    }

    /// Evaluate and debounce one frame at its own offset
    pub fn process(&mut self, frame: &ControlFrame) -> usize {
        let activation = self.evaluate(frame);
        self.apply(&activation, frame.offset)
    }

    /// Collect channels whose state differs from what was last emitted
    /// and mark them emitted. Empty when nothing changed since the last call.
    pub fn take_command(&mut self) -> Command {
        let mut command = Command::new();
        for channel in &mut self.channels {
            if channel.state != channel.emitted {
                command.set(channel.index, channel.state);
                channel.emitted = channel.state;
            }
        }
        if !command.is_empty() {
            trace!(changes = command.len(), "channel deltas");
        }
        command
    }

    /// Force every channel off regardless of dwell and return the full all-off command
    pub fn force_all_off(&mut self) -> Command {
        for channel in &mut self.channels {
            channel.state = false;
            channel.emitted = false;
        }
        Command::all_off(self.channels.len())
    }
}
