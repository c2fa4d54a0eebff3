//! Wire commands for the light controller.
//!
//! A command is the set of channels whose state changed in one tick, encoded as
//! `p<index>s<0|1>` tokens with no separator and a trailing newline:
//!
//! ```text
//! p0s1p2s1\n
//! ```

use std::fmt;

/// Ordered set of (channel index, new state) pairs written in one line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    changes: Vec<(usize, bool)>,
}

impl Command {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a command from arbitrary changes; sorted by channel, last write wins
    pub fn from_changes(changes: impl IntoIterator<Item = (usize, bool)>) -> Self {
        let mut command = Self::new();
        for (index, on) in changes {
            command.set(index, on);
        }
        command
    }

    /// Command that switches every channel in `0..channel_count` off
    pub fn all_off(channel_count: usize) -> Self {
        Self {
            changes: (0..channel_count).map(|index| (index, false)).collect(),
        }
    }

    /// Record a channel's new state, keeping ascending index order
    pub fn set(&mut self, index: usize, on: bool) {
        match self.changes.binary_search_by_key(&index, |&(i, _)| i) {
            Ok(pos) => self.changes[pos].1 = on,
            Err(pos) => self.changes.insert(pos, (index, on)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[(usize, bool)] {
        &self.changes
    }

    /// New state for one channel, if this command touches it
    pub fn state_of(&self, index: usize) -> Option<bool> {
        self.changes
            .binary_search_by_key(&index, |&(i, _)| i)
            .ok()
            .map(|pos| self.changes[pos].1)
    }

    /// Full wire line including the newline, or `None` when there is nothing to send
    pub fn encode(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(format!("{}\n", self))
    }
}

/// Token string without the line terminator
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &(index, on) in &self.changes {
            write!(f, "p{}s{}", index, if on { 1 } else { 0 })?;
        }
        Ok(())
    }
}
