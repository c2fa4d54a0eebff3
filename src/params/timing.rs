//! Scheduling and debounce timing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LightsError, Result};

/// Tick and dwell timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingParams {
    /// Time between rows of a static control track (milliseconds)
    pub quantum_ms: u64,

    /// Minimum time a channel holds a state before it may toggle again (milliseconds)
    pub min_dwell_ms: u64,

    /// How long to wait for a remote before picking a song on our own (milliseconds)
    pub startup_grace_ms: u64,
}

impl Default for TimingParams {
    fn default() -> Self {
        Self {
            quantum_ms: 25,
            min_dwell_ms: 200,
            startup_grace_ms: 5000,
        }
    }
}

impl TimingParams {
    pub fn quantum(&self) -> Duration {
        Duration::from_millis(self.quantum_ms)
    }

    pub fn min_dwell(&self) -> Duration {
        Duration::from_millis(self.min_dwell_ms)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.quantum_ms == 0 {
            return Err(LightsError::Config("quantum_ms must be > 0".to_string()));
        }
        Ok(())
    }
}
