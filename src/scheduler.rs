//! Fixed-quantum pacing for static control tracks.
//!
//! Deadlines are absolute: frame `k` is due at `k × quantum` of song time, and
//! the next wake is always computed from the monotonic elapsed time. A late
//! wakeup therefore processes every frame that became due in one go instead of
//! accumulating drift.

use std::time::Duration;

/// Frame pacing for one song session
#[derive(Debug, Clone)]
pub struct Scheduler {
    quantum: Duration,
    /// Index of the next frame that has not been processed yet
    next_index: u64,
}

impl Scheduler {
    pub fn new(quantum: Duration) -> Self {
        Self {
            quantum,
            next_index: 0,
        }
    }

    pub fn quantum(&self) -> Duration {
        self.quantum
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// Song time at which frame `index` is due
    pub fn deadline(&self, index: u64) -> Duration {
        let nanos = self.quantum.as_nanos().saturating_mul(index as u128);
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Index of the latest frame due at `elapsed`
    pub fn due_index(&self, elapsed: Duration) -> u64 {
        let quantum = self.quantum.as_nanos().max(1);
        (elapsed.as_nanos() / quantum).min(u64::MAX as u128) as u64
    }

    /// Number of unprocessed frames due at `elapsed` (more than one after an overrun)
    pub fn frames_due(&self, elapsed: Duration) -> u64 {
        (self.due_index(elapsed) + 1).saturating_sub(self.next_index)
    }

    /// Mark one frame processed
    pub fn advance(&mut self) {
        self.next_index += 1;
    }

    /// Time to sleep until the next frame is due; zero if it is already late
    pub fn next_wake(&self, elapsed: Duration) -> Duration {
        self.deadline(self.next_index).saturating_sub(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    #[test]
    fn test_first_frame_due_immediately() {
        let scheduler = Scheduler::new(ms(25));
        assert_eq!(scheduler.frames_due(ms(0)), 1);
        assert_eq!(scheduler.next_wake(ms(0)), Duration::ZERO);
    }

    #[test]
    fn test_on_time_ticks_process_one_frame() {
        let mut scheduler = Scheduler::new(ms(25));
        for tick in 0..10u64 {
            let elapsed = ms(tick * 25 + 1);
            assert_eq!(scheduler.frames_due(elapsed), 1);
            scheduler.advance();
            assert_eq!(scheduler.next_wake(elapsed), ms(24));
        }
    }

    #[test]
    fn test_overrun_catches_up_in_one_wakeup() {
        let mut scheduler = Scheduler::new(ms(25));
        scheduler.advance();

        // Woke 130 ms late: frames 1..=6 are all due
        let elapsed = ms(155);
        let due = scheduler.frames_due(elapsed);
        assert_eq!(due, 6);
        for _ in 0..due {
            scheduler.advance();
        }
        assert_eq!(scheduler.next_wake(elapsed), ms(20));
    }

    #[test]
    fn test_next_wake_never_negative() {
        let scheduler = Scheduler::new(ms(25));
        assert_eq!(scheduler.next_wake(ms(10_000)), Duration::ZERO);
    }

    #[test]
    fn test_total_frames_independent_of_overrun() {
        let quantum = ms(25);
        for overrun_ms in [0u64, 7, 40, 333, 1000] {
            let mut scheduler = Scheduler::new(quantum);
            let mut processed = 0u64;
            let mut elapsed = Duration::ZERO;
            let horizon = ms(2000);
            let mut overran = false;

            while elapsed <= horizon {
                for _ in 0..scheduler.frames_due(elapsed) {
                    scheduler.advance();
                    processed += 1;
                }
                let mut wake = scheduler.next_wake(elapsed);
                if !overran && elapsed >= ms(500) {
                    wake += ms(overrun_ms);
                    overran = true;
                }
                elapsed += wake.max(Duration::from_micros(1));
            }

            let expected = (horizon.as_millis() / quantum.as_millis()) as i64;
            assert!((processed as i64 - expected).abs() <= 1, "overrun {}ms", overrun_ms);
        }
    }
}
