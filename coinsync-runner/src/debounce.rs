//! Resort debouncing.
//!
//! Every merge marks the table dirty. `take_due` reports a pending resort once
//! no new mark has arrived for the quiet period, and clears the flag, so a
//! burst of marks turns into a single resort.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const QUIET_PERIOD: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct Pending {
    last_mark: Option<Instant>,
    marks: usize,
}

#[derive(Debug)]
pub struct ResortScheduler {
    quiet: Duration,
    pending: Mutex<Pending>,
}

impl Default for ResortScheduler {
    fn default() -> Self {
        Self::new(QUIET_PERIOD)
    }
}

impl ResortScheduler {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: Mutex::new(Pending::default()),
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }

    pub fn mark(&self, now: Instant) {
        let mut p = self.pending.lock();
        p.last_mark = Some(now);
        p.marks += 1;
    }

    pub fn is_dirty(&self) -> bool {
        self.pending.lock().marks > 0
    }

    /// If the quiet period has passed since the last mark, clear the flag
    /// and return how many marks were coalesced.
    pub fn take_due(&self, now: Instant) -> Option<usize> {
        let mut p = self.pending.lock();
        let last = p.last_mark?;
        if now.saturating_duration_since(last) < self.quiet {
            return None;
        }
        let marks = p.marks;
        *p = Pending::default();
        Some(marks)
    }

    /// Clear the flag regardless of the quiet period.
    pub fn take_now(&self) -> Option<usize> {
        let mut p = self.pending.lock();
        p.last_mark?;
        let marks = p.marks;
        *p = Pending::default();
        Some(marks)
    }
}
