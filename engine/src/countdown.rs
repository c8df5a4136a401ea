use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Raised by [`Countdown::tick`] on the frame the remaining time reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired;

/// A decaying "time left" counter for time boxed rounds.
///
/// Decay only happens through [`Countdown::tick`], so callers feed it the
/// frame delta they already measure. Once expired, only [`Countdown::reset`]
/// rearms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    #[serde(with = "crate::serde_secs")]
    remaining: Duration,
    running: bool,
    paused: bool,
    expired: bool,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::idle()
    }
}

impl Countdown {
    pub const fn idle() -> Self {
        Self {
            remaining: Duration::ZERO,
            running: false,
            paused: false,
            expired: false,
        }
    }

    /// Arms the timer at `duration`. Restarts a running timer.
    ///
    /// Returns `false` (and changes nothing) once the timer has expired.
    pub fn start(&mut self, duration: Duration) -> bool {
        if self.expired {
            return false;
        }
        self.arm(duration);
        true
    }

    pub fn reset(&mut self, duration: Duration) {
        self.arm(duration);
    }

    fn arm(&mut self, duration: Duration) {
        self.remaining = duration;
        self.running = true;
        self.paused = false;
        self.expired = false;
    }

    /// Halts decay without raising [`Expired`].
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn tick(&mut self, dt: Duration) -> Option<Expired> {
        if !self.running || self.paused {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(dt);
        if self.remaining.is_zero() {
            self.running = false;
            self.expired = true;
            return Some(Expired);
        }
        None
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn remaining_secs(&self) -> f64 {
        self.remaining.as_secs_f64()
    }

    /// Whole seconds left, rounded up (what a "next round in N" label shows).
    pub fn remaining_whole_secs(&self) -> u64 {
        let secs = self.remaining.as_secs();
        if self.remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    pub fn is_running(&self) -> bool {
        self.running && !self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// `MM:SS:CC`, each field truncated.
    pub fn display(&self) -> String {
        format_clock(self.remaining)
    }
}

pub fn format_clock(value: Duration) -> String {
    let total = value.as_secs();
    let minutes = total / 60;
    let seconds = total % 60;
    let hundredths = value.subsec_nanos() / 10_000_000;
    format!("{minutes:02}:{seconds:02}:{hundredths:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn tick_subtracts_elapsed_time() {
        let mut t = Countdown::idle();
        assert!(t.start(secs(40.0)));
        assert_eq!(t.tick(secs(15.0)), None);
        assert!((t.remaining_secs() - 25.0).abs() < 1e-9);
        assert!(t.is_running());
    }

    #[test]
    fn expiry_clamps_and_fires_once() {
        let mut t = Countdown::idle();
        t.start(secs(40.0));
        t.tick(secs(15.0));

        assert_eq!(t.tick(secs(30.0)), Some(Expired));
        assert_eq!(t.remaining(), Duration::ZERO);
        assert!(!t.is_running());
        assert!(t.is_expired());

        assert_eq!(t.tick(secs(1.0)), None);
        assert_eq!(t.tick(Duration::ZERO), None);
        assert_eq!(t.remaining(), Duration::ZERO);
    }

    #[test]
    fn tick_while_idle_is_noop() {
        let mut t = Countdown::idle();
        assert_eq!(t.tick(secs(3.0)), None);
        assert_eq!(t.remaining(), Duration::ZERO);
        assert!(!t.is_expired());
    }

    #[test]
    fn pause_freezes_decay_without_losing_time() {
        let mut t = Countdown::idle();
        t.start(secs(10.0));
        t.tick(secs(2.0));
        t.pause();
        assert_eq!(t.tick(secs(100.0)), None);
        assert_eq!(t.remaining(), secs(8.0));

        t.resume();
        t.tick(secs(3.0));
        assert_eq!(t.remaining(), secs(5.0));
    }

    #[test]
    fn start_while_running_restarts() {
        let mut t = Countdown::idle();
        t.start(secs(10.0));
        t.tick(secs(4.0));
        assert!(t.start(secs(10.0)));
        assert_eq!(t.remaining(), secs(10.0));
    }

    #[test]
    fn only_reset_rearms_after_expiry() {
        let mut t = Countdown::idle();
        t.start(secs(1.0));
        assert_eq!(t.tick(secs(2.0)), Some(Expired));

        assert!(!t.start(secs(5.0)));
        assert_eq!(t.remaining(), Duration::ZERO);

        t.reset(secs(5.0));
        assert!(t.is_running());
        assert_eq!(t.tick(secs(5.0)), Some(Expired));
    }

    #[test]
    fn stop_does_not_raise_expired() {
        let mut t = Countdown::idle();
        t.start(secs(5.0));
        t.stop();
        assert_eq!(t.tick(secs(10.0)), None);
        assert!(!t.is_expired());
        assert_eq!(t.remaining(), secs(5.0));
    }

    #[test]
    fn display_truncates_each_field() {
        assert_eq!(format_clock(Duration::from_millis(40_000)), "00:40:00");
        assert_eq!(format_clock(Duration::from_millis(25_999)), "00:25:99");
        assert_eq!(format_clock(Duration::from_millis(61_005)), "01:01:00");
        assert_eq!(format_clock(Duration::from_millis(9)), "00:00:00");
    }

    #[test]
    fn whole_seconds_round_up() {
        let mut t = Countdown::idle();
        t.start(secs(10.0));
        assert_eq!(t.remaining_whole_secs(), 10);
        t.tick(secs(0.25));
        assert_eq!(t.remaining_whole_secs(), 10);
        t.tick(secs(0.75));
        assert_eq!(t.remaining_whole_secs(), 9);
    }
}
