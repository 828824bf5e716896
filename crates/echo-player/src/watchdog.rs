//! End-of-track watchdog.
//!
//! Some outputs stop delivering progress or the native `ended` signal (backgrounded
//! players in particular). The watchdog arms whenever a progress report lands within
//! `epsilon` of the duration while playing, and fires if no newer report re-arms or
//! cancels it before `grace` elapses.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct EndWatchdog {
    epsilon_ms: u64,
    grace: Duration,
    deadline: Option<Instant>,
}

impl EndWatchdog {
    pub fn new(epsilon_ms: u64, grace: Duration) -> Self {
        Self {
            epsilon_ms,
            grace,
            deadline: None,
        }
    }

    /// Feed a progress report. Every report resets the timer.
    pub fn on_progress(
        &mut self,
        elapsed_ms: u64,
        duration_ms: Option<u64>,
        playing: bool,
        now: Instant,
    ) {
        if playing && self.is_near_end(elapsed_ms, duration_ms) {
            self.deadline = Some(now + self.grace);
        } else {
            self.deadline = None;
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` once when the deadline has passed, disarming the watchdog.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_near_end(&self, elapsed_ms: u64, duration_ms: Option<u64>) -> bool {
        match duration_ms {
            Some(duration) if duration > 0 => elapsed_ms.saturating_add(self.epsilon_ms) >= duration,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watchdog() -> EndWatchdog {
        EndWatchdog::new(250, Duration::from_millis(500))
    }

    #[test]
    fn arms_near_end_and_fires_after_grace() {
        let mut dog = watchdog();
        let t0 = Instant::now();
        dog.on_progress(9_800, Some(10_000), true, t0);
        assert_eq!(dog.deadline(), Some(t0 + Duration::from_millis(500)));
        assert!(!dog.poll(t0 + Duration::from_millis(499)));
        assert!(dog.poll(t0 + Duration::from_millis(500)));
        assert!(!dog.poll(t0 + Duration::from_millis(900)));
    }

    #[test]
    fn does_not_arm_away_from_end() {
        let mut dog = watchdog();
        let t0 = Instant::now();
        dog.on_progress(9_700, Some(10_000), true, t0);
        assert!(dog.deadline().is_none());
    }

    #[test]
    fn does_not_arm_while_paused_or_without_duration() {
        let mut dog = watchdog();
        let t0 = Instant::now();
        dog.on_progress(9_900, Some(10_000), false, t0);
        assert!(dog.deadline().is_none());
        dog.on_progress(9_900, None, true, t0);
        assert!(dog.deadline().is_none());
        dog.on_progress(0, Some(0), true, t0);
        assert!(dog.deadline().is_none());
    }

    #[test]
    fn each_report_resets_the_timer() {
        let mut dog = watchdog();
        let t0 = Instant::now();
        dog.on_progress(9_800, Some(10_000), true, t0);
        let t1 = t0 + Duration::from_millis(400);
        dog.on_progress(9_900, Some(10_000), true, t1);
        assert!(!dog.poll(t0 + Duration::from_millis(600)));
        assert!(dog.poll(t1 + Duration::from_millis(500)));
    }

    #[test]
    fn report_away_from_end_cancels() {
        let mut dog = watchdog();
        let t0 = Instant::now();
        dog.on_progress(9_900, Some(10_000), true, t0);
        dog.on_progress(1_000, Some(10_000), true, t0 + Duration::from_millis(100));
        assert!(!dog.poll(t0 + Duration::from_secs(5)));
    }
}
