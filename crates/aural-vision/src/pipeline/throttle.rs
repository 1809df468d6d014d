//! Wall-clock rate limiter for inference runs.

use std::time::{Duration, Instant};

/// Allows at most one run per `interval`, measured from the last accepted run.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_run: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
        }
    }

    /// Whether a run would be accepted at `now`.
    pub fn is_ready(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    /// Accept a run at `now` if the interval has elapsed.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.is_ready(now) {
            self.last_run = Some(now);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_runs() {
        let mut throttle = Throttle::new(Duration::from_millis(200));
        assert!(throttle.try_acquire(Instant::now()));
    }

    #[test]
    fn test_frames_50ms_apart_run_once() {
        let mut throttle = Throttle::new(Duration::from_millis(200));
        let t0 = Instant::now();
        assert!(throttle.try_acquire(t0));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(50)));
    }

    #[test]
    fn test_frames_200ms_apart_each_run() {
        let mut throttle = Throttle::new(Duration::from_millis(200));
        let t0 = Instant::now();
        for i in 0..5 {
            assert!(throttle.try_acquire(t0 + Duration::from_millis(200 * i)));
        }
    }

    #[test]
    fn test_rejected_frames_do_not_reset_interval() {
        let mut throttle = Throttle::new(Duration::from_millis(200));
        let t0 = Instant::now();
        assert!(throttle.try_acquire(t0));
        assert!(!throttle.try_acquire(t0 + Duration::from_millis(150)));
        assert!(throttle.try_acquire(t0 + Duration::from_millis(210)));
    }
}
