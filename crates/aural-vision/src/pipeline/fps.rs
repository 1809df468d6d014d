//! Rolling processing-rate window.

use std::collections::VecDeque;
use std::time::Instant;

/// Default number of samples kept.
pub const FPS_WINDOW_CAPACITY: usize = 30;

/// Bounded window of recent run timestamps; oldest evicted first.
#[derive(Debug, Clone)]
pub struct FpsWindow {
    capacity: usize,
    samples: VecDeque<Instant>,
}

impl FpsWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, at: Instant) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(at);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `(count - 1) / (newest - oldest)`; 0 with fewer than two samples.
    pub fn fps(&self) -> f64 {
        let (Some(oldest), Some(newest)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        if self.samples.len() < 2 {
            return 0.0;
        }
        let span = newest.saturating_duration_since(*oldest).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        (self.samples.len() - 1) as f64 / span
    }
}

impl Default for FpsWindow {
    fn default() -> Self {
        Self::new(FPS_WINDOW_CAPACITY)
    }
}
