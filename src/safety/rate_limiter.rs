//! Rate Limiter
//!
//! Bounds how many evolution steps may start per minute and per hour.
//! Sliding windows rather than token buckets so the accounting stays
//! accurate across bursts.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::RateLimitsConfig;
use crate::error::CoevoError;

pub struct TaskRateLimiter {
    max_per_minute: usize,
    max_per_hour: usize,
    minute_window: VecDeque<Instant>,
    hour_window: VecDeque<Instant>,
}

impl TaskRateLimiter {
    pub fn new(config: &RateLimitsConfig) -> Self {
        Self {
            max_per_minute: config.max_tasks_per_minute,
            max_per_hour: config.max_tasks_per_hour,
            minute_window: VecDeque::new(),
            hour_window: VecDeque::new(),
        }
    }

    /// Claim one step slot, or report which window is exhausted.
    pub fn try_acquire(&mut self) -> Result<(), CoevoError> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&mut self, now: Instant) -> Result<(), CoevoError> {
        prune(&mut self.minute_window, now, Duration::from_secs(60));
        prune(&mut self.hour_window, now, Duration::from_secs(3600));

        if self.minute_window.len() >= self.max_per_minute {
            return Err(CoevoError::RateLimited {
                window: "minute".to_string(),
            });
        }
        if self.hour_window.len() >= self.max_per_hour {
            return Err(CoevoError::RateLimited {
                window: "hour".to_string(),
            });
        }

        self.minute_window.push_back(now);
        self.hour_window.push_back(now);
        Ok(())
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(&front) = window.front() {
        if now.duration_since(front) >= span {
            window.pop_front();
        } else {
            break;
        }
    }
}
