//! Progress and ETA estimation
//!
//! Throughput comes from a sliding sample: the tracker remembers the last
//! (instant, completed) pair and refreshes it once more than ten entries have
//! completed since, or on completion. Purely advisory.

use chrono::Utc;
use std::time::{Duration, Instant};

use crate::models::ProgressSample;

/// Completed-count delta that triggers a speed sample refresh.
const SAMPLE_STRIDE: usize = 10;

#[derive(Debug)]
pub struct ProgressTracker {
    last_instant: Option<Instant>,
    last_completed: usize,
    speed: Option<f64>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            last_instant: None,
            last_completed: 0,
            speed: None,
        }
    }

    /// Record a completed-count observation and produce a sample.
    pub fn on_progress(&mut self, completed: usize, total: usize) -> ProgressSample {
        let now = Instant::now();

        match self.last_instant {
            None => {
                self.last_instant = Some(now);
                self.last_completed = completed;
            }
            Some(last) => {
                let delta = completed.saturating_sub(self.last_completed);
                if delta > SAMPLE_STRIDE || (completed == total && delta > 0) {
                    let elapsed = now.duration_since(last).as_secs_f64();
                    if elapsed > 0.0 {
                        self.speed = Some(delta as f64 / elapsed);
                    }
                    self.last_instant = Some(now);
                    self.last_completed = completed;
                }
            }
        }

        let percentage = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let remaining = self.speed.filter(|s| *s > 0.0).map(|speed| {
            let left = total.saturating_sub(completed) as f64;
            Duration::from_secs_f64(left / speed)
        });
        let eta = remaining.map(|r| {
            Utc::now() + chrono::Duration::from_std(r).unwrap_or_else(|_| chrono::Duration::zero())
        });

        ProgressSample {
            completed,
            total,
            percentage,
            speed: self.speed,
            remaining,
            eta,
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a remaining-time estimate for display; `None` means the tracker
/// has not collected enough samples yet.
pub fn format_remaining(remaining: Option<Duration>) -> String {
    match remaining {
        Some(r) => humantime::format_duration(Duration::from_secs(r.as_secs())).to_string(),
        None => "computing".to_string(),
    }
}
