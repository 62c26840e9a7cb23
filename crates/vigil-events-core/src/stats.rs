//! Rolling-window event statistics

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::event::EventStatus;

/// Counts by status over the rolling window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub received: u64,
    pub processing: u64,
    pub processed: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

/// Per-instance rolling window of event status transitions.
///
/// Feeds the health/monitoring boundary; counts are per-instance, not
/// cluster-wide.
pub struct RollingStats {
    window: Duration,
    samples: Mutex<VecDeque<(Instant, EventStatus)>>,
}

impl RollingStats {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Record a status transition
    pub fn record(&self, status: EventStatus) {
        let now = Instant::now();
        let mut samples = self.samples.lock();
        Self::prune(&mut samples, now, self.window);
        samples.push_back((now, status));
    }

    /// Counts by status inside the window
    pub fn counts(&self) -> EventCounts {
        let now = Instant::now();
        let mut samples = self.samples.lock();
        Self::prune(&mut samples, now, self.window);

        let mut counts = EventCounts::default();
        for (_, status) in samples.iter() {
            match status {
                EventStatus::Received => counts.received += 1,
                EventStatus::Processing => counts.processing += 1,
                EventStatus::Processed => counts.processed += 1,
                EventStatus::Failed => counts.failed += 1,
                EventStatus::DeadLettered => counts.dead_lettered += 1,
            }
        }
        counts
    }

    fn prune(samples: &mut VecDeque<(Instant, EventStatus)>, now: Instant, window: Duration) {
        while let Some((at, _)) = samples.front() {
            if now.duration_since(*at) > window {
                samples.pop_front();
            } else {
                break;
            }
        }
    }
}

impl std::fmt::Debug for RollingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingStats")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_status() {
        let stats = RollingStats::new(Duration::from_secs(60));
        stats.record(EventStatus::Processed);
        stats.record(EventStatus::Processed);
        stats.record(EventStatus::Failed);

        let counts = stats.counts();
        assert_eq!(counts.processed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.dead_lettered, 0);
    }

    #[test]
    fn test_old_samples_roll_off() {
        let stats = RollingStats::new(Duration::ZERO);
        stats.record(EventStatus::Processed);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(stats.counts(), EventCounts::default());
    }
}
