//! Bounded, strictly-monotone time-series buffer (spec.md §4.1).

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use crate::types::TimePoint;

/// Thread-safe ring buffer of observed-RPS samples, trimmed by both age and count.
///
/// Mirrors `original_source`'s `DataCollector`: a `VecDeque` behind a single lock, one
/// microsecond bump on non-increasing timestamps to keep the forecaster's strict-
/// monotonicity assumption intact even under clock skew.
pub struct TimeSeriesBuffer {
    points: Mutex<VecDeque<TimePoint>>,
    window_seconds: i64,
    max_points: usize,
}

impl TimeSeriesBuffer {
    pub fn new(window_seconds: i64, max_points: usize) -> Self {
        Self {
            points: Mutex::new(VecDeque::new()),
            window_seconds: window_seconds.max(1),
            max_points: max_points.max(2),
        }
    }

    /// Appends `(ts, rps)`, bumping `ts` past the current tail if it would violate
    /// strict monotonicity, then trims by age and by count.
    pub fn append(&self, ts: DateTime<Utc>, rps: f64) {
        let mut points = self.points.lock().unwrap_or_else(|e| e.into_inner());
        let ts = match points.back() {
            Some(tail) if ts <= tail.ts => tail.ts + Duration::microseconds(1),
            _ => ts,
        };
        points.push_back(TimePoint::new(ts, rps));
        Self::trim(&mut points, self.window_seconds, self.max_points);
    }

    /// Returns an ordered copy of the buffer's contents. Callers hold no reference into
    /// the buffer, so the lock is released before they inspect anything.
    pub fn snapshot(&self) -> Vec<TimePoint> {
        let points = self.points.lock().unwrap_or_else(|e| e.into_inner());
        points.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.points.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn trim(points: &mut VecDeque<TimePoint>, window_seconds: i64, max_points: usize) {
        let Some(tail) = points.back().copied() else {
            return;
        };
        let cutoff = tail.ts - Duration::seconds(window_seconds);
        while points.front().is_some_and(|p| p.ts < cutoff) {
            points.pop_front();
        }
        while points.len() > max_points {
            points.pop_front();
        }
    }
}
