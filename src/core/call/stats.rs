//! Per-call counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

/// Live counters, updated by the session driver.
#[derive(Debug, Default)]
pub struct CallStats {
    frames_captured: AtomicU64,
    frames_sent: AtomicU64,
    frames_muted: AtomicU64,
    frames_dropped: AtomicU64,
    buffers_scheduled: AtomicU64,
    interruptions: AtomicU64,
    connected_at: Mutex<Option<Instant>>,
    ended_at: Mutex<Option<Instant>>,
}

/// Point-in-time copy of [`CallStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CallStatsSnapshot {
    /// Capture blocks received from the device
    pub frames_captured: u64,
    /// Frames transmitted upstream
    pub frames_sent: u64,
    /// Frames discarded because the call was muted
    pub frames_muted: u64,
    /// Inbound audio frames dropped as undecodable
    pub frames_dropped: u64,
    pub buffers_scheduled: u64,
    pub interruptions: u64,
    /// Time since the stream was acknowledged, frozen once the call ends
    pub duration: Duration,
}

impl CallStats {
    pub(crate) fn record_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_muted(&self) {
        self.frames_muted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_scheduled(&self) {
        self.buffers_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_interruption(&self) {
        self.interruptions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn mark_connected(&self) {
        self.connected_at.lock().get_or_insert_with(Instant::now);
    }

    pub(crate) fn mark_ended(&self) {
        self.ended_at.lock().get_or_insert_with(Instant::now);
    }

    /// Time connected. Zero if the call never connected.
    pub fn duration(&self) -> Duration {
        let Some(connected_at) = *self.connected_at.lock() else {
            return Duration::ZERO;
        };
        match *self.ended_at.lock() {
            Some(ended_at) => ended_at.saturating_duration_since(connected_at),
            None => connected_at.elapsed(),
        }
    }

    pub fn snapshot(&self) -> CallStatsSnapshot {
        CallStatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_muted: self.frames_muted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            buffers_scheduled: self.buffers_scheduled.load(Ordering::Relaxed),
            interruptions: self.interruptions.load(Ordering::Relaxed),
            duration: self.duration(),
        }
    }
}

/// Format a duration as `m:ss`, the way the call timer shows it.
pub fn format_call_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = CallStats::default();
        stats.record_captured();
        stats.record_captured();
        stats.record_sent();
        stats.record_muted();
        stats.record_dropped();
        stats.record_scheduled();
        stats.record_interruption();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_captured, 2);
        assert_eq!(snapshot.frames_sent, 1);
        assert_eq!(snapshot.frames_muted, 1);
        assert_eq!(snapshot.frames_dropped, 1);
        assert_eq!(snapshot.buffers_scheduled, 1);
        assert_eq!(snapshot.interruptions, 1);
    }

    #[test]
    fn test_duration_zero_before_connect() {
        let stats = CallStats::default();
        stats.mark_ended();
        assert_eq!(stats.duration(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_frozen_at_end() {
        let stats = CallStats::default();
        stats.mark_connected();
        tokio::time::advance(Duration::from_secs(65)).await;
        stats.mark_ended();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(stats.duration(), Duration::from_secs(65));
        assert_eq!(format_call_duration(stats.duration()), "1:05");
    }

    #[test]
    fn test_format_call_duration() {
        assert_eq!(format_call_duration(Duration::ZERO), "0:00");
        assert_eq!(format_call_duration(Duration::from_millis(9_999)), "0:09");
        assert_eq!(format_call_duration(Duration::from_secs(3600)), "60:00");
    }
}
