//! Gapless playback scheduler.
//!
//! Decoded buffers arrive at irregular intervals. Each one is scheduled to
//! start exactly when the previous one ends:
//!
//! ```text
//! start  = max(cursor, now)
//! cursor = start + duration
//! ```
//!
//! If buffers arrive after their theoretical start time has passed they play
//! immediately, back-to-back, instead of preserving wall-clock alignment.
//!
//! Every scheduled buffer is tracked in an id-indexed set until it either
//! finishes naturally (`complete`) or is force-stopped (`interrupt` /
//! `stop_all`). Whichever happens first removes it; the other is a no-op.
//!
//! Once `close` has run the scheduler refuses new buffers, so nothing can be
//! handed to the sink after teardown has stopped everything.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::devices::{EndedNotifier, PlaybackRequest, PlaybackSink};
use super::{AudioChunk, Clock};

/// Identifier of a scheduled playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackId(u64);

impl PlaybackId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "playback-{}", self.0)
    }
}

/// Placement of one buffer on the playback timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledPlayback {
    pub id: PlaybackId,
    pub start: Duration,
    pub duration: Duration,
}

impl ScheduledPlayback {
    #[inline]
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// Schedules decoded buffers onto a playback sink without gaps or overlap.
pub struct PlaybackScheduler {
    clock: Arc<dyn Clock>,
    sink: Arc<dyn PlaybackSink>,
    /// End of the last scheduled buffer
    cursor: Duration,
    /// Buffers that are scheduled or playing
    active: BTreeMap<PlaybackId, ScheduledPlayback>,
    next_id: u64,
    closed: bool,
    ended_tx: mpsc::UnboundedSender<PlaybackId>,
}

impl PlaybackScheduler {
    /// Create a scheduler.
    ///
    /// The returned receiver yields the id of every buffer the sink reports as
    /// finished; feed those back into [`PlaybackScheduler::complete`].
    pub fn new(
        clock: Arc<dyn Clock>,
        sink: Arc<dyn PlaybackSink>,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackId>) {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            clock,
            sink,
            cursor: Duration::ZERO,
            active: BTreeMap::new(),
            next_id: 0,
            closed: false,
            ended_tx,
        };
        (scheduler, ended_rx)
    }

    /// Schedule a buffer right after the previous one, or now if the
    /// timeline has already moved past the cursor.
    ///
    /// Returns `None` without touching the sink once the scheduler is closed.
    pub fn schedule(&mut self, chunk: AudioChunk) -> Option<ScheduledPlayback> {
        if self.closed {
            tracing::debug!("Scheduler closed, discarding {:?} buffer", chunk.duration());
            return None;
        }

        let now = self.clock.now();
        let start = self.cursor.max(now);
        let duration = chunk.duration();

        let id = PlaybackId(self.next_id);
        self.next_id += 1;

        let entry = ScheduledPlayback {
            id,
            start,
            duration,
        };
        self.cursor = entry.end();
        self.active.insert(id, entry);

        tracing::trace!(
            "Scheduled {} at {:?} for {:?} (now {:?})",
            id,
            start,
            duration,
            now
        );

        self.sink.play(PlaybackRequest {
            id,
            chunk,
            start_at: start,
            ended: EndedNotifier::new(id, self.ended_tx.clone()),
        });

        Some(entry)
    }

    /// Record natural completion. Returns false if the buffer was already
    /// removed (for example by an interruption that raced the end event).
    pub fn complete(&mut self, id: PlaybackId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Stop everything and reset the cursor.
    ///
    /// The cursor goes back to zero; since `schedule` takes `max(cursor, now)`
    /// the next buffer starts at the current clock time.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.stop_all();
        self.cursor = Duration::ZERO;
        stopped
    }

    /// Force-stop every active buffer. Returns how many were stopped.
    pub fn stop_all(&mut self) -> usize {
        let active = std::mem::take(&mut self.active);
        for id in active.keys() {
            self.sink.stop(*id);
        }
        active.len()
    }

    /// Stop everything and refuse further buffers.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        self.stop_all()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn cursor(&self) -> Duration {
        self.cursor
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: PlaybackId) -> bool {
        self.active.contains_key(&id)
    }

    pub fn active(&self) -> impl Iterator<Item = &ScheduledPlayback> {
        self.active.values()
    }
}

impl std::fmt::Debug for PlaybackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackScheduler")
            .field("cursor", &self.cursor)
            .field("active", &self.active.len())
            .field("next_id", &self.next_id)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::{ManualClock, PLAYBACK_SAMPLE_RATE};
    use parking_lot::Mutex;

    /// Sink that records calls and keeps notifiers so tests can end buffers.
    #[derive(Default)]
    struct RecordingSink {
        played: Mutex<Vec<(PlaybackId, Duration)>>,
        stopped: Mutex<Vec<PlaybackId>>,
        notifiers: Mutex<Vec<EndedNotifier>>,
    }

    impl PlaybackSink for RecordingSink {
        fn play(&self, request: PlaybackRequest) {
            self.played.lock().push((request.id, request.start_at));
            self.notifiers.lock().push(request.ended);
        }

        fn stop(&self, id: PlaybackId) {
            self.stopped.lock().push(id);
        }
    }

    fn chunk_ms(ms: u64) -> AudioChunk {
        let frames = (PLAYBACK_SAMPLE_RATE as u64 * ms / 1000) as usize;
        AudioChunk::mono(vec![0.0; frames], PLAYBACK_SAMPLE_RATE)
    }

    fn setup() -> (
        PlaybackScheduler,
        mpsc::UnboundedReceiver<PlaybackId>,
        Arc<ManualClock>,
        Arc<RecordingSink>,
    ) {
        let clock = Arc::new(ManualClock::new());
        let sink = Arc::new(RecordingSink::default());
        let (scheduler, ended_rx) = PlaybackScheduler::new(clock.clone(), sink.clone());
        (scheduler, ended_rx, clock, sink)
    }

    #[test]
    fn test_stall_scenario_schedule() {
        // 200ms buffers arriving at 0, 50 and 500ms
        let (mut scheduler, _rx, clock, _sink) = setup();

        let first = scheduler.schedule(chunk_ms(200)).unwrap();
        clock.set(Duration::from_millis(50));
        let second = scheduler.schedule(chunk_ms(200)).unwrap();
        clock.set(Duration::from_millis(500));
        let third = scheduler.schedule(chunk_ms(200)).unwrap();

        assert_eq!(first.start, Duration::ZERO);
        assert_eq!(second.start, Duration::from_millis(200));
        assert_eq!(third.start, Duration::from_millis(500));
        assert_eq!(scheduler.cursor(), Duration::from_millis(700));
    }

    #[test]
    fn test_no_overlap_and_no_artificial_gap() {
        let (mut scheduler, _rx, clock, _sink) = setup();
        let arrivals = [0u64, 10, 20, 35, 90, 400, 410, 1500, 1510];
        let durations = [120u64, 80, 200, 40, 300, 100, 60, 250, 90];

        let mut schedule = Vec::new();
        for (arrival, duration) in arrivals.iter().zip(durations.iter()) {
            clock.set(Duration::from_millis(*arrival));
            let cursor_before = scheduler.cursor();
            let entry = scheduler.schedule(chunk_ms(*duration)).unwrap();
            schedule.push((entry, Duration::from_millis(*arrival), cursor_before));
        }

        for pair in schedule.windows(2) {
            let (prev, _, _) = pair[0];
            let (next, arrival, cursor_before) = pair[1];
            assert!(next.start >= prev.end(), "overlap between {:?} and {:?}", prev, next);
            if arrival <= cursor_before {
                assert_eq!(next.start, prev.end(), "artificial gap before {:?}", next);
            } else {
                assert_eq!(next.start, arrival);
            }
        }
    }

    #[test]
    fn test_schedule_registers_and_plays() {
        let (mut scheduler, _rx, _clock, sink) = setup();
        let entry = scheduler.schedule(chunk_ms(100)).unwrap();

        assert!(scheduler.is_active(entry.id));
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(sink.played.lock().as_slice(), &[(entry.id, Duration::ZERO)]);
    }

    #[test]
    fn test_natural_completion_removes_once() {
        let (mut scheduler, mut rx, _clock, sink) = setup();
        let entry = scheduler.schedule(chunk_ms(100)).unwrap();

        let notifier = sink.notifiers.lock().pop().unwrap();
        notifier.notify();
        let ended = rx.try_recv().unwrap();
        assert_eq!(ended, entry.id);

        assert!(scheduler.complete(ended));
        assert!(!scheduler.complete(ended));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_interrupt_stops_all_and_resets_cursor() {
        let (mut scheduler, _rx, clock, sink) = setup();
        let a = scheduler.schedule(chunk_ms(200)).unwrap();
        let b = scheduler.schedule(chunk_ms(200)).unwrap();
        assert_eq!(scheduler.cursor(), Duration::from_millis(400));

        clock.set(Duration::from_millis(120));
        assert_eq!(scheduler.interrupt(), 2);

        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(scheduler.cursor(), Duration::ZERO);
        assert_eq!(sink.stopped.lock().as_slice(), &[a.id, b.id]);

        // Next buffer starts from the clock, not from the stale cursor
        let next = scheduler.schedule(chunk_ms(100)).unwrap();
        assert_eq!(next.start, Duration::from_millis(120));
    }

    #[test]
    fn test_completion_after_interrupt_is_ignored() {
        let (mut scheduler, _rx, _clock, sink) = setup();
        let entry = scheduler.schedule(chunk_ms(100)).unwrap();
        scheduler.interrupt();

        assert!(!scheduler.complete(entry.id));
        assert_eq!(sink.stopped.lock().len(), 1);
    }

    #[test]
    fn test_stop_all_on_empty_set() {
        let (mut scheduler, _rx, _clock, sink) = setup();
        assert_eq!(scheduler.stop_all(), 0);
        assert!(sink.stopped.lock().is_empty());
    }

    #[test]
    fn test_closed_scheduler_rejects_buffers() {
        let (mut scheduler, _rx, _clock, sink) = setup();
        let entry = scheduler.schedule(chunk_ms(100)).unwrap();

        assert_eq!(scheduler.close(), 1);
        assert!(scheduler.is_closed());
        assert_eq!(sink.stopped.lock().as_slice(), &[entry.id]);

        assert!(scheduler.schedule(chunk_ms(100)).is_none());
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(sink.played.lock().len(), 1);

        // Still closed after an interruption
        scheduler.interrupt();
        assert!(scheduler.schedule(chunk_ms(100)).is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        let (mut scheduler, _rx, _clock, _sink) = setup();
        let a = scheduler.schedule(chunk_ms(10)).unwrap();
        let b = scheduler.schedule(chunk_ms(10)).unwrap();
        assert_ne!(a.id, b.id);
        assert!(b.id > a.id);
    }
}
