//! Voice call session lifecycle.
//!
//! A `VoiceCall` wires one capture device, one live transport and one
//! playback scheduler together:
//!
//! ```text
//! capture ─► encoder ─► transport.send_audio
//! transport events ─► decoder ─► scheduler ─► playback sink
//! ```
//!
//! A single driver task owns the pipeline and `select!`s over shutdown,
//! playback completions, stream events and capture frames. Shared state is
//! limited to the scheduler (one lock), the mute flag and the state watch.
//!
//! # State machine
//!
//! `Connecting` → `Connected` on `setupComplete`; either → `Ended` on stream
//! close, stream error or `end()`. `Ended` is terminal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::stats::{CallStats, CallStatsSnapshot};
use crate::config::CallConfig;
use crate::core::audio::{
    AudioChunk, CAPTURE_SAMPLE_RATE, CaptureDevice, Clock, DEFAULT_BLOCK_SIZE,
    PLAYBACK_SAMPLE_RATE, PcmDecoder, PcmEncoder, PlaybackId, PlaybackScheduler, PlaybackSink,
};
use crate::core::persona::Persona;
use crate::core::realtime::gemini::{DEFAULT_LIVE_MODEL, Modality};
use crate::core::realtime::{
    CallError, CallErrorCallback, CallResult, LiveEvent, LiveSetup, SessionState,
    SessionStateCallback, SharedTransport, VoiceProfile,
};

/// Static parameters of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSettings {
    /// Live model identifier
    pub model: String,
    /// Samples per capture block
    pub block_size: usize,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_LIVE_MODEL.to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl From<&CallConfig> for CallSettings {
    fn from(config: &CallConfig) -> Self {
        Self {
            model: config.live_model.clone(),
            block_size: config.block_size,
        }
    }
}

/// What the driver should do after handling an input.
enum Step {
    Continue,
    Finish(Option<CallError>),
}

/// State shared between the call handle and its driver task.
struct CallShared {
    id: Uuid,
    settings: CallSettings,
    transport: SharedTransport,
    capture: tokio::sync::Mutex<Box<dyn CaptureDevice>>,
    scheduler: Mutex<PlaybackScheduler>,
    encoder: PcmEncoder,
    decoder: PcmDecoder,
    state_tx: watch::Sender<SessionState>,
    muted: AtomicBool,
    torn_down: AtomicBool,
    stats: CallStats,
    shutdown: CancellationToken,
    last_error: Mutex<Option<CallError>>,
    error_callback: Mutex<Option<CallErrorCallback>>,
    state_callback: Mutex<Option<SessionStateCallback>>,
}

impl CallShared {
    /// Apply a state transition if legal. Returns whether it happened.
    async fn transition(&self, next: SessionState) -> bool {
        let mut previous = next;
        let changed = self.state_tx.send_if_modified(|state| {
            if state.can_transition_to(next) {
                previous = *state;
                *state = next;
                true
            } else {
                false
            }
        });

        if changed {
            tracing::info!("Call {} state: {} -> {}", self.id, previous, next);
            let callback = self.state_callback.lock().clone();
            if let Some(cb) = callback {
                cb(next).await;
            }
        }
        changed
    }

    fn interrupt_playback(&self) -> usize {
        let stopped = self.scheduler.lock().interrupt();
        self.stats.record_interruption();
        tracing::debug!("Call {} interrupted, stopped {} buffers", self.id, stopped);
        stopped
    }

    async fn handle_event(&self, event: LiveEvent) -> Step {
        match event {
            LiveEvent::SetupComplete => {
                if self.transition(SessionState::Connected).await {
                    self.stats.mark_connected();
                }
            }

            LiveEvent::Audio { data, mime_type } => {
                match self.decoder.decode_tagged(&data, &mime_type) {
                    Ok(chunk) if chunk.is_empty() => {}
                    Ok(chunk) => {
                        if self.scheduler.lock().schedule(chunk).is_some() {
                            self.stats.record_scheduled();
                        }
                    }
                    Err(e) => {
                        self.stats.record_dropped();
                        tracing::warn!("Call {} dropped inbound audio frame: {}", self.id, e);
                    }
                }
            }

            LiveEvent::Text(text) => {
                tracing::debug!("Call {} model text: {}", self.id, text);
            }

            LiveEvent::Interrupted => {
                self.interrupt_playback();
            }

            LiveEvent::TurnComplete => {
                tracing::debug!("Call {} turn complete", self.id);
            }

            LiveEvent::GoAway { time_left } => {
                tracing::warn!(
                    "Call {} stream will close soon (time left: {:?})",
                    self.id,
                    time_left
                );
            }

            LiveEvent::Closed { reason } => {
                tracing::info!("Call {} stream closed by server: {:?}", self.id, reason);
                return Step::Finish(None);
            }

            LiveEvent::Error(message) => {
                return Step::Finish(Some(CallError::Transport(message)));
            }
        }
        Step::Continue
    }

    async fn handle_frame(&self, chunk: AudioChunk) -> Step {
        self.stats.record_captured();

        if *self.state_tx.borrow() != SessionState::Connected {
            tracing::trace!("Call {} discarding frame before setup", self.id);
            return Step::Continue;
        }

        if self.muted.load(Ordering::SeqCst) {
            self.stats.record_muted();
            return Step::Continue;
        }

        let frame = match self.encoder.encode(&chunk) {
            Ok(frame) => frame,
            Err(e) => return Step::Finish(Some(CallError::from(e))),
        };

        match self.transport.send_audio(frame).await {
            Ok(()) => {
                self.stats.record_sent();
                Step::Continue
            }
            Err(CallError::Transport(message)) => {
                Step::Finish(Some(CallError::Transport(message)))
            }
            Err(other) => Step::Finish(Some(CallError::Transport(other.to_string()))),
        }
    }

    /// Release everything exactly once and move to `Ended`.
    async fn teardown(&self, reason: Option<CallError>) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();

        if let Some(ref err) = reason {
            tracing::error!("Call {} failed: {}", self.id, err);
            *self.last_error.lock() = Some(err.clone());
        }

        if let Err(e) = self.transport.close().await {
            tracing::warn!("Call {} failed to close stream: {}", self.id, e);
        }
        self.capture.lock().await.stop();
        // Closed under the same lock so an in-flight reply cannot slip in
        let stopped = self.scheduler.lock().close();

        self.stats.mark_ended();

        // Error observers run before `Ended` is published to waiters
        if let Some(err) = reason {
            let callback = self.error_callback.lock().clone();
            if let Some(cb) = callback {
                cb(err).await;
            }
        }

        self.transition(SessionState::Ended).await;
        tracing::info!(
            "Call {} ended, stopped {} playback buffers",
            self.id,
            stopped
        );
    }
}

/// Driver loop: one task per call.
async fn drive(
    shared: Arc<CallShared>,
    mut frames: mpsc::Receiver<AudioChunk>,
    mut events: mpsc::Receiver<LiveEvent>,
    mut ended: mpsc::UnboundedReceiver<PlaybackId>,
) {
    let mut capture_open = true;

    loop {
        let step = tokio::select! {
            biased;

            _ = shared.shutdown.cancelled() => break,

            Some(id) = ended.recv() => {
                shared.scheduler.lock().complete(id);
                Step::Continue
            }

            event = events.recv() => match event {
                Some(event) => shared.handle_event(event).await,
                None => {
                    tracing::info!("Call {} event stream ended", shared.id);
                    Step::Finish(None)
                }
            },

            frame = frames.recv(), if capture_open => match frame {
                Some(chunk) => shared.handle_frame(chunk).await,
                None => {
                    tracing::debug!("Call {} capture stream ended", shared.id);
                    capture_open = false;
                    Step::Continue
                }
            },
        };

        if let Step::Finish(reason) = step {
            shared.teardown(reason).await;
            break;
        }
    }

    tracing::debug!("Call {} driver exited", shared.id);
}

// =============================================================================
// Voice Call
// =============================================================================

/// One voice call with a persona.
///
/// # Example
///
/// ```rust,ignore
/// let call = VoiceCall::new(transport, capture, sink, clock, CallSettings::default());
/// call.start(&persona, VoiceProfile::new("Kore")).await?;
/// call.mute(true);
/// call.end().await;
/// ```
pub struct VoiceCall {
    shared: Arc<CallShared>,
    started: AtomicBool,
    pending_ended: Mutex<Option<mpsc::UnboundedReceiver<PlaybackId>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceCall {
    pub fn new(
        transport: SharedTransport,
        capture: Box<dyn CaptureDevice>,
        sink: Arc<dyn PlaybackSink>,
        clock: Arc<dyn Clock>,
        settings: CallSettings,
    ) -> Self {
        let (scheduler, ended_rx) = PlaybackScheduler::new(clock, sink);
        let (state_tx, _) = watch::channel(SessionState::Connecting);

        let shared = CallShared {
            id: Uuid::new_v4(),
            encoder: PcmEncoder::new(settings.block_size, CAPTURE_SAMPLE_RATE),
            decoder: PcmDecoder::new(PLAYBACK_SAMPLE_RATE, 1),
            settings,
            transport,
            capture: tokio::sync::Mutex::new(capture),
            scheduler: Mutex::new(scheduler),
            state_tx,
            muted: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            stats: CallStats::default(),
            shutdown: CancellationToken::new(),
            last_error: Mutex::new(None),
            error_callback: Mutex::new(None),
            state_callback: Mutex::new(None),
        };

        Self {
            shared: Arc::new(shared),
            started: AtomicBool::new(false),
            pending_ended: Mutex::new(Some(ended_rx)),
            driver: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Acquire the microphone, open the stream and start the pipeline.
    ///
    /// # Errors
    ///
    /// - `Programming` if the call was already started or ended
    /// - `PermissionDenied` if the capture device refused access; the call
    ///   is `Ended` and will not retry
    /// - Connection errors from the transport; the call is `Ended`
    pub async fn start(&self, persona: &Persona, voice: VoiceProfile) -> CallResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CallError::Programming("call already started".to_string()));
        }
        if self.state().is_terminal() {
            return Err(CallError::Programming("call already ended".to_string()));
        }
        let ended_rx = self
            .pending_ended
            .lock()
            .take()
            .ok_or_else(|| CallError::Programming("playback channel missing".to_string()))?;

        let shared = &self.shared;
        tracing::info!(
            "Call {} starting with {} ({}), voice {}",
            shared.id,
            persona.name,
            persona.id,
            voice.name
        );

        let opened = shared
            .capture
            .lock()
            .await
            .open(shared.settings.block_size, CAPTURE_SAMPLE_RATE)
            .await;
        let frames = match opened {
            Ok(frames) => frames,
            Err(e) => {
                let err = CallError::from(e);
                shared.teardown(Some(err.clone())).await;
                return Err(err);
            }
        };

        let setup = LiveSetup {
            model: shared.settings.model.clone(),
            voice,
            system_instruction: persona.system_instruction(),
            response_modalities: vec![Modality::Audio.as_str().to_string()],
        };

        let events = match shared.transport.connect(setup).await {
            Ok(events) => events,
            Err(err) => {
                shared.teardown(Some(err.clone())).await;
                return Err(err);
            }
        };

        // end() may have run while the stream was opening
        if shared.torn_down.load(Ordering::SeqCst) {
            if let Err(e) = shared.transport.close().await {
                tracing::warn!("Call {} failed to close stream: {}", shared.id, e);
            }
            return Err(CallError::NotConnected);
        }

        let handle = tokio::spawn(drive(shared.clone(), frames, events, ended_rx));
        *self.driver.lock() = Some(handle);
        Ok(())
    }

    /// Mute or unmute the microphone.
    ///
    /// Capture keeps running; while muted frames are discarded instead of
    /// sent. Playback is unaffected.
    pub fn mute(&self, muted: bool) {
        let previous = self.shared.muted.swap(muted, Ordering::SeqCst);
        if previous != muted {
            tracing::info!(
                "Call {} {}",
                self.shared.id,
                if muted { "muted" } else { "unmuted" }
            );
        }
    }

    pub fn is_muted(&self) -> bool {
        self.shared.muted.load(Ordering::SeqCst)
    }

    /// Stop all scheduled playback and reset the playback cursor.
    ///
    /// Returns how many buffers were stopped.
    pub fn handle_interruption(&self) -> usize {
        self.shared.interrupt_playback()
    }

    /// Hang up. Closes the stream, stops capture and playback and moves to
    /// `Ended`. Calling it again is a no-op.
    pub async fn end(&self) {
        self.shared.teardown(None).await;
    }

    /// Wait until the call reaches `Ended`.
    pub async fn ended(&self) {
        let mut state_rx = self.shared.state_tx.subscribe();
        let _ = state_rx.wait_for(|state| state.is_terminal()).await;
    }

    /// Wait for the driver task to exit after the call ended.
    pub async fn join(&self) {
        let handle = self.driver.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!("Call {} driver task failed: {}", self.shared.id, e);
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state_tx.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// The error that ended the call, if any.
    pub fn last_error(&self) -> Option<CallError> {
        self.shared.last_error.lock().clone()
    }

    pub fn stats(&self) -> CallStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Number of playback buffers scheduled or playing.
    pub fn active_playback(&self) -> usize {
        self.shared.scheduler.lock().active_count()
    }

    /// Register a callback for errors that end the call.
    pub fn on_error(&self, callback: CallErrorCallback) {
        *self.shared.error_callback.lock() = Some(callback);
    }

    /// Register a callback for state transitions.
    pub fn on_state_change(&self, callback: SessionStateCallback) {
        *self.shared.state_callback.lock() = Some(callback);
    }

    pub fn provider_info(&self) -> serde_json::Value {
        self.shared.transport.get_provider_info()
    }
}

impl Drop for VoiceCall {
    fn drop(&mut self) {
        if !self.shared.torn_down.load(Ordering::SeqCst) {
            tracing::warn!("Call {} dropped without end()", self.shared.id);
            self.shared.shutdown.cancel();
        }
    }
}

impl std::fmt::Debug for VoiceCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceCall")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("muted", &self.is_muted())
            .finish_non_exhaustive()
    }
}
