//! Mock Live Endpoint
//!
//! Simulates the Gemini Live `BidiGenerateContent` WebSocket:
//! - Key checked during the handshake
//! - `setupComplete` after the setup message
//! - Scripted audio replies, interruptions and server closes
//! - Records every client message for assertions

// Allow dead code in test infrastructure - not every test uses every helper
#![allow(dead_code)]

pub mod live_mock;

pub use live_mock::*;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

/// What the mock does over one connection.
#[derive(Clone, Debug)]
pub struct MockBehavior {
    /// Reject the handshake with 403 unless the `key` query matches
    pub api_key: Option<String>,
    /// Answer setup with `setupComplete`
    pub acknowledge_setup: bool,
    /// Reply after this many audio frames (0 = never)
    pub reply_after_frames: u64,
    /// Audio chunks per reply
    pub reply_chunks: usize,
    /// Samples per reply chunk (24kHz)
    pub reply_samples: usize,
    /// Send replies as Binary frames instead of Text
    pub binary_frames: bool,
    /// Follow the reply with `interrupted` instead of `turnComplete`
    pub interrupt_after_reply: bool,
    /// Close the socket after this many audio frames
    pub close_after_frames: Option<u64>,
    pub close_reason: String,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            api_key: None,
            acknowledge_setup: true,
            reply_after_frames: 0,
            reply_chunks: 1,
            reply_samples: 2400,
            binary_frames: false,
            interrupt_after_reply: false,
            close_after_frames: None,
            close_reason: "session over".to_string(),
        }
    }
}

impl MockBehavior {
    /// Reply with `chunks` chunks after the first audio frame.
    pub fn replying(chunks: usize) -> Self {
        Self {
            reply_after_frames: 1,
            reply_chunks: chunks,
            ..Default::default()
        }
    }
}

/// Observations shared with the test.
#[derive(Debug, Default)]
pub struct MockLiveState {
    pub received: Mutex<Vec<Value>>,
    pub connections: AtomicU64,
    pub audio_frames: AtomicU64,
    pub client_closed: AtomicBool,
}

impl MockLiveState {
    pub fn setups(&self) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .filter_map(|m| m.get("setup").cloned())
            .collect()
    }

    pub fn audio_chunks(&self) -> Vec<Value> {
        self.received
            .lock()
            .iter()
            .filter_map(|m| m.pointer("/realtimeInput/mediaChunks/0").cloned())
            .collect()
    }

    pub fn audio_frames(&self) -> u64 {
        self.audio_frames.load(Ordering::SeqCst)
    }

    pub fn first_message(&self) -> Option<Value> {
        self.received.lock().first().cloned()
    }
}
