//! Base traits and types for live audio-to-audio transports.
//!
//! This module defines the foundational abstractions shared by the call
//! session and the streaming endpoint clients:
//! - The call error taxonomy
//! - The session state machine
//! - The `LiveTransport` trait and the events it yields
//!
//! # Audio Format
//!
//! Transports send PCM 16-bit signed little-endian at 16kHz and receive
//! PCM 16-bit signed little-endian at 24kHz, both base64 encoded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::audio::{AudioError, EncodedFrame};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during a voice call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Microphone access was refused
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Inbound frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The stream failed mid-call
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection to the endpoint failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An internal invariant was violated
    #[error("Programming error: {0}")]
    Programming(String),

    /// Capture or playback device failed
    #[error("Device error: {0}")]
    Device(String),
}

impl CallError {
    /// Whether the error ends the call.
    ///
    /// Only decode errors are absorbed at frame level.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CallError::Decode(_))
    }
}

impl From<AudioError> for CallError {
    fn from(err: AudioError) -> Self {
        match err {
            AudioError::BlockSize { .. } | AudioError::SampleRate { .. } => {
                CallError::Programming(err.to_string())
            }
            AudioError::Base64(_) | AudioError::IncompleteFrame(_) => {
                CallError::Decode(err.to_string())
            }
            AudioError::PermissionDenied(msg) => CallError::PermissionDenied(msg),
            AudioError::Wav(_) | AudioError::UnsupportedFormat(_) | AudioError::Device(_) => {
                CallError::Device(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        CallError::Serialization(err.to_string())
    }
}

/// Result type for call operations.
pub type CallResult<T> = Result<T, CallError>;

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Stream requested, waiting for the setup acknowledgement
    #[default]
    Connecting,
    /// Setup acknowledged, audio flowing
    Connected,
    /// Terminal
    Ended,
}

impl SessionState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Ended)
    }

    /// Whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        match (self, next) {
            (SessionState::Connecting, SessionState::Connected) => true,
            (SessionState::Connecting | SessionState::Connected, SessionState::Ended) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Ended => write!(f, "ended"),
        }
    }
}

// =============================================================================
// Setup Types
// =============================================================================

/// Voice used for the assistant's speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Prebuilt voice name, e.g. "Kore"
    pub name: String,
}

impl VoiceProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Parameters of the one-shot setup message that opens a live stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSetup {
    /// Model identifier without the `models/` prefix
    pub model: String,
    pub voice: VoiceProfile,
    /// Sent once and never renegotiated
    pub system_instruction: String,
    /// Requested output modalities, normally `["AUDIO"]`
    pub response_modalities: Vec<String>,
}

// =============================================================================
// Events
// =============================================================================

/// Event received from a live stream.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// The endpoint accepted the setup message
    SetupComplete,
    /// A chunk of assistant speech
    Audio { data: String, mime_type: String },
    /// Text produced alongside audio
    Text(String),
    /// The user started speaking over the assistant
    Interrupted,
    /// The assistant finished its turn
    TurnComplete,
    /// The endpoint will close the stream soon
    GoAway { time_left: Option<Duration> },
    /// The stream closed without being asked to
    Closed { reason: Option<String> },
    /// The stream failed
    Error(String),
}

/// Callback type for call errors.
pub type CallErrorCallback =
    Arc<dyn Fn(CallError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback type for session state changes.
pub type SessionStateCallback =
    Arc<dyn Fn(SessionState) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Transport Trait
// =============================================================================

/// A bidirectional streaming connection to a live audio endpoint.
///
/// # Lifecycle
///
/// 1. `connect()` opens the stream and sends the setup message; the returned
///    receiver yields every server event in arrival order
/// 2. `send_audio()` streams capture frames
/// 3. `close()` ends the stream; no `Closed` event is emitted for it
///
/// # Thread Safety
///
/// All methods take `&self` so one transport can be shared between the
/// session driver and `end()`.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open the stream and send the setup message.
    async fn connect(&self, setup: LiveSetup) -> CallResult<mpsc::Receiver<LiveEvent>>;

    /// Send one encoded capture frame.
    async fn send_audio(&self, frame: EncodedFrame) -> CallResult<()>;

    /// Close the stream. Safe to call more than once.
    async fn close(&self) -> CallResult<()>;

    /// Whether the stream is open.
    fn is_open(&self) -> bool;

    /// Provider information for logging and diagnostics.
    fn get_provider_info(&self) -> serde_json::Value;
}

/// Type alias for a shared transport.
pub type SharedTransport = Arc<dyn LiveTransport>;
