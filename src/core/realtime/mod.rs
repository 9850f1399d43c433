//! Live audio-to-audio transport module.
//!
//! This module provides the abstractions and the Gemini Live implementation
//! for bidirectional audio streaming with a hosted model.
//!
//! # Architecture
//!
//! - `LiveTransport` trait for endpoint abstraction
//! - Server messages flattened into an ordered stream of `LiveEvent`s
//! - `CallError` shared by every layer of a call
//!
//! # Audio Format
//!
//! - Upstream: PCM 16-bit signed little-endian at 16kHz
//! - Downstream: PCM 16-bit signed little-endian at 24kHz

mod base;
pub mod gemini;

pub use base::{
    CallError, CallErrorCallback, CallResult, LiveEvent, LiveSetup, LiveTransport,
    SessionState, SessionStateCallback, SharedTransport, VoiceProfile,
};
pub use gemini::{DEFAULT_LIVE_MODEL, GEMINI_LIVE_URL, GeminiLive, GeminiVoice, Modality};
