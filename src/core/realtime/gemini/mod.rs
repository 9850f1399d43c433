//! Gemini Live streaming endpoint.
//!
//! - `config` - endpoint, model and voice constants
//! - `messages` - setup / realtimeInput / serverContent wire types
//! - `client` - the `LiveTransport` implementation

mod client;
mod config;
mod messages;

pub use client::GeminiLive;
pub use config::{
    DEFAULT_LIVE_MODEL, GEMINI_LIVE_URL, GeminiVoice, MODEL_PREFIX, Modality, qualified_model_name,
};
pub use messages::{ClientMessage, ServerMessage, parse_duration};
