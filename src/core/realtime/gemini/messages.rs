//! Gemini Live API WebSocket message types.
//!
//! # Protocol Overview
//!
//! Client messages (sent to server):
//! - setup - First frame: model, output modality, voice and system instruction
//! - realtimeInput - Streamed microphone audio as `mediaChunks`
//!
//! Server messages (received from server):
//! - setupComplete - Setup accepted, audio may flow
//! - serverContent.modelTurn - Assistant output (`inlineData` audio, text)
//! - serverContent.interrupted - User barged in, drop queued speech
//! - serverContent.turnComplete - Assistant finished its turn
//! - goAway - Server will close the connection soon
//!
//! Server frames can arrive as either Text or Binary WebSocket messages; both
//! carry the same JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::qualified_model_name;
use crate::core::audio::EncodedFrame;
use crate::core::realtime::base::{LiveEvent, LiveSetup};

// =============================================================================
// Shared Content Types
// =============================================================================

/// A content part: text or inline media.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<EncodedFrame>,
}

/// A list of parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }
}

// =============================================================================
// Client Messages
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

/// Body of the `setup` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    /// Fully qualified model name (`models/...`)
    pub model: String,

    pub generation_config: GenerationConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

impl From<&LiveSetup> for SetupPayload {
    fn from(setup: &LiveSetup) -> Self {
        let system_instruction = if setup.system_instruction.is_empty() {
            None
        } else {
            Some(Content::text(setup.system_instruction.clone()))
        };
        Self {
            model: qualified_model_name(&setup.model),
            generation_config: GenerationConfig {
                response_modalities: setup.response_modalities.clone(),
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: setup.voice.name.clone(),
                        },
                    },
                }),
            },
            system_instruction,
        }
    }
}

/// Body of a `realtimeInput` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<EncodedFrame>,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(SetupPayload),
    RealtimeInput(RealtimeInput),
}

impl ClientMessage {
    pub fn setup(setup: &LiveSetup) -> Self {
        Self::Setup(SetupPayload::from(setup))
    }

    /// Wrap one encoded capture frame.
    pub fn audio(frame: EncodedFrame) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![frame],
        })
    }
}

// =============================================================================
// Server Messages
// =============================================================================

/// Body of `serverContent`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,

    #[serde(default)]
    pub interrupted: bool,

    #[serde(default)]
    pub turn_complete: bool,
}

/// Body of `goAway`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    /// Protobuf duration string, e.g. `"10s"`
    #[serde(default)]
    pub time_left: Option<String>,
}

/// A message received from the server.
///
/// Each field is optional; unknown top-level keys (tool calls, usage
/// metadata) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,

    #[serde(default)]
    pub server_content: Option<ServerContent>,

    #[serde(default)]
    pub go_away: Option<GoAway>,
}

impl ServerMessage {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Flatten the message into events, in protocol order.
    pub fn into_events(self) -> Vec<LiveEvent> {
        let mut events = Vec::new();

        if self.setup_complete.is_some() {
            events.push(LiveEvent::SetupComplete);
        }

        if let Some(content) = self.server_content {
            if let Some(turn) = content.model_turn {
                for part in turn.parts {
                    if let Some(blob) = part.inline_data {
                        events.push(LiveEvent::Audio {
                            data: blob.data,
                            mime_type: blob.mime_type,
                        });
                    }
                    if let Some(text) = part.text {
                        events.push(LiveEvent::Text(text));
                    }
                }
            }
            if content.interrupted {
                events.push(LiveEvent::Interrupted);
            }
            if content.turn_complete {
                events.push(LiveEvent::TurnComplete);
            }
        }

        if let Some(go_away) = self.go_away {
            events.push(LiveEvent::GoAway {
                time_left: go_away.time_left.as_deref().and_then(parse_duration),
            });
        }

        events
    }
}

/// Parse a protobuf JSON duration such as `"1.5s"`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let seconds = value.trim().strip_suffix('s')?.parse::<f64>().ok()?;
    Duration::try_from_secs_f64(seconds).ok()
}

// =============================================================================
// Tests
// =============================================================================
