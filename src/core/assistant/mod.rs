//! Text and image reply capabilities.
//!
//! Reply generation and image generation are delegated to a hosted model
//! behind the [`AssistantCapabilities`] trait. This module only decides which
//! capability a message needs and how the answer is presented.

mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::persona::Persona;

pub use gemini::GeminiAssistant;

/// Reply used when an image was produced.
pub const IMAGE_SUCCESS_TEXT: &str = "Here is the image you requested!";

/// Reply used when image generation produced nothing.
pub const IMAGE_FAILURE_TEXT: &str = "I couldn't generate that image right now.";

/// Phrases that route a text message to image generation.
const IMAGE_TRIGGERS: [&str; 2] = ["generate image", "show me a"];

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by assistant capabilities.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// Request could not be sent or the response could not be read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The API answered without any usable content
    #[error("Empty response from model")]
    EmptyResponse,

    /// Nothing to reply to
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for assistant operations.
pub type AssistantResult<T> = Result<T, AssistantError>;

// =============================================================================
// Message Types
// =============================================================================

/// Kind of chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Audio,
    Video,
}

impl MessageKind {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A previous turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    /// `"user"` or `"model"`
    pub role: String,
    pub text: String,
}

/// Everything a text reply is generated from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyContext {
    /// Prompt sent to the model, including any media context prefix
    pub prompt: String,
    pub history: Vec<HistoryTurn>,
    /// Personality of the persona answering
    pub personality: String,
}

impl ReplyContext {
    /// Build the context for a user message.
    ///
    /// Media messages are prefixed with `The user sent a <kind>.`
    pub fn for_message(text: &str, kind: MessageKind, personality: &str) -> Self {
        let context = if kind == MessageKind::Text {
            String::new()
        } else {
            format!("The user sent a {}.", kind)
        };
        Self {
            prompt: format!("{} {}", context, text),
            history: Vec::new(),
            personality: personality.to_string(),
        }
    }
}

/// The persona's answer to one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub sender_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub kind: MessageKind,
}

// =============================================================================
// Capabilities
// =============================================================================

/// Hosted reply and image generation.
#[async_trait]
pub trait AssistantCapabilities: Send + Sync {
    /// Generate a text reply in the persona's voice.
    async fn generate_reply(&self, context: &ReplyContext) -> AssistantResult<String>;

    /// Generate an image. `Ok(None)` means the model produced no image.
    ///
    /// Returns a URL (possibly a `data:` URL).
    async fn generate_image(&self, prompt: &str) -> AssistantResult<Option<String>>;
}

/// Whether a text message asks for an image.
pub fn wants_image(text: &str) -> bool {
    let lower = text.to_lowercase();
    IMAGE_TRIGGERS.iter().any(|trigger| lower.contains(trigger))
}

/// Answer one user message as `persona`.
///
/// Text messages containing an image trigger go to image generation; a
/// missing or failed image becomes a fixed apology rather than an error.
/// Everything else goes to reply generation.
pub async fn respond(
    capabilities: &dyn AssistantCapabilities,
    persona: &Persona,
    text: &str,
    kind: MessageKind,
) -> AssistantResult<Reply> {
    if kind == MessageKind::Text && text.trim().is_empty() {
        return Err(AssistantError::EmptyMessage);
    }

    let sender_id = persona.reply_sender_id().to_string();

    if kind == MessageKind::Text && wants_image(text) {
        let image = match capabilities.generate_image(text).await {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Image generation failed: {}", e);
                None
            }
        };

        return Ok(match image {
            Some(url) => Reply {
                sender_id,
                text: IMAGE_SUCCESS_TEXT.to_string(),
                image_url: Some(url),
                kind: MessageKind::Image,
            },
            None => Reply {
                sender_id,
                text: IMAGE_FAILURE_TEXT.to_string(),
                image_url: None,
                kind: MessageKind::Text,
            },
        });
    }

    let context = ReplyContext::for_message(text, kind, &persona.personality);
    let reply = capabilities.generate_reply(&context).await?;
    tracing::debug!("Reply from {} ({} chars)", persona.name, reply.len());

    Ok(Reply {
        sender_id,
        text: reply,
        image_url: None,
        kind: MessageKind::Text,
    })
}
