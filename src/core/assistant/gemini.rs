//! Gemini REST implementation of the assistant capabilities.
//!
//! - Endpoint: `POST {base}/v1beta/models/{model}:generateContent`
//! - Auth: `x-goog-api-key` header

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{AssistantCapabilities, AssistantError, AssistantResult, ReplyContext};
use crate::config::CallConfig;

/// Request timeout for generation calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
    }

    fn text(&self) -> Option<String> {
        let text: String = self.parts().filter_map(|p| p.text.as_deref()).collect();
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn image_data_url(&self) -> Option<String> {
        self.parts()
            .filter_map(|p| p.inline_data.as_ref())
            .find(|d| d.mime_type.starts_with("image/"))
            .map(|d| format!("data:{};base64,{}", d.mime_type, d.data))
    }
}

// =============================================================================
// Client
// =============================================================================

/// Gemini `generateContent` client.
pub struct GeminiAssistant {
    client: reqwest::Client,
    base_url: String,
    api_key: Zeroizing<String>,
    text_model: String,
    image_model: String,
}

impl GeminiAssistant {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        text_model: impl Into<String>,
        image_model: impl Into<String>,
    ) -> AssistantResult<Self> {
        let api_key = Zeroizing::new(api_key.into());
        if api_key.trim().is_empty() {
            return Err(AssistantError::InvalidConfiguration(
                "API key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            text_model: text_model.into(),
            image_model: image_model.into(),
        })
    }

    /// Build from loaded configuration.
    pub fn from_config(config: &CallConfig) -> AssistantResult<Self> {
        let api_key = config
            .require_api_key()
            .map_err(|e| AssistantError::InvalidConfiguration(e.to_string()))?;
        Self::new(
            api_key,
            config.api_base_url.clone(),
            config.text_model.clone(),
            config.image_model.clone(),
        )
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> AssistantResult<GenerateContentResponse> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", self.api_key.as_str())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!("generateContent failed for {}: {} {}", model, status, message);
            return Err(AssistantError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<GenerateContentResponse>().await?)
    }
}

#[async_trait]
impl AssistantCapabilities for GeminiAssistant {
    async fn generate_reply(&self, context: &ReplyContext) -> AssistantResult<String> {
        let mut contents: Vec<Content> = context
            .history
            .iter()
            .map(|turn| Content {
                role: Some(turn.role.clone()),
                parts: vec![Part::text(turn.text.clone())],
            })
            .collect();
        contents.push(Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(context.prompt.clone())],
        });

        let system_instruction = (!context.personality.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part::text(context.personality.clone())],
        });

        let request = GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: None,
        };

        let response = self.generate(&self.text_model, &request).await?;
        response.text().ok_or(AssistantError::EmptyResponse)
    }

    async fn generate_image(&self, prompt: &str) -> AssistantResult<Option<String>> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(prompt)],
            }],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
            }),
        };

        let response = self.generate(&self.image_model, &request).await?;
        let image = response.image_data_url();
        if image.is_none() {
            tracing::debug!("Image model returned no image part");
        }
        Ok(image)
    }
}
