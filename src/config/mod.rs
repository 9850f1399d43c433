//! Configuration module for waav-call
//!
//! Configuration comes from .env files, environment variables and an
//! optional YAML file. Priority: YAML > ENV vars > .env values > defaults.
//! The .env file is loaded by the binary at startup, before any of this runs.
//!
//! # Environment variables
//! - `GEMINI_API_KEY` (falls back to `API_KEY`)
//! - `GEMINI_LIVE_URL`, `GEMINI_LIVE_MODEL`, `GEMINI_VOICE`
//! - `GEMINI_API_BASE_URL`, `GEMINI_TEXT_MODEL`, `GEMINI_IMAGE_MODEL`
//! - `CAPTURE_BLOCK_SIZE`
//! - `ALLOW_INSECURE_ENDPOINTS`
//!
//! # Example
//! ```rust,no_run
//! use waav_call::config::CallConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CallConfig::from_env()?;
//! let config = CallConfig::from_file(Path::new("config.yaml"))?;
//! println!("Live model: {}", config.live_model);
//! # Ok(())
//! # }
//! ```

use std::env;
use std::path::Path;

use thiserror::Error;

mod yaml;

pub use yaml::{AudioYaml, GeminiYaml, LiveYaml, SecurityYaml, YamlConfig};

use crate::core::audio::DEFAULT_BLOCK_SIZE;
use crate::core::realtime::gemini::{DEFAULT_LIVE_MODEL, GEMINI_LIVE_URL, GeminiVoice};
use crate::utils::url_validation::{EndpointKind, UrlValidationError, validate_endpoint_url};

/// Default REST API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model for text replies.
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

/// Default model for image generation.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";

/// Upper bound on the capture block size.
const MAX_BLOCK_SIZE: usize = 16384;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid endpoint for {key}: {source}")]
    InvalidEndpoint {
        key: &'static str,
        #[source]
        source: UrlValidationError,
    },

    #[error("API key is not configured (set GEMINI_API_KEY)")]
    MissingApiKey,
}

/// Call configuration
///
/// Contains everything needed to place a live call or send a text message:
/// the API key, endpoint and model selection, and capture block size.
/// Audio rates are fixed (16kHz capture, 24kHz playback) and not configurable.
#[derive(Clone)]
pub struct CallConfig {
    pub api_key: Option<String>,

    // Live stream
    pub live_url: String,
    pub live_model: String,
    pub voice: String,

    // REST capabilities
    pub api_base_url: String,
    pub text_model: String,
    pub image_model: String,

    // Capture
    pub block_size: usize,

    // Security
    pub allow_insecure_endpoints: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            live_url: GEMINI_LIVE_URL.to_string(),
            live_model: DEFAULT_LIVE_MODEL.to_string(),
            voice: GeminiVoice::default().as_str().to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
            allow_insecure_endpoints: false,
        }
    }
}

/// Zeroize the API key when the configuration is dropped.
impl Drop for CallConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.api_key {
            key.zeroize();
        }
    }
}

impl std::fmt::Debug for CallConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("live_url", &self.live_url)
            .field("live_model", &self.live_model)
            .field("voice", &self.voice)
            .field("api_base_url", &self.api_base_url)
            .field("text_model", &self.text_model)
            .field("image_model", &self.image_model)
            .field("block_size", &self.block_size)
            .field("allow_insecure_endpoints", &self.allow_insecure_endpoints)
            .finish()
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

impl CallConfig {
    /// Load configuration from environment variables (with defaults).
    ///
    /// Validates the result before returning.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::env_base()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file on top of environment variables.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let mut config = Self::env_base()?;
        config.apply_yaml(yaml_config);
        config.validate()?;
        Ok(config)
    }

    /// Environment variables merged over defaults, unvalidated.
    fn env_base() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.api_key = env_string("GEMINI_API_KEY").or_else(|| env_string("API_KEY"));

        if let Some(url) = env_string("GEMINI_LIVE_URL") {
            config.live_url = url;
        }
        if let Some(model) = env_string("GEMINI_LIVE_MODEL") {
            config.live_model = model;
        }
        if let Some(voice) = env_string("GEMINI_VOICE") {
            config.voice = voice;
        }
        if let Some(url) = env_string("GEMINI_API_BASE_URL") {
            config.api_base_url = url;
        }
        if let Some(model) = env_string("GEMINI_TEXT_MODEL") {
            config.text_model = model;
        }
        if let Some(model) = env_string("GEMINI_IMAGE_MODEL") {
            config.image_model = model;
        }
        if let Some(size) = env_string("CAPTURE_BLOCK_SIZE") {
            config.block_size =
                size.trim()
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "CAPTURE_BLOCK_SIZE",
                        value: size.clone(),
                    })?;
        }
        if let Some(flag) = env_string("ALLOW_INSECURE_ENDPOINTS") {
            config.allow_insecure_endpoints = parse_bool("ALLOW_INSECURE_ENDPOINTS", &flag)?;
        }

        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(gemini) = yaml.gemini {
            if let Some(key) = gemini.api_key {
                self.api_key = Some(key);
            }
            if let Some(url) = gemini.api_base_url {
                self.api_base_url = url;
            }
            if let Some(model) = gemini.text_model {
                self.text_model = model;
            }
            if let Some(model) = gemini.image_model {
                self.image_model = model;
            }
        }
        if let Some(live) = yaml.live {
            if let Some(url) = live.url {
                self.live_url = url;
            }
            if let Some(model) = live.model {
                self.live_model = model;
            }
            if let Some(voice) = live.voice {
                self.voice = voice;
            }
        }
        if let Some(size) = yaml.audio.and_then(|a| a.block_size) {
            self.block_size = size;
        }
        if let Some(flag) = yaml.security.and_then(|s| s.allow_insecure_endpoints) {
            self.allow_insecure_endpoints = flag;
        }
    }

    /// Check endpoints, block size and model names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint_url(
            &self.live_url,
            EndpointKind::WebSocket,
            self.allow_insecure_endpoints,
        )
        .map_err(|source| ConfigError::InvalidEndpoint {
            key: "GEMINI_LIVE_URL",
            source,
        })?;

        validate_endpoint_url(
            &self.api_base_url,
            EndpointKind::Http,
            self.allow_insecure_endpoints,
        )
        .map_err(|source| ConfigError::InvalidEndpoint {
            key: "GEMINI_API_BASE_URL",
            source,
        })?;

        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::InvalidValue {
                key: "CAPTURE_BLOCK_SIZE",
                value: self.block_size.to_string(),
            });
        }

        for (key, value) in [
            ("GEMINI_LIVE_MODEL", &self.live_model),
            ("GEMINI_TEXT_MODEL", &self.text_model),
            ("GEMINI_IMAGE_MODEL", &self.image_model),
        ] {
            if value.trim().is_empty() || value.contains(char::is_whitespace) {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: value.clone(),
                });
            }
        }

        Ok(())
    }

    /// The API key, or an error when none is configured.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Parsed voice; unknown names fall back to the default voice.
    pub fn gemini_voice(&self) -> GeminiVoice {
        GeminiVoice::from_str_or_default(&self.voice)
    }
}
