//! Gemini Live API client implementation.
//!
//! This module provides the Gemini Live client that implements the
//! `LiveTransport` trait over the `BidiGenerateContent` WebSocket.
//!
//! # API Reference
//!
//! - Endpoint: `wss://generativelanguage.googleapis.com/ws/...BidiGenerateContent?key=<key>`
//! - Protocol: WebSocket with JSON messages (Text or Binary frames)
//! - Audio in: PCM 16-bit, 16kHz, mono, little-endian, base64 encoded
//! - Audio out: PCM 16-bit, 24kHz, mono, little-endian, base64 encoded
//!
//! # Example
//!
//! ```rust,ignore
//! use waav_call::core::realtime::{GeminiLive, LiveTransport};
//!
//! let live = GeminiLive::new(api_key, GEMINI_LIVE_URL)?;
//! let mut events = live.connect(setup).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message, client::IntoClientRequest};
use zeroize::Zeroizing;

use super::config::GEMINI_LIVE_URL;
use super::messages::{ClientMessage, ServerMessage};
use crate::core::audio::{CAPTURE_SAMPLE_RATE, EncodedFrame, PLAYBACK_SAMPLE_RATE};
use crate::core::realtime::base::{
    CallError, CallResult, LiveEvent, LiveSetup, LiveTransport,
};

/// Channel capacity for outbound WebSocket messages.
const WS_CHANNEL_CAPACITY: usize = 256;

/// Channel capacity for inbound events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long `close()` waits for the connection task to send its Close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

// =============================================================================
// Gemini Live Client
// =============================================================================

/// Gemini Live API client.
///
/// # Thread Safety
///
/// All mutable state sits behind `Arc` so it can be shared with the spawned
/// WebSocket task. The `connected` flag is an `AtomicBool` for lock-free
/// status checks.
///
/// There is no automatic reconnection: a dropped stream ends the call.
pub struct GeminiLive {
    api_key: Zeroizing<String>,
    endpoint: String,
    connected: Arc<AtomicBool>,
    /// Set before a local close so the task does not report it as a failure
    intentional_disconnect: Arc<AtomicBool>,
    ws_sender: Arc<Mutex<Option<mpsc::Sender<ClientMessage>>>>,
    connection_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl GeminiLive {
    /// Create a client for `endpoint` (normally [`GEMINI_LIVE_URL`]).
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> CallResult<Self> {
        let api_key = Zeroizing::new(api_key.into());
        if api_key.trim().is_empty() {
            return Err(CallError::AuthenticationFailed(
                "API key is required".to_string(),
            ));
        }

        let endpoint = endpoint.into();
        url::Url::parse(&endpoint)
            .map_err(|e| CallError::InvalidConfiguration(format!("invalid endpoint: {}", e)))?;

        Ok(Self {
            api_key,
            endpoint,
            connected: Arc::new(AtomicBool::new(false)),
            intentional_disconnect: Arc::new(AtomicBool::new(false)),
            ws_sender: Arc::new(Mutex::new(None)),
            connection_handle: Arc::new(Mutex::new(None)),
        })
    }

    /// Create a client for the public endpoint.
    pub fn with_default_endpoint(api_key: impl Into<String>) -> CallResult<Self> {
        Self::new(api_key, GEMINI_LIVE_URL)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the WebSocket URL with the key query parameter.
    fn build_ws_url(&self) -> CallResult<url::Url> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| CallError::InvalidConfiguration(format!("invalid endpoint: {}", e)))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    /// Send a message through the connection task.
    async fn send_message(&self, message: ClientMessage) -> CallResult<()> {
        let guard = self.ws_sender.lock().await;
        if let Some(sender) = guard.as_ref() {
            sender
                .send(message)
                .await
                .map_err(|e| CallError::Transport(format!("Failed to send message: {}", e)))
        } else {
            Err(CallError::NotConnected)
        }
    }

    /// Parse one server frame and forward its events.
    async fn dispatch_frame(text: &str, events: &mpsc::Sender<LiveEvent>) {
        match ServerMessage::parse(text) {
            Ok(message) => {
                for event in message.into_events() {
                    tracing::trace!("Gemini Live event: {:?}", event);
                    if events.send(event).await.is_err() {
                        tracing::debug!("Event receiver dropped");
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to parse server message: {} - {}", e, text);
            }
        }
    }
}

/// Map a handshake failure, separating rejected credentials.
fn classify_connect_error(err: tungstenite::Error) -> CallError {
    match err {
        tungstenite::Error::Http(response)
            if matches!(response.status().as_u16(), 401 | 403) =>
        {
            CallError::AuthenticationFailed(format!("endpoint returned {}", response.status()))
        }
        other => CallError::ConnectionFailed(other.to_string()),
    }
}

#[async_trait]
impl LiveTransport for GeminiLive {
    async fn connect(&self, setup: LiveSetup) -> CallResult<mpsc::Receiver<LiveEvent>> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(CallError::Programming("stream already open".to_string()));
        }

        self.intentional_disconnect.store(false, Ordering::SeqCst);

        let url = self.build_ws_url()?;
        let request = url
            .as_str()
            .into_client_request()
            .map_err(|e| CallError::ConnectionFailed(e.to_string()))?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(classify_connect_error)?;

        tracing::info!("Connected to Gemini Live at {}", self.endpoint);

        let (mut ws_sink, mut ws_stream) = ws_stream.split();

        // Setup must be the first frame on the stream
        let setup_json = serde_json::to_string(&ClientMessage::setup(&setup))?;
        ws_sink
            .send(Message::Text(setup_json.into()))
            .await
            .map_err(|e| CallError::ConnectionFailed(format!("Failed to send setup: {}", e)))?;
        tracing::debug!(
            "Sent setup for model {} with voice {}",
            setup.model,
            setup.voice.name
        );

        let (tx, mut rx) = mpsc::channel::<ClientMessage>(WS_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<LiveEvent>(EVENT_CHANNEL_CAPACITY);
        *self.ws_sender.lock().await = Some(tx);

        let connected = self.connected.clone();
        let intentional_disconnect = self.intentional_disconnect.clone();

        self.connected.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(async move {
            let mut close_reason: Option<String> = None;
            let mut failure: Option<String> = None;

            loop {
                tokio::select! {
                    // Outgoing messages; a dropped sender means close
                    outgoing = rx.recv() => {
                        let Some(message) = outgoing else {
                            if let Err(e) = ws_sink.send(Message::Close(None)).await {
                                tracing::debug!("Failed to send close frame: {}", e);
                            }
                            break;
                        };

                        let json = match serde_json::to_string(&message) {
                            Ok(j) => j,
                            Err(e) => {
                                tracing::error!("Failed to serialize message: {}", e);
                                continue;
                            }
                        };

                        if let Err(e) = ws_sink.send(Message::Text(json.into())).await {
                            tracing::error!("Failed to send WebSocket message: {}", e);
                            failure = Some(e.to_string());
                            break;
                        }
                    }

                    // Incoming messages
                    incoming = ws_stream.next() => {
                        match incoming {
                            Some(Ok(Message::Text(text))) => {
                                Self::dispatch_frame(text.as_str(), &event_tx).await;
                            }
                            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                                Ok(text) => Self::dispatch_frame(text, &event_tx).await,
                                Err(e) => tracing::warn!("Ignoring non-UTF-8 binary frame: {}", e),
                            },
                            Some(Ok(Message::Close(frame))) => {
                                tracing::info!("WebSocket closed by server: {:?}", frame);
                                close_reason = frame
                                    .map(|f| f.reason.as_str().to_string())
                                    .filter(|r| !r.is_empty());
                                break;
                            }
                            Some(Ok(Message::Ping(data))) => {
                                if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                    tracing::error!("Failed to send pong: {}", e);
                                }
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::error!("WebSocket error: {}", e);
                                failure = Some(e.to_string());
                                break;
                            }
                            None => {
                                tracing::info!("WebSocket stream ended");
                                break;
                            }
                        }
                    }
                }
            }

            connected.store(false, Ordering::SeqCst);

            if intentional_disconnect.load(Ordering::SeqCst) {
                tracing::debug!("Intentional disconnect, not reporting closure");
                return;
            }

            let event = match failure {
                Some(message) => LiveEvent::Error(message),
                None => LiveEvent::Closed {
                    reason: close_reason,
                },
            };
            let _ = event_tx.send(event).await;
        });

        *self.connection_handle.lock().await = Some(handle);

        Ok(event_rx)
    }

    async fn send_audio(&self, frame: EncodedFrame) -> CallResult<()> {
        if !self.is_open() {
            return Err(CallError::NotConnected);
        }
        self.send_message(ClientMessage::audio(frame)).await
    }

    async fn close(&self) -> CallResult<()> {
        self.intentional_disconnect.store(true, Ordering::SeqCst);

        // Dropping the sender tells the task to send a Close frame and exit
        self.ws_sender.lock().await.take();

        if let Some(mut handle) = self.connection_handle.lock().await.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut handle).await.is_err() {
                tracing::warn!("Connection task did not exit in time, aborting");
                handle.abort();
            }
            tracing::info!("Disconnected from Gemini Live");
        }

        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn get_provider_info(&self) -> serde_json::Value {
        serde_json::json!({
            "provider": "gemini-live",
            "endpoint": self.endpoint,
            "input_format": format!("pcm16@{}", CAPTURE_SAMPLE_RATE),
            "output_format": format!("pcm16@{}", PLAYBACK_SAMPLE_RATE),
            "reconnection": false,
        })
    }
}

impl std::fmt::Debug for GeminiLive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLive")
            .field("endpoint", &self.endpoint)
            .field("connected", &self.is_open())
            .finish_non_exhaustive()
    }
}
