//! WebSocket Mock Server for the live endpoint

use super::{MockBehavior, MockLiveState};
use base64::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::f32::consts::PI;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Base64 PCM16 tone at 24kHz.
pub fn reply_audio(samples: usize) -> String {
    let bytes: Vec<u8> = (0..samples)
        .map(|i| {
            let t = i as f32 / 24000.0;
            ((2.0 * PI * 220.0 * t).sin() * 0.3 * i16::MAX as f32) as i16
        })
        .flat_map(|s| s.to_le_bytes())
        .collect();
    BASE64_STANDARD.encode(bytes)
}

fn key_matches(request: &Request, expected: &str) -> bool {
    let query = request.uri().query().unwrap_or("");
    url::form_urlencoded::parse(query.as_bytes()).any(|(k, v)| k == "key" && v == expected)
}

async fn send_json<S>(write: &mut S, value: Value, binary: bool) -> Result<(), BoxError>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let text = value.to_string();
    let message = if binary {
        Message::Binary(text.into_bytes().into())
    } else {
        Message::Text(text.into())
    };
    write.send(message).await?;
    Ok(())
}

/// Handle one live connection
async fn handle_live_connection(
    stream: TcpStream,
    behavior: MockBehavior,
    state: Arc<MockLiveState>,
) -> Result<(), BoxError> {
    let expected_key = behavior.api_key.clone();
    let ws_stream = accept_hdr_async(stream, |request: &Request, response: Response| {
        if let Some(ref key) = expected_key
            && !key_matches(request, key)
        {
            let mut error = ErrorResponse::new(Some("API key not valid".to_string()));
            *error.status_mut() = StatusCode::FORBIDDEN;
            return Err(error);
        }
        Ok(response)
    })
    .await?;
    let (mut write, mut read) = ws_stream.split();

    state.connections.fetch_add(1, Ordering::SeqCst);

    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let Ok(message) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                state.received.lock().push(message.clone());

                if message.get("setup").is_some() {
                    if behavior.acknowledge_setup {
                        send_json(&mut write, json!({"setupComplete": {}}), false).await?;
                    }
                    continue;
                }

                if message.get("realtimeInput").is_none() {
                    continue;
                }
                let frames = state.audio_frames.fetch_add(1, Ordering::SeqCst) + 1;

                if frames == behavior.reply_after_frames {
                    for _ in 0..behavior.reply_chunks {
                        let chunk = json!({
                            "serverContent": {
                                "modelTurn": {
                                    "parts": [{
                                        "inlineData": {
                                            "mimeType": "audio/pcm;rate=24000",
                                            "data": reply_audio(behavior.reply_samples)
                                        }
                                    }]
                                }
                            }
                        });
                        send_json(&mut write, chunk, behavior.binary_frames).await?;
                    }

                    let tail = if behavior.interrupt_after_reply {
                        json!({"serverContent": {"interrupted": true}})
                    } else {
                        json!({"serverContent": {"turnComplete": true}})
                    };
                    send_json(&mut write, tail, behavior.binary_frames).await?;
                }

                if behavior.close_after_frames == Some(frames) {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: behavior.close_reason.clone().into(),
                    };
                    write.send(Message::Close(Some(frame))).await?;
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                state.client_closed.store(true, Ordering::SeqCst);
                break;
            }
            Ok(Message::Ping(data)) => {
                write.send(Message::Pong(data)).await?;
            }
            Err(e) => {
                eprintln!("Live mock WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    Ok(())
}

/// A running mock endpoint bound to an ephemeral local port.
pub struct MockLiveServer {
    pub addr: SocketAddr,
    pub state: Arc<MockLiveState>,
    handle: JoinHandle<()>,
}

impl MockLiveServer {
    pub async fn start(behavior: MockBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock listener");
        let addr = listener.local_addr().expect("No local address");
        let state = Arc::new(MockLiveState::default());

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = accept_state.clone();
                let behavior = behavior.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_live_connection(stream, behavior, state).await {
                        eprintln!("Live mock connection error: {}", e);
                    }
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws/live", self.addr)
    }
}

impl Drop for MockLiveServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
