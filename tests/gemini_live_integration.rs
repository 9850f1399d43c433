//! Integration tests for the Gemini Live client against a local mock endpoint
//!
//! These tests verify:
//! - Setup is the first frame and carries model, voice and instruction
//! - Server content is delivered as ordered events (Text and Binary frames)
//! - Capture frames are wrapped as `realtimeInput.mediaChunks`
//! - Server close and handshake rejection are reported correctly
//! - A local close is silent

mod mock_providers;

use std::sync::atomic::Ordering;
use std::time::Duration;

use mock_providers::{MockBehavior, MockLiveServer};
use tokio::sync::mpsc;
use waav_call::core::audio::EncodedFrame;
use waav_call::core::realtime::{
    CallError, GeminiLive, LiveEvent, LiveSetup, LiveTransport, VoiceProfile,
};

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

fn setup() -> LiveSetup {
    LiveSetup {
        model: "gemini-test-model".to_string(),
        voice: VoiceProfile::new("Kore"),
        system_instruction: "You are on a voice call.".to_string(),
        response_modalities: vec!["AUDIO".to_string()],
    }
}

fn mic_frame() -> EncodedFrame {
    EncodedFrame {
        mime_type: "audio/pcm;rate=16000".to_string(),
        data: "AAAAAA==".to_string(),
    }
}

async fn next_event(events: &mut mpsc::Receiver<LiveEvent>) -> Option<LiveEvent> {
    tokio::time::timeout(EVENT_TIMEOUT, events.recv())
        .await
        .expect("Timed out waiting for event")
}

async fn wait_for_frames(server: &MockLiveServer, count: u64) {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while server.state.audio_frames() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Mock never received the audio frames");
}

#[tokio::test]
async fn test_setup_is_first_frame() {
    let server = MockLiveServer::start(MockBehavior::default()).await;
    let live = GeminiLive::new("test-key", server.url()).unwrap();

    let mut events = live.connect(setup()).await.unwrap();
    assert_eq!(next_event(&mut events).await, Some(LiveEvent::SetupComplete));
    assert!(live.is_open());

    let first = server.state.first_message().unwrap();
    let setup = &first["setup"];
    assert_eq!(setup["model"], "models/gemini-test-model");
    assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
    assert_eq!(
        setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
        "Kore"
    );
    assert_eq!(
        setup["systemInstruction"]["parts"][0]["text"],
        "You are on a voice call."
    );

    live.close().await.unwrap();
}

#[tokio::test]
async fn test_audio_frames_reach_endpoint() {
    let server = MockLiveServer::start(MockBehavior::default()).await;
    let live = GeminiLive::new("test-key", server.url()).unwrap();
    let mut events = live.connect(setup()).await.unwrap();
    next_event(&mut events).await;

    for _ in 0..3 {
        live.send_audio(mic_frame()).await.unwrap();
    }
    wait_for_frames(&server, 3).await;

    let chunks = server.state.audio_chunks();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0]["mimeType"], "audio/pcm;rate=16000");
    assert_eq!(chunks[0]["data"], "AAAAAA==");

    live.close().await.unwrap();
}

#[tokio::test]
async fn test_reply_events_in_order() {
    let server = MockLiveServer::start(MockBehavior::replying(2)).await;
    let live = GeminiLive::new("test-key", server.url()).unwrap();
    let mut events = live.connect(setup()).await.unwrap();
    next_event(&mut events).await;

    live.send_audio(mic_frame()).await.unwrap();

    for _ in 0..2 {
        match next_event(&mut events).await {
            Some(LiveEvent::Audio { mime_type, data }) => {
                assert_eq!(mime_type, "audio/pcm;rate=24000");
                assert!(!data.is_empty());
            }
            other => panic!("Expected audio event, got {:?}", other),
        }
    }
    assert_eq!(next_event(&mut events).await, Some(LiveEvent::TurnComplete));

    live.close().await.unwrap();
}

#[tokio::test]
async fn test_binary_frames_are_parsed() {
    let behavior = MockBehavior {
        binary_frames: true,
        interrupt_after_reply: true,
        ..MockBehavior::replying(1)
    };
    let server = MockLiveServer::start(behavior).await;
    let live = GeminiLive::new("test-key", server.url()).unwrap();
    let mut events = live.connect(setup()).await.unwrap();
    next_event(&mut events).await;

    live.send_audio(mic_frame()).await.unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        Some(LiveEvent::Audio { .. })
    ));
    assert_eq!(next_event(&mut events).await, Some(LiveEvent::Interrupted));

    live.close().await.unwrap();
}

#[tokio::test]
async fn test_server_close_reported() {
    let behavior = MockBehavior {
        close_after_frames: Some(1),
        close_reason: "quota exceeded".to_string(),
        ..Default::default()
    };
    let server = MockLiveServer::start(behavior).await;
    let live = GeminiLive::new("test-key", server.url()).unwrap();
    let mut events = live.connect(setup()).await.unwrap();
    next_event(&mut events).await;

    live.send_audio(mic_frame()).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        Some(LiveEvent::Closed {
            reason: Some("quota exceeded".to_string())
        })
    );
    assert_eq!(next_event(&mut events).await, None);
    assert!(!live.is_open());
    assert_eq!(
        live.send_audio(mic_frame()).await,
        Err(CallError::NotConnected)
    );
}

#[tokio::test]
async fn test_local_close_is_silent() {
    let server = MockLiveServer::start(MockBehavior::default()).await;
    let live = GeminiLive::new("test-key", server.url()).unwrap();
    let mut events = live.connect(setup()).await.unwrap();
    next_event(&mut events).await;

    live.close().await.unwrap();
    assert!(!live.is_open());
    // Stream ends without a Closed event
    assert_eq!(next_event(&mut events).await, None);

    tokio::time::timeout(EVENT_TIMEOUT, async {
        while !server.state.client_closed.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Mock never saw the close frame");

    // Closing again is a no-op
    live.close().await.unwrap();
}

#[tokio::test]
async fn test_rejected_key() {
    let behavior = MockBehavior {
        api_key: Some("right-key".to_string()),
        ..Default::default()
    };
    let server = MockLiveServer::start(behavior).await;

    let live = GeminiLive::new("wrong-key", server.url()).unwrap();
    let result = live.connect(setup()).await;
    assert!(matches!(result, Err(CallError::AuthenticationFailed(_))));
    assert!(!live.is_open());

    let live = GeminiLive::new("right-key", server.url()).unwrap();
    let mut events = live.connect(setup()).await.unwrap();
    assert_eq!(next_event(&mut events).await, Some(LiveEvent::SetupComplete));
    live.close().await.unwrap();
}

#[tokio::test]
async fn test_connection_refused() {
    // Bind then drop to get a port with nothing listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let live = GeminiLive::new("test-key", format!("ws://{}/ws/live", addr)).unwrap();
    let result = live.connect(setup()).await;
    assert!(matches!(result, Err(CallError::ConnectionFailed(_))));
}

#[tokio::test]
async fn test_second_connect_rejected() {
    let server = MockLiveServer::start(MockBehavior::default()).await;
    let live = GeminiLive::new("test-key", server.url()).unwrap();
    let _events = live.connect(setup()).await.unwrap();

    let result = live.connect(setup()).await;
    assert!(matches!(result, Err(CallError::Programming(_))));
    assert_eq!(server.state.connections.load(Ordering::SeqCst), 1);

    live.close().await.unwrap();
}
