pub mod assistant;
pub mod audio;
pub mod call;
pub mod persona;
pub mod realtime;

// Re-export commonly used types for convenience
pub use audio::{
    AudioChunk, AudioError, AudioResult, CaptureDevice, Clock, EncodedFrame, PcmDecoder,
    PcmEncoder, PlaybackScheduler, PlaybackSink, SystemClock, WavFileCapture, WavPlaybackSink,
};

pub use call::{CallSettings, CallStatsSnapshot, VoiceCall, format_call_duration};

pub use persona::{Persona, PersonaDirectory};

pub use realtime::{
    CallError, CallResult, GeminiLive, GeminiVoice, LiveEvent, LiveSetup, LiveTransport,
    SessionState, SharedTransport, VoiceProfile,
};

pub use assistant::{
    AssistantCapabilities, AssistantError, GeminiAssistant, MessageKind, Reply, respond,
};
