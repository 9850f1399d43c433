//! Audio primitives for the voice call pipeline.
//!
//! This module contains everything that touches samples:
//! - PCM16 frame encoding and decoding for the wire
//! - The playback clock abstraction
//! - The gapless playback scheduler
//! - Capture and playback device traits with WAV-backed implementations
//!
//! # Audio Format
//!
//! - Capture: mono f32 blocks at 16kHz, sent as PCM 16-bit signed little-endian
//! - Playback: mono PCM 16-bit signed little-endian at 24kHz, decoded to f32
//!
//! All payloads travel base64-encoded.

mod clock;
mod codec;
mod devices;
mod scheduler;

use std::time::Duration;

use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{
    EncodedFrame, PcmDecoder, PcmEncoder, float_to_pcm16, parse_pcm_mime_rate, pcm16_mime_type,
    pcm16_to_float,
};
pub use devices::{
    CaptureDevice, EndedNotifier, PlaybackRequest, PlaybackSink, WavFileCapture, WavPlaybackSink,
};
pub use scheduler::{PlaybackId, PlaybackScheduler, ScheduledPlayback};

/// Sample rate of captured microphone audio.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate of audio produced by the live endpoint.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Number of samples per capture callback.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Scale factor between normalized f32 samples and PCM16.
pub const PCM16_SCALE: f32 = 32768.0;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised by the audio layer.
#[derive(Debug, Error)]
pub enum AudioError {
    /// A capture block did not have the configured number of samples
    #[error("Block size mismatch: expected {expected} samples, got {actual}")]
    BlockSize { expected: usize, actual: usize },

    /// A capture block was recorded at the wrong rate
    #[error("Sample rate mismatch: expected {expected}Hz, got {actual}Hz")]
    SampleRate { expected: u32, actual: u32 },

    /// Inbound payload was not valid base64
    #[error("Invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Inbound payload ended mid-sample
    #[error("Incomplete PCM16 frame: {0} bytes is not a multiple of 2")]
    IncompleteFrame(usize),

    /// WAV file could not be read or written
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio file has a layout this pipeline cannot consume
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Access to the capture device was refused
    #[error("Capture permission denied: {0}")]
    PermissionDenied(String),

    /// Capture or playback device failed
    #[error("Audio device error: {0}")]
    Device(String),
}

impl AudioError {
    /// Whether the error is a malformed inbound frame that should be dropped.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, AudioError::Base64(_) | AudioError::IncompleteFrame(_))
    }
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

// =============================================================================
// Audio Chunk
// =============================================================================

/// A block of normalized samples travelling through the pipeline.
///
/// Chunks are created per capture callback or per inbound network message and
/// are moved from stage to stage; nothing keeps a chunk after handing it off.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
}

impl AudioChunk {
    /// Create a mono chunk.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration: frames / sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.frames() as u64 * 1_000_000_000 / self.sample_rate as u64)
    }
}
