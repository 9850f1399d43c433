//! PCM16 frame codec.
//!
//! Outbound: f32 block → i16 (scaled by 32768, truncated) → little-endian
//! bytes → base64, tagged `audio/pcm;rate=<hz>`.
//!
//! Inbound: base64 → little-endian bytes → i16 → f32 (divided by 32768).

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use super::{AudioChunk, AudioError, AudioResult, PCM16_SCALE};

/// A transport-ready audio payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedFrame {
    /// MIME-style format tag, e.g. `audio/pcm;rate=16000`
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64-encoded PCM16 little-endian samples
    pub data: String,
}

/// Build the MIME tag for PCM16 at the given rate.
pub fn pcm16_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Extract the `rate=` parameter from a PCM MIME tag.
///
/// Returns `None` when the tag is not PCM or carries no usable rate.
pub fn parse_pcm_mime_rate(mime_type: &str) -> Option<u32> {
    let mut parts = mime_type.split(';').map(str::trim);
    let essence = parts.next()?;
    if !essence.eq_ignore_ascii_case("audio/pcm") {
        return None;
    }
    parts
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, v)| v.trim().parse::<u32>().ok())
        .filter(|rate| *rate > 0)
}

/// Convert normalized samples to PCM16 little-endian bytes.
///
/// Each sample is multiplied by 32768 and truncated toward zero. Values
/// outside the i16 range saturate (1.0 maps to 32767).
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample * PCM16_SCALE) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert PCM16 little-endian bytes to normalized samples.
pub fn pcm16_to_float(bytes: &[u8]) -> AudioResult<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::IncompleteFrame(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / PCM16_SCALE)
        .collect())
}

// =============================================================================
// Encoder
// =============================================================================

/// Encodes fixed-size capture blocks for transmission.
#[derive(Debug, Clone)]
pub struct PcmEncoder {
    block_size: usize,
    sample_rate: u32,
    mime_type: String,
}

impl PcmEncoder {
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        Self {
            block_size,
            sample_rate,
            mime_type: pcm16_mime_type(sample_rate),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Encode one capture block.
    ///
    /// A block of the wrong size or rate means the capture device is
    /// misconfigured; it is reported rather than silently re-chunked.
    pub fn encode(&self, chunk: &AudioChunk) -> AudioResult<EncodedFrame> {
        if chunk.samples.len() != self.block_size {
            return Err(AudioError::BlockSize {
                expected: self.block_size,
                actual: chunk.samples.len(),
            });
        }
        if chunk.sample_rate != self.sample_rate {
            return Err(AudioError::SampleRate {
                expected: self.sample_rate,
                actual: chunk.sample_rate,
            });
        }

        let pcm = float_to_pcm16(&chunk.samples);
        Ok(EncodedFrame {
            mime_type: self.mime_type.clone(),
            data: BASE64_STANDARD.encode(pcm),
        })
    }
}

// =============================================================================
// Decoder
// =============================================================================

/// Decodes inbound base64 PCM16 payloads into playable chunks.
#[derive(Debug, Clone, Copy)]
pub struct PcmDecoder {
    sample_rate: u32,
    channels: u16,
}

impl PcmDecoder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decode a payload at the decoder's fixed rate.
    pub fn decode(&self, payload: &str) -> AudioResult<AudioChunk> {
        self.decode_at(payload, self.sample_rate)
    }

    /// Decode a payload, honouring the rate declared in its MIME tag.
    pub fn decode_tagged(&self, payload: &str, mime_type: &str) -> AudioResult<AudioChunk> {
        let rate = parse_pcm_mime_rate(mime_type).unwrap_or(self.sample_rate);
        self.decode_at(payload, rate)
    }

    fn decode_at(&self, payload: &str, sample_rate: u32) -> AudioResult<AudioChunk> {
        let bytes = BASE64_STANDARD.decode(payload.trim())?;
        let samples = pcm16_to_float(&bytes)?;
        Ok(AudioChunk {
            samples,
            sample_rate,
            channels: self.channels,
        })
    }
}
