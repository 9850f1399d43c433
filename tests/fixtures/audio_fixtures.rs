//! Audio Test Fixtures
//!
//! Programmatically generated audio, so tests have no external file
//! dependencies and exact control over sample counts.
//!
//! Audio formats:
//! - Capture: 16kHz mono
//! - Playback: 24kHz mono

use std::f32::consts::PI;
use std::path::{Path, PathBuf};

/// Microphone sample rate
pub const SAMPLE_RATE: u32 = 16000;

/// Duration constants (in samples at 16kHz)
pub const MS_100: usize = 1600;
pub const MS_500: usize = 8000;
pub const SECOND: usize = 16000;

/// Generate silence (zeros)
pub fn generate_silence(duration_samples: usize) -> Vec<f32> {
    vec![0.0; duration_samples]
}

/// Generate a sine tone with amplitude in 0.0 - 1.0
pub fn generate_sine_wave(
    duration_samples: usize,
    frequency: f32,
    amplitude: f32,
    sample_rate: u32,
) -> Vec<f32> {
    (0..duration_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * PI * frequency * t).sin() * amplitude
        })
        .collect()
}

/// Generate a 440Hz tone at 16kHz
pub fn generate_a440_tone(duration_samples: usize) -> Vec<f32> {
    generate_sine_wave(duration_samples, 440.0, 0.5, SAMPLE_RATE)
}

/// Root mean square of normalized samples
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Write normalized samples as a 16-bit WAV file
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("Failed to create WAV");
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).expect("Failed to write sample");
    }
    writer.finalize().expect("Failed to finalize WAV");
}

/// Write a 16kHz mono microphone recording into `dir`
pub fn write_mic_recording(dir: &Path, name: &str, samples: &[f32]) -> PathBuf {
    let path = dir.join(name);
    write_wav(&path, samples, SAMPLE_RATE, 1);
    path
}

/// Read a 16-bit WAV file back as normalized samples
pub fn read_wav(path: &Path) -> (hound::WavSpec, Vec<f32>) {
    let mut reader = hound::WavReader::open(path).expect("Failed to open WAV");
    let spec = reader.spec();
    let samples = reader
        .samples::<i16>()
        .map(|s| s.expect("Bad sample") as f32 / 32768.0)
        .collect();
    (spec, samples)
}
