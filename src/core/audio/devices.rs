//! Capture and playback device abstractions.
//!
//! A `CaptureDevice` yields a continuous stream of fixed-size blocks once it
//! has been granted access. A `PlaybackSink` only understands "play this
//! buffer starting at this time" and "stop that buffer"; it reports natural
//! completion through the `EndedNotifier` carried by each request.
//!
//! The WAV implementations let the whole pipeline run headless: a WAV file
//! stands in for the microphone and the assistant's speech is rendered onto a
//! timeline that can be written back out as WAV.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::scheduler::PlaybackId;
use super::{AudioChunk, AudioError, AudioResult, Clock, PCM16_SCALE};

/// Capacity of the capture block channel.
const CAPTURE_CHANNEL_CAPACITY: usize = 32;

// =============================================================================
// Traits
// =============================================================================

/// Microphone-like audio source.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Request access and start capturing mono blocks of `block_size`
    /// samples at `sample_rate`.
    ///
    /// Fails with [`AudioError::PermissionDenied`] when access is refused.
    async fn open(
        &mut self,
        block_size: usize,
        sample_rate: u32,
    ) -> AudioResult<mpsc::Receiver<AudioChunk>>;

    /// Stop all tracks. Safe to call more than once.
    fn stop(&mut self);
}

/// Reports that a scheduled buffer finished playing on its own.
#[derive(Debug)]
pub struct EndedNotifier {
    id: PlaybackId,
    tx: mpsc::UnboundedSender<PlaybackId>,
}

impl EndedNotifier {
    pub(crate) fn new(id: PlaybackId, tx: mpsc::UnboundedSender<PlaybackId>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> PlaybackId {
        self.id
    }

    /// Signal natural completion. Consumes the notifier so a buffer can end
    /// at most once.
    pub fn notify(self) {
        // Receiver is gone once the call has been torn down
        let _ = self.tx.send(self.id);
    }
}

/// A buffer handed to the sink for playback.
#[derive(Debug)]
pub struct PlaybackRequest {
    pub id: PlaybackId,
    pub chunk: AudioChunk,
    /// Position on the playback clock at which the buffer must start
    pub start_at: Duration,
    pub ended: EndedNotifier,
}

/// Speaker-like audio output.
pub trait PlaybackSink: Send + Sync {
    fn play(&self, request: PlaybackRequest);

    /// Force-stop a buffer. Must not fire its `EndedNotifier` afterwards.
    fn stop(&self, id: PlaybackId);
}

// =============================================================================
// WAV Capture
// =============================================================================

/// Capture device that streams a mono WAV file as if it were a microphone.
#[derive(Debug)]
pub struct WavFileCapture {
    path: PathBuf,
    /// Pace blocks at the capture rate instead of sending them as fast as possible
    realtime: bool,
    /// Keep the "microphone" open with silence once the file is exhausted
    trailing_silence: bool,
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
}

impl WavFileCapture {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            realtime: true,
            trailing_silence: true,
            token: None,
            handle: None,
        }
    }

    /// Disable pacing. Trailing silence is only emitted when paced.
    pub fn unpaced(mut self) -> Self {
        self.realtime = false;
        self.trailing_silence = false;
        self
    }

    pub fn with_trailing_silence(mut self, enabled: bool) -> Self {
        self.trailing_silence = enabled && self.realtime;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.token.is_some()
    }
}

#[async_trait]
impl CaptureDevice for WavFileCapture {
    async fn open(
        &mut self,
        block_size: usize,
        sample_rate: u32,
    ) -> AudioResult<mpsc::Receiver<AudioChunk>> {
        if self.is_open() {
            return Err(AudioError::Device("capture already open".to_string()));
        }
        if block_size == 0 {
            return Err(AudioError::Device("block size must be positive".to_string()));
        }

        let path = self.path.clone();
        let samples = tokio::task::spawn_blocking(move || read_wav_mono(&path, sample_rate))
            .await
            .map_err(|e| AudioError::Device(format!("capture reader panicked: {}", e)))??;

        tracing::info!(
            "Opened WAV capture {:?}: {} samples at {}Hz",
            self.path,
            samples.len(),
            sample_rate
        );

        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        let token = CancellationToken::new();
        let task_token = token.clone();
        let realtime = self.realtime;
        let trailing_silence = self.trailing_silence;
        let block_duration =
            Duration::from_nanos(block_size as u64 * 1_000_000_000 / sample_rate.max(1) as u64);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(block_duration);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            let blocks = samples.chunks(block_size).map(|block| {
                let mut block = block.to_vec();
                block.resize(block_size, 0.0);
                block
            });
            let silence = std::iter::repeat_with(|| vec![0.0f32; block_size])
                .take_while(|_| trailing_silence);

            for block in blocks.chain(silence) {
                if realtime {
                    tokio::select! {
                        biased;
                        _ = task_token.cancelled() => break,
                        _ = interval.tick() => {}
                    }
                } else if task_token.is_cancelled() {
                    break;
                }

                if tx.send(AudioChunk::mono(block, sample_rate)).await.is_err() {
                    break;
                }
            }
            tracing::debug!("WAV capture task ended");
        });

        self.token = Some(token);
        self.handle = Some(handle);
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
            tracing::debug!("WAV capture stopped");
        }
        self.handle.take();
    }
}

impl Drop for WavFileCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read a mono WAV file into normalized samples.
fn read_wav_mono(path: &Path, expected_rate: u32) -> AudioResult<Vec<f32>> {
    let reader = hound::WavReader::open(path).map_err(|e| match e {
        hound::Error::IoError(io) if io.kind() == std::io::ErrorKind::PermissionDenied => {
            AudioError::PermissionDenied(format!("{}: {}", path.display(), io))
        }
        other => AudioError::Wav(other),
    })?;

    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(AudioError::UnsupportedFormat(format!(
            "expected mono input, got {} channels",
            spec.channels
        )));
    }
    if spec.sample_rate != expected_rate {
        return Err(AudioError::UnsupportedFormat(format!(
            "expected {}Hz input, got {}Hz",
            expected_rate, spec.sample_rate
        )));
    }

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(samples)
}

// =============================================================================
// WAV Playback
// =============================================================================

struct Voice {
    start_frame: usize,
    samples: Vec<f32>,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Timeline {
    samples: Vec<f32>,
    voices: HashMap<PlaybackId, Voice>,
}

/// Playback sink that renders scheduled buffers onto a mono timeline.
///
/// Natural completion is signalled by a tokio timer at the buffer's end
/// time, so the sink must be driven from inside a runtime.
pub struct WavPlaybackSink {
    clock: Arc<dyn Clock>,
    sample_rate: u32,
    timeline: Arc<Mutex<Timeline>>,
}

impl WavPlaybackSink {
    pub fn new(clock: Arc<dyn Clock>, sample_rate: u32) -> Self {
        Self {
            clock,
            sample_rate,
            timeline: Arc::new(Mutex::new(Timeline::default())),
        }
    }

    fn frame_at(&self, time: Duration) -> usize {
        (time.as_nanos() * self.sample_rate as u128 / 1_000_000_000) as usize
    }

    /// Rendered samples so far.
    pub fn samples(&self) -> Vec<f32> {
        self.timeline.lock().samples.clone()
    }

    /// Number of buffers still scheduled or playing.
    pub fn active_voices(&self) -> usize {
        self.timeline.lock().voices.len()
    }

    pub fn rendered_duration(&self) -> Duration {
        let frames = self.timeline.lock().samples.len() as u64;
        Duration::from_nanos(frames * 1_000_000_000 / self.sample_rate.max(1) as u64)
    }

    /// Write the rendered timeline as 16-bit mono PCM.
    pub fn write_wav(&self, path: &Path) -> AudioResult<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let samples = self.samples();
        let mut writer = hound::WavWriter::create(path, spec)?;
        for sample in samples {
            writer.write_sample((sample * PCM16_SCALE) as i16)?;
        }
        writer.finalize()?;
        tracing::info!("Wrote playback render to {:?}", path);
        Ok(())
    }
}

impl PlaybackSink for WavPlaybackSink {
    fn play(&self, request: PlaybackRequest) {
        let PlaybackRequest {
            id,
            chunk,
            start_at,
            ended,
        } = request;

        if chunk.sample_rate != self.sample_rate || chunk.channels != 1 {
            tracing::warn!(
                "Rendering {} ({}Hz, {}ch) onto a {}Hz mono timeline",
                id,
                chunk.sample_rate,
                chunk.channels,
                self.sample_rate
            );
        }

        let end = start_at + chunk.duration();
        let start_frame = self.frame_at(start_at);
        let mut timeline = self.timeline.lock();

        let needed = start_frame + chunk.samples.len();
        if timeline.samples.len() < needed {
            timeline.samples.resize(needed, 0.0);
        }
        for (offset, sample) in chunk.samples.iter().enumerate() {
            timeline.samples[start_frame + offset] += *sample;
        }

        let timer = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let clock = self.clock.clone();
                let shared = self.timeline.clone();
                Some(runtime.spawn(async move {
                    let now = clock.now();
                    if end > now {
                        tokio::time::sleep(end - now).await;
                    }
                    if shared.lock().voices.remove(&id).is_some() {
                        ended.notify();
                    }
                }))
            }
            Err(_) => {
                tracing::warn!("No runtime for playback timer, ending {} immediately", id);
                ended.notify();
                None
            }
        };

        if timer.is_some() {
            timeline.voices.insert(
                id,
                Voice {
                    start_frame,
                    samples: chunk.samples,
                    timer,
                },
            );
        }
    }

    fn stop(&self, id: PlaybackId) {
        let cut_frame = self.frame_at(self.clock.now());
        let mut timeline = self.timeline.lock();
        let Some(voice) = timeline.voices.remove(&id) else {
            return;
        };
        if let Some(timer) = voice.timer {
            timer.abort();
        }

        // Remove the part of this buffer that had not been heard yet
        let first = cut_frame.max(voice.start_frame);
        for frame in first..voice.start_frame + voice.samples.len() {
            let offset = frame - voice.start_frame;
            if let Some(slot) = timeline.samples.get_mut(frame) {
                *slot -= voice.samples[offset];
            }
        }
        tracing::trace!("Stopped {} at frame {}", id, cut_frame);
    }
}
