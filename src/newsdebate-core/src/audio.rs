//! Playback of synthesized speech.
//!
//! Speech arrives as base64-encoded MP3. [`AudioPlayer`] decodes it, hands
//! it to an [`AudioOutput`], reports progress as a percentage while it plays
//! and can fade out everything that is currently playing.

use base64::{Engine, engine::general_purpose};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::AudioError;

/// Step used for progress polling and volume ramps (about one display frame).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// A single clip being played by an [`AudioOutput`].
pub trait Playback: Send + Sync {
    /// Total length of the clip.
    fn duration(&self) -> Duration;
    /// Current playback position.
    fn position(&self) -> Duration;
    /// True once the clip has played to its end.
    fn is_finished(&self) -> bool;
    /// Error reported by the output device, if any.
    fn failure(&self) -> Option<String>;
    fn volume(&self) -> f32;
    fn set_volume(&self, volume: f32);
    /// Pause and rewind to the start.
    fn halt(&self);
    fn is_halted(&self) -> bool;
}

/// Something that can turn encoded audio into a running [`Playback`].
pub trait AudioOutput: Send + Sync {
    /// Decode `bytes` and start playing them immediately.
    fn open(&self, bytes: Vec<u8>) -> Result<Arc<dyn Playback>, AudioError>;
}

/// Decode a base64 payload, rejecting empty or malformed input.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, AudioError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(AudioError::InvalidAudioData("audio payload is empty".to_string()));
    }

    let bytes = general_purpose::STANDARD
        .decode(trimmed)
        .map_err(|e| AudioError::InvalidAudioData(format!("payload is not base64: {}", e)))?;

    if bytes.is_empty() {
        return Err(AudioError::InvalidAudioData("audio payload is empty".to_string()));
    }
    Ok(bytes)
}

/// Work out the playing time of an MP3 clip without decoding samples.
pub fn probe_duration(bytes: &[u8]) -> Result<Duration, AudioError> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::InvalidAudioData(format!("unrecognised audio: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AudioError::InvalidAudioData("no audio track".to_string()))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::InvalidAudioData("unknown sample rate".to_string()))?;

    let frames = match track.codec_params.n_frames {
        Some(frames) => frames,
        None => {
            // No length header: add up packet durations until the stream ends.
            let mut total = 0u64;
            while let Ok(packet) = format.next_packet() {
                if packet.track_id() == track_id {
                    total += packet.dur();
                }
            }
            total
        }
    };

    if frames == 0 || sample_rate == 0 {
        return Err(AudioError::InvalidAudioData("clip contains no audio frames".to_string()));
    }

    Ok(Duration::from_secs_f64(frames as f64 / sample_rate as f64))
}

/// Playback percentage in `0.0..=100.0`.
pub fn progress_percent(position: Duration, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 100.0;
    }
    (position.as_secs_f64() / duration.as_secs_f64() * 100.0).clamp(0.0, 100.0)
}

/// A clip that "plays" against the clock without producing sound.
pub struct ClockPlayback {
    duration: Duration,
    started: Instant,
    volume: AtomicU32,
    halted: AtomicBool,
}

impl ClockPlayback {
    /// Start a clip of the given length now.
    pub fn start(duration: Duration) -> Self {
        Self {
            duration,
            started: Instant::now(),
            volume: AtomicU32::new(1.0f32.to_bits()),
            halted: AtomicBool::new(false),
        }
    }
}

impl Playback for ClockPlayback {
    fn duration(&self) -> Duration {
        self.duration
    }

    fn position(&self) -> Duration {
        if self.is_halted() {
            return Duration::ZERO;
        }
        self.started.elapsed().min(self.duration)
    }

    fn is_finished(&self) -> bool {
        !self.is_halted() && self.started.elapsed() >= self.duration
    }

    fn failure(&self) -> Option<String> {
        None
    }

    fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::SeqCst))
    }

    fn set_volume(&self, volume: f32) {
        self.volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}

/// Output for machines without a sound device: validates the MP3 and plays
/// it in real time against the clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessOutput;

impl AudioOutput for HeadlessOutput {
    fn open(&self, bytes: Vec<u8>) -> Result<Arc<dyn Playback>, AudioError> {
        let duration = probe_duration(&bytes)?;
        Ok(Arc::new(ClockPlayback::start(duration)))
    }
}

type Registry = Arc<Mutex<HashMap<u64, Arc<dyn Playback>>>>;

fn lock_registry(registry: &Registry) -> MutexGuard<'_, HashMap<u64, Arc<dyn Playback>>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Plays base64 MP3 clips and keeps track of the ones still running.
pub struct AudioPlayer {
    output: Arc<dyn AudioOutput>,
    active: Registry,
    next_id: AtomicU64,
}

impl AudioPlayer {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            active: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Player backed by [`HeadlessOutput`].
    pub fn headless() -> Self {
        Self::new(Arc::new(HeadlessOutput))
    }

    /// Decode and start a clip, returning a ticket to wait on.
    ///
    /// This is the synchronous half of [`AudioPlayer::play`]; once it
    /// returns the clip is registered and will be reached by `stop_all`.
    pub fn start(&self, base64_audio: &str) -> Result<PlaybackTicket, AudioError> {
        let bytes = decode_base64(base64_audio)?;
        let playback = self.output.open(bytes)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock_registry(&self.active).insert(id, playback.clone());

        Ok(PlaybackTicket {
            id,
            playback,
            registry: self.active.clone(),
        })
    }

    /// Play a clip to the end, reporting progress percentages along the way.
    pub async fn play<F>(&self, base64_audio: &str, on_progress: F) -> Result<(), AudioError>
    where
        F: FnMut(f64),
    {
        self.start(base64_audio)?.wait(on_progress).await
    }

    /// Fade every active clip to silence over `fade`, then halt it.
    pub async fn stop_all(&self, fade: Duration) {
        let targets: Vec<Arc<dyn Playback>> = lock_registry(&self.active).values().cloned().collect();
        if targets.is_empty() {
            return;
        }

        tracing::debug!(count = targets.len(), fade_ms = fade.as_millis() as u64, "fading out audio");
        let mut fades = JoinSet::new();
        for playback in targets {
            fades.spawn(fade_out(playback, fade));
        }
        while fades.join_next().await.is_some() {}
    }

    /// Number of clips currently registered.
    pub fn active_count(&self) -> usize {
        lock_registry(&self.active).len()
    }
}

async fn fade_out(playback: Arc<dyn Playback>, fade: Duration) {
    let initial = playback.volume();
    if !fade.is_zero() && initial > 0.0 {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(FRAME_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let t = started.elapsed().as_secs_f32() / fade.as_secs_f32();
            if t >= 1.0 {
                break;
            }
            playback.set_volume(initial * (1.0 - t));
        }
    }
    playback.set_volume(0.0);
    playback.halt();
}

/// A registered clip. Dropping the ticket halts and unregisters the clip.
pub struct PlaybackTicket {
    id: u64,
    playback: Arc<dyn Playback>,
    registry: Registry,
}

impl PlaybackTicket {
    /// Length of the clip.
    pub fn duration(&self) -> Duration {
        self.playback.duration()
    }

    /// Wait for the clip to end.
    ///
    /// Calls `on_progress` every frame and once with `100.0` right before a
    /// natural end. Returns [`AudioError::Interrupted`] if the clip was
    /// halted by [`AudioPlayer::stop_all`].
    pub async fn wait<F>(self, mut on_progress: F) -> Result<(), AudioError>
    where
        F: FnMut(f64),
    {
        let mut ticker = tokio::time::interval(FRAME_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Some(reason) = self.playback.failure() {
                return Err(AudioError::PlaybackError(reason));
            }
            if self.playback.is_halted() {
                return Err(AudioError::Interrupted);
            }
            if self.playback.is_finished() {
                on_progress(100.0);
                return Ok(());
            }
            on_progress(progress_percent(
                self.playback.position(),
                self.playback.duration(),
            ));
        }
    }
}

impl Drop for PlaybackTicket {
    fn drop(&mut self) {
        lock_registry(&self.registry).remove(&self.id);
        if !self.playback.is_finished() && !self.playback.is_halted() {
            self.playback.halt();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ten MPEG-1 Layer III frames, 128 kbps, 44.1 kHz, silent payload.
    fn silent_mp3(frames: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for _ in 0..frames {
            let mut frame = vec![0u8; 417];
            frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
            bytes.extend(frame);
        }
        bytes
    }

    #[test]
    fn test_decode_base64_rejects_empty() {
        assert!(matches!(
            decode_base64(""),
            Err(AudioError::InvalidAudioData(_))
        ));
        assert!(matches!(
            decode_base64("   "),
            Err(AudioError::InvalidAudioData(_))
        ));
    }

    #[test]
    fn test_decode_base64_rejects_garbage() {
        assert!(matches!(
            decode_base64("not base64 at all!"),
            Err(AudioError::InvalidAudioData(_))
        ));
    }

    #[test]
    fn test_decode_base64_accepts_padding_and_whitespace() {
        assert_eq!(decode_base64(" aGVsbG8= \n").unwrap(), b"hello");
    }

    #[test]
    fn test_probe_duration_rejects_non_audio() {
        let err = probe_duration(b"this is plainly not an mp3 file").unwrap_err();
        assert!(matches!(err, AudioError::InvalidAudioData(_)));
    }

    #[test]
    fn test_probe_duration_counts_mp3_frames() {
        let duration = probe_duration(&silent_mp3(10)).unwrap();
        // 10 frames * 1152 samples / 44100 Hz
        assert!(duration > Duration::from_millis(200), "{:?}", duration);
        assert!(duration < Duration::from_millis(300), "{:?}", duration);
    }

    #[test]
    fn test_progress_percent_bounds() {
        assert_eq!(progress_percent(Duration::ZERO, Duration::ZERO), 100.0);
        assert_eq!(
            progress_percent(Duration::from_millis(250), Duration::from_secs(1)),
            25.0
        );
        assert_eq!(
            progress_percent(Duration::from_secs(3), Duration::from_secs(1)),
            100.0
        );
    }

    #[test]
    fn test_clock_playback_volume_is_clamped() {
        let playback = ClockPlayback::start(Duration::from_secs(1));
        playback.set_volume(1.5);
        assert_eq!(playback.volume(), 1.0);
        playback.set_volume(-0.5);
        assert_eq!(playback.volume(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_halted_clip_is_rewound_and_never_finishes() {
        let playback = ClockPlayback::start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(50)).await;
        playback.halt();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(playback.position(), Duration::ZERO);
        assert!(!playback.is_finished());
    }
}
