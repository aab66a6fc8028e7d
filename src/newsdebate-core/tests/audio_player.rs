use base64::{Engine, engine::general_purpose};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, sleep};

use newsdebate_core::audio::{AudioOutput, HeadlessOutput, Playback};
use newsdebate_core::{AudioError, AudioPlayer};

/// Silent MPEG-1 Layer III frames at 128 kbps and 44.1 kHz, 26ms each.
fn silent_mp3_base64(frames: usize) -> String {
    let mut bytes = Vec::new();
    for _ in 0..frames {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x00]);
        bytes.extend(frame);
    }
    general_purpose::STANDARD.encode(bytes)
}

/// Headless output that keeps a handle on every clip it opens.
#[derive(Default)]
struct RecordingOutput {
    clips: Mutex<Vec<Arc<dyn Playback>>>,
}

impl AudioOutput for RecordingOutput {
    fn open(&self, bytes: Vec<u8>) -> Result<Arc<dyn Playback>, AudioError> {
        let clip = HeadlessOutput.open(bytes)?;
        self.clips.lock().unwrap().push(clip.clone());
        Ok(clip)
    }
}

#[tokio::test(start_paused = true)]
async fn test_play_reports_progress_until_done() {
    let player = AudioPlayer::headless();
    let mut reports = Vec::new();
    let started = Instant::now();

    player
        .play(&silent_mp3_base64(40), |p| reports.push(p))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(reports.last().copied(), Some(100.0));
    assert_eq!(reports.iter().filter(|p| **p == 100.0).count(), 1);
    assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(player.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_play_rejects_bad_payloads() {
    let player = AudioPlayer::headless();
    for payload in ["", "   ", "***", "aGVsbG8gd29ybGQ="] {
        let result = player.play(payload, |_| {}).await;
        assert!(
            matches!(result, Err(AudioError::InvalidAudioData(_))),
            "{:?} for {:?}",
            result,
            payload
        );
    }
    assert_eq!(player.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_fades_and_interrupts() {
    let output = Arc::new(RecordingOutput::default());
    let player = Arc::new(AudioPlayer::new(output.clone()));

    let playing = {
        let player = player.clone();
        tokio::spawn(async move { player.play(&silent_mp3_base64(200), |_| {}).await })
    };
    sleep(Duration::from_millis(100)).await;
    assert_eq!(player.active_count(), 1);

    let clip = output.clips.lock().unwrap()[0].clone();
    let fading = {
        let player = player.clone();
        tokio::spawn(async move { player.stop_all(Duration::from_millis(500)).await })
    };

    sleep(Duration::from_millis(250)).await;
    let midway = clip.volume();
    assert!(midway > 0.2 && midway < 0.8, "volume midway through fade: {}", midway);
    assert!(!clip.is_halted());

    fading.await.unwrap();
    assert_eq!(clip.volume(), 0.0);
    assert!(clip.is_halted());
    assert_eq!(clip.position(), Duration::ZERO);

    assert_eq!(playing.await.unwrap(), Err(AudioError::Interrupted));
    assert_eq!(player.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_without_audio_returns_immediately() {
    let player = AudioPlayer::headless();
    let started = Instant::now();
    player.stop_all(Duration::from_millis(500)).await;
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_ticket_halts_clip() {
    let output = Arc::new(RecordingOutput::default());
    let player = AudioPlayer::new(output.clone());

    let ticket = player.start(&silent_mp3_base64(40)).unwrap();
    assert!(ticket.duration() > Duration::from_millis(1000));
    assert_eq!(player.active_count(), 1);

    drop(ticket);
    assert_eq!(player.active_count(), 0);
    assert!(output.clips.lock().unwrap()[0].is_halted());
}

/// A clip that plays for a while and then loses its device.
struct FailingClip {
    inner: Arc<dyn Playback>,
    fails_after: Duration,
}

impl Playback for FailingClip {
    fn duration(&self) -> Duration {
        self.inner.duration()
    }

    fn position(&self) -> Duration {
        self.inner.position()
    }

    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    fn failure(&self) -> Option<String> {
        (self.inner.position() >= self.fails_after).then(|| "device unplugged".to_string())
    }

    fn volume(&self) -> f32 {
        self.inner.volume()
    }

    fn set_volume(&self, volume: f32) {
        self.inner.set_volume(volume)
    }

    fn halt(&self) {
        self.inner.halt()
    }

    fn is_halted(&self) -> bool {
        self.inner.is_halted()
    }
}

struct FailingOutput;

impl AudioOutput for FailingOutput {
    fn open(&self, bytes: Vec<u8>) -> Result<Arc<dyn Playback>, AudioError> {
        Ok(Arc::new(FailingClip {
            inner: HeadlessOutput.open(bytes)?,
            fails_after: Duration::from_millis(300),
        }))
    }
}

#[tokio::test(start_paused = true)]
async fn test_play_surfaces_output_failure() {
    let player = AudioPlayer::new(Arc::new(FailingOutput));
    let mut reports = Vec::new();
    let started = Instant::now();

    let result = player.play(&silent_mp3_base64(40), |p| reports.push(p)).await;

    assert_eq!(
        result,
        Err(AudioError::PlaybackError("device unplugged".to_string()))
    );
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert!(!reports.is_empty());
    assert!(reports.iter().all(|p| *p < 100.0));
    assert_eq!(player.active_count(), 0);
}
