//! Sound-card output using rodio. Enabled with the `speaker` feature.

use rodio::{Decoder, Sink, Source};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;

use crate::audio::{AudioOutput, Playback, probe_duration};
use crate::error::AudioError;

/// Plays clips on the default output device.
pub struct SpeakerOutput {
    mixer: rodio::mixer::Mixer,
}

impl SpeakerOutput {
    /// Open the default output device.
    ///
    /// The device stream lives on its own parked thread for the rest of the
    /// process, since it cannot be moved between threads on every platform.
    pub fn open_default() -> Result<Self, AudioError> {
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("newsdebate-audio".to_string())
            .spawn(move || match rodio::OutputStreamBuilder::open_default_stream() {
                Ok(stream) => {
                    if tx.send(Ok(stream.mixer().clone())).is_ok() {
                        loop {
                            std::thread::park();
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| AudioError::PlaybackError(format!("failed to start audio thread: {}", e)))?;

        let mixer = rx
            .recv()
            .map_err(|_| AudioError::PlaybackError("audio thread exited".to_string()))?
            .map_err(AudioError::PlaybackError)?;

        Ok(Self { mixer })
    }
}

impl AudioOutput for SpeakerOutput {
    fn open(&self, bytes: Vec<u8>) -> Result<Arc<dyn Playback>, AudioError> {
        let fallback = probe_duration(&bytes).ok();
        let source = Decoder::new(Cursor::new(bytes))
            .map_err(|e| AudioError::InvalidAudioData(e.to_string()))?;
        let duration = source
            .total_duration()
            .or(fallback)
            .ok_or_else(|| AudioError::InvalidAudioData("unknown clip length".to_string()))?;

        let sink = Sink::connect_new(&self.mixer);
        sink.append(source);

        Ok(Arc::new(SpeakerPlayback {
            sink,
            duration,
            halted: AtomicBool::new(false),
        }))
    }
}

struct SpeakerPlayback {
    sink: Sink,
    duration: Duration,
    halted: AtomicBool,
}

impl Playback for SpeakerPlayback {
    fn duration(&self) -> Duration {
        self.duration
    }

    fn position(&self) -> Duration {
        self.sink.get_pos().min(self.duration)
    }

    fn is_finished(&self) -> bool {
        !self.is_halted() && self.sink.empty()
    }

    fn failure(&self) -> Option<String> {
        None
    }

    fn volume(&self) -> f32 {
        self.sink.volume()
    }

    fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume.clamp(0.0, 1.0));
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        self.sink.pause();
        let _ = self.sink.try_seek(Duration::ZERO);
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}
