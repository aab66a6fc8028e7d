//! Error types for the debate system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Invalid cast: expected {expected} characters in distinct slots, got {actual}")]
    InvalidParticipantCount { expected: usize, actual: usize },

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Upstream API returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Speech synthesis failed: {0}")]
    Speech(#[from] SpeechError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("No topic selected")]
    EmptyTopic,

    #[error("A debate is already running")]
    AlreadyRunning,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Failures reported by a speech synthesis backend.
///
/// The orchestrator handles every variant the same way (abort the turn), but
/// the HTTP surface maps them to distinct status codes.
#[derive(Error, Debug)]
pub enum SpeechError {
    #[error("ElevenLabs API key not configured")]
    MissingApiKey,

    #[error("Invalid ElevenLabs API key")]
    Unauthorized { body: String },

    #[error("ElevenLabs API rate limit exceeded")]
    RateLimited { body: String },

    #[error("ElevenLabs API error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Received empty audio data from ElevenLabs")]
    EmptyAudio,

    #[error("Request to ElevenLabs failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl SpeechError {
    /// HTTP status that best describes this failure.
    pub fn status(&self) -> u16 {
        match self {
            SpeechError::MissingApiKey => 500,
            SpeechError::Unauthorized { .. } => 401,
            SpeechError::RateLimited { .. } => 429,
            SpeechError::Upstream { status, .. } => *status,
            SpeechError::EmptyAudio => 502,
            SpeechError::Transport(_) => 500,
        }
    }

    /// Upstream response body, when there was one.
    pub fn details(&self) -> Option<&str> {
        match self {
            SpeechError::Unauthorized { body }
            | SpeechError::RateLimited { body }
            | SpeechError::Upstream { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Audio decode and playback failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Invalid audio data: {0}")]
    InvalidAudioData(String),

    #[error("Playback error: {0}")]
    PlaybackError(String),

    /// Playback was halted by `stop_all` before it finished.
    #[error("Playback interrupted")]
    Interrupted,
}
