//! Speech synthesis through the ElevenLabs text-to-speech API.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose};
use serde::Serialize;
use std::time::Duration;

use crate::config::ElevenLabsConfig;
use crate::error::{DebateError, SpeechError};

/// Turns an utterance into base64-encoded audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<String, SpeechError>;
}

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

/// ElevenLabs client returning MP3 audio as base64.
pub struct ElevenLabsClient {
    http: reqwest::Client,
    config: ElevenLabsConfig,
    api_key: Option<String>,
}

impl ElevenLabsClient {
    /// Create a client. A missing key is only reported when synthesis is
    /// attempted, so a server can still start and answer other routes.
    pub fn new(config: ElevenLabsConfig, api_key: Option<String>) -> Result<Self, DebateError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<String, SpeechError> {
        let api_key = self.api_key.as_deref().ok_or(SpeechError::MissingApiKey)?;

        let url = format!(
            "{}/text-to-speech/{}",
            self.config.base_url.trim_end_matches('/'),
            voice_id
        );
        let body = SynthesisRequest {
            text,
            model_id: &self.config.model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
            },
        };

        tracing::debug!(voice_id, chars = text.len(), "requesting speech synthesis");
        let response = self
            .http
            .post(&url)
            .header("Accept", "audio/mpeg")
            .header("xi-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), %body, "ElevenLabs API error");
            return Err(match status.as_u16() {
                401 => SpeechError::Unauthorized { body },
                429 => SpeechError::RateLimited { body },
                code => SpeechError::Upstream { status: code, body },
            });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(SpeechError::EmptyAudio);
        }
        tracing::debug!(bytes = audio.len(), "received synthesized audio");

        Ok(general_purpose::STANDARD.encode(&audio))
    }
}
