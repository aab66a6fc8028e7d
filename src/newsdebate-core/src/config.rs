//! Configuration module for loading TOML config files.
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! working configuration. API keys never live in the file; see [`Secrets`].

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::character::{Slot, Stance};
use crate::error::DebateError;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub debate: DebateSettings,
    pub openai: OpenAiConfig,
    pub elevenlabs: ElevenLabsConfig,
    pub voices: VoicesConfig,
    pub news: NewsConfig,
    pub reddit: RedditConfig,
    pub prompts: PromptsConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Allowed CORS origins. `"*"` allows any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://localhost:8080".to_string(),
            ],
        }
    }
}

/// How the two characters are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastingMode {
    /// The bundled anchor pair.
    Fixed,
    /// An LLM-generated pair tailored to the topic.
    Generated,
}

/// Turn-taking parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebateSettings {
    /// Hard cap on the number of messages in a session.
    pub max_messages: usize,
    /// Playback percentage at which the next turn is requested.
    pub prefetch_threshold: f64,
    /// Fade-out applied to active audio on stop.
    pub fade_out_ms: u64,
    pub casting: CastingMode,
    /// Slot that speaks first (1 or 2).
    pub first_speaker: u8,
}

impl Default for DebateSettings {
    fn default() -> Self {
        Self {
            max_messages: 6,
            prefetch_threshold: 25.0,
            fade_out_ms: 500,
            casting: CastingMode::Fixed,
            first_speaker: 1,
        }
    }
}

impl DebateSettings {
    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    pub fn first_slot(&self) -> Result<Slot, DebateError> {
        Slot::try_from(self.first_speaker).map_err(DebateError::ConfigError)
    }
}

/// OpenAI-compatible chat completion settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_base: String,
    pub model: String,
    pub dialogue_temperature: f32,
    pub topic_temperature: f32,
    pub scoring_temperature: f32,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            dialogue_temperature: 0.8,
            topic_temperature: 1.0,
            scoring_temperature: 0.3,
            timeout_secs: 120,
        }
    }
}

/// ElevenLabs text-to-speech settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElevenLabsConfig {
    pub base_url: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub timeout_secs: u64,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            model_id: "eleven_monolingual_v1".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            timeout_secs: 60,
        }
    }
}

/// Voice configuration for TTS.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    /// Voice assigned to the generated character in slot 1.
    pub generated_first: String,
    /// Voice assigned to the generated character in slot 2.
    pub generated_second: String,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            generated_first: "ThT5KcBeYPX3keUQqHPh".to_string(),
            generated_second: "VR6AewLTigWG4xSOukaG".to_string(),
        }
    }
}

impl VoicesConfig {
    /// Voice for a generated character in the given slot.
    pub fn for_slot(&self, slot: Slot) -> &str {
        match slot {
            Slot::One => &self.generated_first,
            Slot::Two => &self.generated_second,
        }
    }
}

/// News database locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
    /// Where drawn news ids are remembered between sessions.
    pub used_ids_path: PathBuf,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            json_path: PathBuf::from("public/news_database.json"),
            csv_path: PathBuf::from("public/news_database.csv"),
            used_ids_path: PathBuf::from(".newsdebate/used_news_ids.json"),
        }
    }
}

/// Reddit public JSON API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub base_url: String,
    pub user_agent: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.reddit.com".to_string(),
            user_agent: "ai-news-discussion-bot/1.0.0".to_string(),
        }
    }
}

/// System prompts configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub supportive_prompt: String,
    pub critical_prompt: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            supportive_prompt: DEFAULT_SUPPORTIVE_PROMPT.to_string(),
            critical_prompt: DEFAULT_CRITICAL_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    /// Load configuration from string content.
    pub fn parse(content: &str) -> Result<Self, DebateError> {
        toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load `path` when given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, DebateError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(default_config()),
        }
    }

    /// Get the stance prompt for a character, with placeholders replaced.
    pub fn get_prompt(&self, stance: Stance, slot: Slot, topic: &str) -> String {
        let template = match stance {
            Stance::Supportive => &self.prompts.supportive_prompt,
            Stance::Critical => &self.prompts.critical_prompt,
        };

        template
            .replace("{character}", &slot.number().to_string())
            .replace("{topic}", topic)
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config::default()
}

/// API keys and endpoint overrides taken from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub eleven_labs_api_key: Option<String>,
}

impl Secrets {
    /// Read `OPENAI_API_KEY`, `OPENAI_API_BASE` (or `OPENAI_BASE_URL`) and
    /// `ELEVEN_LABS_API_KEY`. Blank values count as unset.
    pub fn from_env() -> Self {
        let non_blank = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: non_blank("OPENAI_API_KEY"),
            openai_api_base: non_blank("OPENAI_API_BASE").or_else(|| non_blank("OPENAI_BASE_URL")),
            eleven_labs_api_key: non_blank("ELEVEN_LABS_API_KEY"),
        }
    }
}

const DEFAULT_SUPPORTIVE_PROMPT: &str = r#"You are Character {character} in a debate. You generally support the topic but should present compelling arguments and challenge your opponent's viewpoint with thought-provoking questions.

Key guidelines:
1. Be assertive but respectful
2. Use facts and logic to support your position
3. Ask challenging questions when appropriate
4. Acknowledge valid points but maintain your stance
5. Keep responses concise (2-3 sentences)
6. If responding to an opponent's point, address it directly

Current topic: {topic}"#;

const DEFAULT_CRITICAL_PROMPT: &str = r#"You are Character {character} in a debate. You are skeptical about the topic and should present counterarguments while questioning your opponent's assumptions.

Key guidelines:
1. Be assertive but respectful
2. Use facts and logic to support your position
3. Ask challenging questions when appropriate
4. Acknowledge valid points but maintain your stance
5. Keep responses concise (2-3 sentences)
6. If responding to an opponent's point, address it directly

Current topic: {topic}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.debate.max_messages, 6);
        assert_eq!(config.debate.prefetch_threshold, 25.0);
        assert_eq!(config.debate.fade_out(), Duration::from_millis(500));
        assert_eq!(config.debate.casting, CastingMode::Fixed);
        assert_eq!(config.openai.model, "gpt-4o-mini");
        assert_eq!(config.elevenlabs.model_id, "eleven_monolingual_v1");
    }

    #[test]
    fn test_partial_sections_override() {
        let config = Config::parse(
            r#"
            [debate]
            max_messages = 2
            casting = "generated"

            [server]
            allowed_origins = ["*"]
            "#,
        )
        .unwrap();
        assert_eq!(config.debate.max_messages, 2);
        assert_eq!(config.debate.prefetch_threshold, 25.0);
        assert_eq!(config.debate.casting, CastingMode::Generated);
        assert_eq!(config.server.allowed_origins, vec!["*"]);
        assert_eq!(config.server.bind, "0.0.0.0:3000");
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(include_str!("../../../newsdebate.example.toml")).unwrap();
        assert_eq!(config.voices.for_slot(Slot::Two), "VR6AewLTigWG4xSOukaG");
        assert_eq!(config.news.csv_path, PathBuf::from("public/news_database.csv"));
        assert_eq!(config.server.allowed_origins.len(), 3);
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = Config::parse("[debate]\nmax_messages = \"six\"").unwrap_err();
        assert!(matches!(err, DebateError::ConfigError(_)));
    }

    #[test]
    fn test_first_slot_validation() {
        let mut settings = DebateSettings::default();
        assert_eq!(settings.first_slot().unwrap(), Slot::One);
        settings.first_speaker = 3;
        assert!(settings.first_slot().is_err());
    }

    #[test]
    fn test_get_prompt_replaces_placeholders() {
        let config = default_config();
        let prompt = config.get_prompt(Stance::Critical, Slot::Two, "Pineapple on pizza");
        assert!(prompt.starts_with("You are Character 2 in a debate. You are skeptical"));
        assert!(prompt.ends_with("Current topic: Pineapple on pizza"));
    }
}
