//! LLM-backed text generation: debate turns, character pairs and topics.
//!
//! Everything goes through an OpenAI-compatible chat completions endpoint.
//! The traits exist so the orchestrator and the HTTP layer can be driven by
//! scripted generators in tests.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::character::{Character, Slot, Stance, validate_cast};
use crate::config::{Config, Secrets};
use crate::error::DebateError;
use crate::orchestrator::DebateMessage;

/// Persona details sent along with a turn request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CharacterInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl From<&Character> for CharacterInfo {
    fn from(character: &Character) -> Self {
        Self {
            name: character.name.clone(),
            background: character.background.clone(),
            personality: character.personality.clone(),
            occupation: character.occupation.clone(),
            system_prompt: character.system_prompt.clone(),
        }
    }
}

/// Everything needed to produce the next utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub topic: String,
    #[serde(default)]
    pub messages: Vec<DebateMessage>,
    /// Slot of the character about to speak.
    pub character: Slot,
    #[serde(default)]
    pub stance: Option<Stance>,
    #[serde(default)]
    pub character_info: Option<CharacterInfo>,
    #[serde(default)]
    pub last_opponent_message: Option<String>,
}

impl TurnRequest {
    /// Stance to argue, defaulting to the one implied by the slot.
    pub fn stance(&self) -> Stance {
        self.stance.unwrap_or_else(|| self.character.stance())
    }
}

/// Produces the text of a debate turn.
#[async_trait]
pub trait DialogueGenerator: Send + Sync {
    async fn generate_turn(&self, request: &TurnRequest) -> Result<String, DebateError>;
}

/// Produces a contrasting pair of characters for a topic.
#[async_trait]
pub trait CharacterGenerator: Send + Sync {
    async fn generate_characters(&self, topic: &str) -> Result<Vec<Character>, DebateError>;
}

/// Produces a fresh debate topic.
#[async_trait]
pub trait TopicGenerator: Send + Sync {
    async fn generate_topic(&self) -> Result<String, DebateError>;
}

/// Plain-text form of the chat messages for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnPrompt {
    pub system: String,
    pub history: Vec<String>,
    pub user: String,
}

/// Build the prompt for a turn.
pub fn turn_prompt(config: &Config, request: &TurnRequest) -> TurnPrompt {
    let stance = request.stance();
    let persona_prompt = request
        .character_info
        .as_ref()
        .and_then(|info| info.system_prompt.as_deref());

    let system = match persona_prompt {
        Some(prompt) => format!("{}\n\nCurrent topic: {}", prompt, request.topic),
        None => config.get_prompt(stance, request.character, &request.topic),
    };

    let history = request
        .messages
        .iter()
        .map(|m| format!("Character {}: {}", m.character.number(), m.text))
        .collect();

    let user = match request
        .last_opponent_message
        .as_deref()
        .filter(|line| !line.trim().is_empty())
    {
        Some(line) => format!(
            "Respond to this point from your opponent: \"{}\". Remember to maintain your {} stance on the topic.",
            line,
            stance.display_name()
        ),
        None => format!(
            "Start the debate by presenting your {} perspective on the topic: {}",
            stance.display_name(),
            request.topic
        ),
    };

    TurnPrompt {
        system,
        history,
        user,
    }
}

/// Chat-completions backed implementation of every generator trait.
pub struct OpenAiChat {
    client: Client<OpenAIConfig>,
    config: Config,
    has_key: bool,
}

impl OpenAiChat {
    pub fn new(config: &Config, secrets: &Secrets) -> Result<Self, DebateError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.openai.timeout_secs))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DebateError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let api_base = secrets
            .openai_api_base
            .clone()
            .unwrap_or_else(|| config.openai.api_base.clone());
        let openai_config = OpenAIConfig::new()
            .with_api_key(secrets.openai_api_key.clone().unwrap_or_default())
            .with_api_base(api_base);

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
            config: config.clone(),
            has_key: secrets.openai_api_key.is_some(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn has_api_key(&self) -> bool {
        self.has_key
    }

    /// Run one chat completion and return the first choice's text.
    pub(crate) async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        temperature: f32,
    ) -> Result<String, DebateError> {
        if !self.has_key {
            return Err(DebateError::ConfigError(
                "OpenAI API key not configured".to_string(),
            ));
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.config.openai.model)
            .temperature(temperature)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(DebateError::Generation("No response received".to_string()));
        }
        Ok(content)
    }
}

pub(crate) fn system_message(content: impl Into<String>) -> ChatCompletionRequestMessage {
    let content: String = content.into();
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: content.into(),
        name: None,
    })
}

pub(crate) fn user_message(content: impl Into<String>) -> ChatCompletionRequestMessage {
    let content: String = content.into();
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: content.into(),
        name: None,
    })
}

fn assistant_message(content: String) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
        content: Some(content.into()),
        name: None,
        tool_calls: None,
        refusal: None,
        audio: None,
        function_call: None,
    })
}

#[async_trait]
impl DialogueGenerator for OpenAiChat {
    async fn generate_turn(&self, request: &TurnRequest) -> Result<String, DebateError> {
        let prompt = turn_prompt(&self.config, request);

        let mut messages = vec![system_message(prompt.system)];
        messages.extend(prompt.history.into_iter().map(assistant_message));
        messages.push(user_message(prompt.user));

        let raw = self
            .complete(messages, self.config.openai.dialogue_temperature)
            .await?;
        let text = sanitize_response(&raw);
        if text.is_empty() {
            return Err(DebateError::Generation("No response received".to_string()));
        }

        tracing::debug!(slot = request.character.number(), chars = text.len(), "generated turn");
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedCast {
    characters: Vec<Character>,
}

/// Parse an LLM character-generation reply and assign configured voices.
pub fn parse_generated_cast(content: &str, config: &Config) -> Result<Vec<Character>, DebateError> {
    let cast: GeneratedCast = serde_json::from_str(extract_json(content))?;
    let mut characters = cast.characters;
    validate_cast(&characters)?;

    for character in &mut characters {
        character.voice_id = config.voices.for_slot(character.slot).to_string();
    }
    characters.sort_by_key(|c| c.slot.number());
    Ok(characters)
}

#[async_trait]
impl CharacterGenerator for OpenAiChat {
    async fn generate_characters(&self, topic: &str) -> Result<Vec<Character>, DebateError> {
        let messages = vec![
            system_message(CHARACTER_GENERATION_PROMPT),
            user_message(format!(
                "Generate two contrasting characters who would have an interesting debate about: {}",
                topic
            )),
        ];

        let content = self
            .complete(messages, self.config.openai.dialogue_temperature)
            .await?;
        let characters = parse_generated_cast(&content, &self.config)?;
        tracing::info!(
            first = %characters[0].name,
            second = %characters[1].name,
            "generated debate characters"
        );
        Ok(characters)
    }
}

/// Remove quote characters from a generated topic.
pub fn clean_topic(raw: &str) -> String {
    raw.replace(['"', '\''], "").trim().to_string()
}

#[async_trait]
impl TopicGenerator for OpenAiChat {
    async fn generate_topic(&self) -> Result<String, DebateError> {
        let messages = vec![
            system_message(TOPIC_GENERATION_PROMPT),
            user_message("Generate a funny debate topic."),
        ];

        let content = self
            .complete(messages, self.config.openai.topic_temperature)
            .await?;
        let topic = clean_topic(&content);
        if topic.is_empty() {
            return Err(DebateError::Generation("Failed to generate topic".to_string()));
        }
        tracing::info!(%topic, "generated topic");
        Ok(topic)
    }
}

/// Slice out the JSON object from a reply that may be wrapped in a code fence.
pub(crate) fn extract_json(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => content.trim(),
    }
}

/// Sanitize AI response by stripping reasoning tokens and XML-like tags.
///
/// Removes patterns like <thinking>...</thinking>, <reflection>...</reflection>, etc.
pub fn sanitize_response(response: &str) -> String {
    let tags_to_strip = [
        "thinking",
        "think",
        "reflection",
        "reflect",
        "internal",
        "reasoning",
        "thought",
        "scratchpad",
        "analysis",
    ];

    let mut result = response.to_string();

    for tag in &tags_to_strip {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    // Orphaned opening/closing tags
    if let Ok(orphan_re) = regex::Regex::new(r"</?[\w]+[^>]*>") {
        result = orphan_re.replace_all(&result, "").to_string();
    }

    result = result.replace('*', "");

    if let Ok(ws_re) = regex::Regex::new(r"\s+") {
        result = ws_re.replace_all(&result, " ").to_string();
    }

    result.trim().to_string()
}

const CHARACTER_GENERATION_PROMPT: &str = r#"You are a character generator for a debate application. Create two contrasting characters who would have opposing views on the given topic.
Return the response in this exact JSON format:
{
  "characters": [
    {
      "name": "Full Name",
      "age": number between 25-75,
      "location": "City, Country",
      "occupation": "Professional title",
      "background": "2-3 sentences about their relevant experience and education",
      "personality": "2-3 sentences about their character traits and debate style",
      "character_number": 1,
      "avatar_url": "https://avatars.dicebear.com/api/personas/" + encoded full name + ".svg"
    },
    {
      "name": "Full Name",
      "age": number between 25-75,
      "location": "City, Country",
      "occupation": "Professional title",
      "background": "2-3 sentences about their relevant experience and education",
      "personality": "2-3 sentences about their character traits and debate style",
      "character_number": 2,
      "avatar_url": "https://avatars.dicebear.com/api/personas/" + encoded full name + ".svg"
    }
  ]
}"#;

const TOPIC_GENERATION_PROMPT: &str = "You are a witty debate topic generator. Generate ONE humorous, lighthearted, and slightly absurd debate topic that would be entertaining to discuss. The topic should be fun but still debatable from different perspectives. Keep it family-friendly and avoid controversial subjects. DO NOT use quotation marks in your response.";
