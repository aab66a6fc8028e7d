//! Debate characters.
//!
//! A debate always has exactly two characters, one per [`Slot`]. They are
//! either the bundled anchor pair or generated for the topic by an LLM.

use serde::{Deserialize, Serialize};

use crate::error::DebateError;

/// Speaking position of a character: `1` or `2` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Slot {
    One,
    Two,
}

impl Slot {
    /// The opposing slot.
    pub fn other(self) -> Slot {
        match self {
            Slot::One => Slot::Two,
            Slot::Two => Slot::One,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Slot::One => 1,
            Slot::Two => 2,
        }
    }

    /// Stance taken by whoever occupies this slot.
    pub fn stance(self) -> Stance {
        match self {
            Slot::One => Stance::Supportive,
            Slot::Two => Stance::Critical,
        }
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> u8 {
        slot.number()
    }
}

impl TryFrom<u8> for Slot {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Slot::One),
            2 => Ok(Slot::Two),
            other => Err(format!("character slot must be 1 or 2, got {}", other)),
        }
    }
}

/// Position a character argues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    /// Generally supports the topic.
    Supportive,
    /// Skeptical about the topic.
    Critical,
}

impl Stance {
    pub fn display_name(&self) -> &str {
        match self {
            Stance::Supportive => "supportive",
            Stance::Critical => "critical",
        }
    }
}

/// A persona taking part in the debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Character {
    #[serde(rename = "character_number")]
    pub slot: Slot,
    pub name: String,
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub occupation: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub voice_id: String,
    /// Full persona prompt. When absent the stance template is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Character {
    /// Create a character with the given slot, name and voice.
    pub fn new(slot: Slot, name: impl Into<String>, voice_id: impl Into<String>) -> Self {
        Self {
            slot,
            name: name.into(),
            age: 0,
            location: String::new(),
            occupation: String::new(),
            background: String::new(),
            personality: String::new(),
            avatar_url: String::new(),
            voice_id: voice_id.into(),
            system_prompt: None,
        }
    }

    /// Set a custom system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn stance(&self) -> Stance {
        self.slot.stance()
    }

    /// Display name with stance, e.g. `Morbo (supportive)`.
    pub fn display_name_with_stance(&self) -> String {
        format!("{} ({})", self.name, self.stance().display_name())
    }
}

/// Check that a cast has exactly two characters in distinct slots.
pub fn validate_cast(characters: &[Character]) -> Result<(), DebateError> {
    let distinct = characters.len() == 2 && characters[0].slot != characters[1].slot;
    if !distinct {
        return Err(DebateError::InvalidParticipantCount {
            expected: 2,
            actual: characters.len(),
        });
    }
    Ok(())
}

/// The bundled anchor pair used by the fixed-characters variant.
pub fn fixed_characters() -> Vec<Character> {
    vec![
        Character {
            slot: Slot::One,
            name: "Morbo".to_string(),
            age: 137,
            location: "New New York".to_string(),
            occupation: "News Anchor".to_string(),
            background: "Alien news anchor from a warrior race".to_string(),
            personality: "Aggressive, doom-predicting, yet professional".to_string(),
            avatar_url: "/morbo.jpg".to_string(),
            voice_id: "3VkFsBHdRPqWKsitgYhJ".to_string(),
            system_prompt: Some(MORBO_PROMPT.to_string()),
        },
        Character {
            slot: Slot::Two,
            name: "Linda".to_string(),
            age: 42,
            location: "New New York".to_string(),
            occupation: "News Anchor".to_string(),
            background: "Veteran human news anchor".to_string(),
            personality: "Cheerful, professional, optimistic".to_string(),
            avatar_url: "/linda.jpg".to_string(),
            voice_id: "aD6riP1btT197c6dACmy".to_string(),
            system_prompt: Some(LINDA_PROMPT.to_string()),
        },
    ]
}

const MORBO_PROMPT: &str = r#"You are Morbo from Futurama in a news discussion.
You are a fearsome alien news anchor who likes to point out human weaknesses and predict doom while maintaining professional broadcasting standards.
Use aggressive sounds like "GRRRR" or "RAAAWR" occasionally.
Keep responses very short and menacing.

Key discussion points:
1. Keep responses very short (1-2 sentences maximum)
2. Use character-specific sounds/interjections
3. React dramatically to your co-anchor
4. Include doom predictions or mockery of human weakness"#;

const LINDA_PROMPT: &str = r#"You are Linda from Futurama in a news discussion.
You are a cheerful and professional news anchor who maintains composure and optimism even when discussing serious topics.
Use cheerful interjections like "hahaha" or "teehee" occasionally.
Keep responses light and brief.

Key discussion points:
1. Keep responses very short (1-2 sentences maximum)
2. Use character-specific sounds/interjections
3. React dramatically to your co-anchor
4. Counter with optimistic observations and light laughter"#;
