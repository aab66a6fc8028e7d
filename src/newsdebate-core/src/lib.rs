//! NewsDebate Core Library
//!
//! Provides the debate orchestration logic, the AI and speech providers,
//! audio playback and the news topic sources.

pub mod audio;
pub mod character;
pub mod config;
pub mod dialogue;
pub mod error;
pub mod news;
pub mod news_data;
pub mod orchestrator;
pub mod reddit;
#[cfg(feature = "speaker")]
pub mod speaker;
pub mod speech;
pub mod story_filter;

pub use audio::{AudioOutput, AudioPlayer, HeadlessOutput, PlaybackTicket};
pub use character::{Character, Slot, Stance, fixed_characters};
pub use config::{Config, Secrets, default_config};
pub use dialogue::{CharacterGenerator, DialogueGenerator, OpenAiChat, TopicGenerator, TurnRequest};
pub use error::{AudioError, DebateError, SpeechError};
pub use news::{NewsItem, NewsQueue, UsedIdStore};
pub use orchestrator::{
    Casting, DebateConfig, DebateEvent, DebateMessage, DebateOrchestrator, DebateOutcome,
    DebateSnapshot, PlaybackState,
};
#[cfg(feature = "speaker")]
pub use speaker::SpeakerOutput;
pub use speech::{ElevenLabsClient, SpeechSynthesizer};
pub use story_filter::{FilterOptions, FilteredNewsStory, StoryScorer};
