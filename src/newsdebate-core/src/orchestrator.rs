//! Debate orchestration logic.
//!
//! Drives an alternating two-character dialogue. Each turn is generated,
//! synthesized and played; while a turn plays, the next one is generated in
//! the background once playback passes the prefetch threshold. The result is
//! held until the current clip ends, so the transcript always follows
//! playback order.
//!
//! Cancellation works through a session epoch. [`DebateOrchestrator::stop`]
//! bumps it under the state lock, and every continuation point of a running
//! session compares it with the epoch the session started with. Background
//! work is only spawned under that same lock and is aborted by `stop`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};

use crate::audio::AudioPlayer;
use crate::character::{Character, Slot, validate_cast};
use crate::config::DebateSettings;
use crate::dialogue::{CharacterGenerator, CharacterInfo, DialogueGenerator, TurnRequest};
use crate::error::{AudioError, DebateError, SpeechError};
use crate::news::display_topic;
use crate::speech::SpeechSynthesizer;

/// Turn-taking parameters for a session.
#[derive(Debug, Clone)]
pub struct DebateConfig {
    /// Hard cap on messages per session.
    pub max_messages: usize,
    /// Playback percentage at which the next turn is requested.
    pub prefetch_threshold: f64,
    /// Fade applied to active audio by `stop`.
    pub fade_out: Duration,
    pub first_speaker: Slot,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_messages: 6,
            prefetch_threshold: 25.0,
            fade_out: Duration::from_millis(500),
            first_speaker: Slot::One,
        }
    }
}

impl DebateConfig {
    pub fn from_settings(settings: &DebateSettings) -> Result<Self, DebateError> {
        Ok(Self {
            max_messages: settings.max_messages,
            prefetch_threshold: settings.prefetch_threshold,
            fade_out: settings.fade_out(),
            first_speaker: settings.first_slot()?,
        })
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }
}

/// A message in the debate transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateMessage {
    /// Slot of the character who spoke.
    pub character: Slot,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl DebateMessage {
    pub fn new(character: Slot, text: impl Into<String>) -> Self {
        Self {
            character,
            text: text.into(),
            audio: None,
        }
    }
}

/// Where the two characters come from.
pub enum Casting {
    /// A preset pair, validated up front.
    Fixed(Vec<Character>),
    /// A pair generated for each topic.
    Generated(Arc<dyn CharacterGenerator>),
}

/// What a character is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Thinking,
    Speaking,
}

/// How a session ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateOutcome {
    /// The message cap was reached.
    Done,
    /// `stop` was called.
    Stopped,
}

/// Callback for debate events.
pub type DebateCallback = Box<dyn Fn(DebateEvent) + Send + Sync>;

/// Events emitted during a debate.
#[derive(Debug, Clone)]
pub enum DebateEvent {
    /// A session started on this topic.
    TopicSelected { topic: String },
    /// Both characters are known.
    CastReady { characters: Vec<Character> },
    /// A turn is being generated for this character.
    Thinking { slot: Slot, name: String },
    /// A message was appended to the transcript.
    MessageAppended {
        index: usize,
        slot: Slot,
        name: String,
        text: String,
    },
    /// Audio for this character's turn began playing.
    SpeakingStarted { slot: Slot },
    /// The audio for this character's turn ended.
    SpeakingFinished { slot: Slot },
    /// A user-facing notice, shown as a toast by front ends.
    Notice { title: String, description: String },
    /// The session reached its message cap.
    DebateEnd { outcome: DebateOutcome },
    /// `stop` finished; all state was reset.
    Stopped,
}

/// Point-in-time view of the session, for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct DebateSnapshot {
    pub topic: String,
    pub display_topic: String,
    pub characters: Vec<Character>,
    pub messages: Vec<DebateMessage>,
    pub debating: bool,
    pub speaking: Option<Slot>,
    pub thinking: Option<Slot>,
}

impl DebateSnapshot {
    /// Derive the indicator shown for a character.
    pub fn state_of(&self, slot: Slot) -> PlaybackState {
        if self.speaking == Some(slot) {
            PlaybackState::Speaking
        } else if self.thinking == Some(slot) {
            PlaybackState::Thinking
        } else {
            PlaybackState::Idle
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    topic: String,
    characters: Vec<Character>,
    messages: Vec<DebateMessage>,
    debating: bool,
    running: bool,
    speaking: Option<Slot>,
    thinking: Option<Slot>,
    /// Background tasks of the current session.
    tasks: Vec<AbortHandle>,
}

/// The two characters of a running session, indexed by slot.
struct Cast {
    members: [Character; 2],
}

impl Cast {
    fn new(mut characters: Vec<Character>) -> Result<Self, DebateError> {
        validate_cast(&characters)?;
        characters.sort_by_key(|c| c.slot.number());
        let members: [Character; 2] =
            characters
                .try_into()
                .map_err(|rest: Vec<Character>| DebateError::InvalidParticipantCount {
                    expected: 2,
                    actual: rest.len(),
                })?;
        Ok(Self { members })
    }

    fn get(&self, slot: Slot) -> &Character {
        match slot {
            Slot::One => &self.members[0],
            Slot::Two => &self.members[1],
        }
    }

    fn to_vec(&self) -> Vec<Character> {
        self.members.to_vec()
    }
}

/// A generated and synthesized turn waiting to be played.
struct PendingTurn {
    slot: Slot,
    text: String,
    audio: String,
}

type TurnHandle = JoinHandle<Result<Option<PendingTurn>, DebateError>>;

const RESPONSE_FAILED: &str = "Failed to generate debate response. Please try again.";
const CHARACTERS_FAILED: &str = "Failed to generate debate characters. Please try again.";

/// Orchestrates the debate between two characters.
pub struct DebateOrchestrator {
    config: DebateConfig,
    casting: Casting,
    dialogue: Arc<dyn DialogueGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    player: Arc<AudioPlayer>,
    state: Mutex<SessionState>,
    epoch: Arc<AtomicU64>,
    callback: Option<DebateCallback>,
}

impl DebateOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: DebateConfig,
        casting: Casting,
        dialogue: Arc<dyn DialogueGenerator>,
        speech: Arc<dyn SpeechSynthesizer>,
        player: Arc<AudioPlayer>,
    ) -> Result<Self, DebateError> {
        if config.max_messages == 0 {
            return Err(DebateError::ConfigError(
                "max_messages must be at least 1".to_string(),
            ));
        }
        if let Casting::Fixed(characters) = &casting {
            validate_cast(characters)?;
        }

        Ok(Self {
            config,
            casting,
            dialogue,
            speech,
            player,
            state: Mutex::new(SessionState::default()),
            epoch: Arc::new(AtomicU64::new(0)),
            callback: None,
        })
    }

    /// Set a callback for debate events.
    pub fn with_callback(mut self, callback: DebateCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Choose the topic for the next session.
    pub fn set_topic(&self, topic: impl Into<String>) -> Result<(), DebateError> {
        let mut state = self.lock_state();
        if state.running {
            return Err(DebateError::AlreadyRunning);
        }
        state.topic = topic.into();
        Ok(())
    }

    pub fn topic(&self) -> String {
        self.lock_state().topic.clone()
    }

    /// True while a session is live.
    pub fn is_debating(&self) -> bool {
        self.lock_state().debating
    }

    /// Messages spoken so far in the current session.
    pub fn transcript(&self) -> Vec<DebateMessage> {
        self.lock_state().messages.clone()
    }

    pub fn snapshot(&self) -> DebateSnapshot {
        let state = self.lock_state();
        DebateSnapshot {
            topic: state.topic.clone(),
            display_topic: display_topic(&state.topic),
            characters: state.characters.clone(),
            messages: state.messages.clone(),
            debating: state.debating,
            speaking: state.speaking,
            thinking: state.thinking,
        }
    }

    /// Run a session on the current topic until it is done, stopped or fails.
    pub async fn start(&self) -> Result<DebateOutcome, DebateError> {
        let (session, topic) = {
            let mut state = self.lock_state();
            if state.running {
                return Err(DebateError::AlreadyRunning);
            }
            let topic = state.topic.trim().to_string();
            if topic.is_empty() {
                return Err(DebateError::EmptyTopic);
            }
            state.running = true;
            state.messages.clear();
            (self.epoch.load(Ordering::SeqCst), topic)
        };

        tracing::info!(%topic, session, "starting debate");
        self.emit_current(session, DebateEvent::TopicSelected { topic: topic.clone() });

        let result = match self.prepare_cast(session, &topic).await {
            Ok(Some(cast)) => self
                .run_session(session, &topic, cast)
                .await
                .map_err(|err| (err, RESPONSE_FAILED)),
            Ok(None) => Ok(DebateOutcome::Stopped),
            Err(err) => Err((err, CHARACTERS_FAILED)),
        };

        match result {
            Ok(outcome) => {
                self.finish(session);
                if outcome == DebateOutcome::Done {
                    tracing::info!(session, "debate reached its message limit");
                    self.emit_current(session, DebateEvent::DebateEnd { outcome });
                }
                Ok(outcome)
            }
            Err(_) if !self.is_current(session) => Ok(DebateOutcome::Stopped),
            Err((err, description)) => {
                self.fail(session, &err, description);
                Err(err)
            }
        }
    }

    /// Cancel the running session, fade out its audio and reset all state.
    ///
    /// Once this returns, the cancelled session appends no message, starts
    /// no audio and issues no further network call.
    pub async fn stop(&self) {
        let cancelled = {
            let mut state = self.lock_state();
            self.epoch.fetch_add(1, Ordering::SeqCst);
            std::mem::take(&mut *state).tasks
        };
        for task in cancelled {
            task.abort();
        }

        self.player.stop_all(self.config.fade_out).await;
        tracing::info!("debate stopped");
        self.emit(DebateEvent::Stopped);
    }

    /// Pick or generate the two characters. `Ok(None)` means the session was
    /// stopped meanwhile.
    async fn prepare_cast(&self, session: u64, topic: &str) -> Result<Option<Cast>, DebateError> {
        let characters = match &self.casting {
            Casting::Fixed(characters) => characters.clone(),
            Casting::Generated(generator) => {
                let generator = generator.clone();
                let topic = topic.to_string();
                let task = self.spawn_current(session, async move {
                    generator.generate_characters(&topic).await
                });
                let Some(task) = task else {
                    return Ok(None);
                };
                match task.await {
                    Ok(result) => result?,
                    Err(e) if e.is_cancelled() => return Ok(None),
                    Err(e) => {
                        return Err(DebateError::Generation(format!("casting task failed: {}", e)));
                    }
                }
            }
        };
        let cast = Cast::new(characters)?;

        {
            let mut state = self.lock_state();
            if !self.is_current(session) {
                return Ok(None);
            }
            state.characters = cast.to_vec();
            state.debating = true;
        }
        self.emit_current(
            session,
            DebateEvent::CastReady {
                characters: cast.to_vec(),
            },
        );
        Ok(Some(cast))
    }

    async fn run_session(
        &self,
        session: u64,
        topic: &str,
        cast: Cast,
    ) -> Result<DebateOutcome, DebateError> {
        let Some(first) = self.request_turn(session, self.config.first_speaker, &cast, topic) else {
            return Ok(DebateOutcome::Stopped);
        };
        let Some(mut turn) = await_turn(first).await? else {
            return Ok(DebateOutcome::Stopped);
        };

        loop {
            // Starting playback and appending the message share one critical
            // section with `stop`, so neither can happen after it.
            let (ticket, spoken) = {
                let mut state = self.lock_state();
                if !self.is_current(session) {
                    return Ok(DebateOutcome::Stopped);
                }
                let ticket = self.player.start(&turn.audio)?;
                state
                    .messages
                    .push(DebateMessage::new(turn.slot, turn.text.clone()));
                state.speaking = Some(turn.slot);
                state.thinking = None;
                (ticket, state.messages.len())
            };

            self.emit_current(
                session,
                DebateEvent::MessageAppended {
                    index: spoken - 1,
                    slot: turn.slot,
                    name: cast.get(turn.slot).name.clone(),
                    text: turn.text.clone(),
                },
            );
            self.emit_current(session, DebateEvent::SpeakingStarted { slot: turn.slot });

            let next_slot = turn.slot.other();
            let wants_more = spoken < self.config.max_messages;
            let mut prefetch: Option<TurnHandle> = None;

            let played = ticket
                .wait(|progress| {
                    if prefetch.is_none()
                        && wants_more
                        && progress >= self.config.prefetch_threshold
                        && self.is_current(session)
                    {
                        tracing::debug!(progress, slot = next_slot.number(), "prefetching next turn");
                        prefetch = self.request_turn(session, next_slot, &cast, topic);
                    }
                })
                .await;

            {
                let mut state = self.lock_state();
                if self.is_current(session) {
                    state.speaking = None;
                }
            }
            self.emit_current(session, DebateEvent::SpeakingFinished { slot: turn.slot });

            if let Err(err) = played {
                if let Some(handle) = prefetch {
                    handle.abort();
                }
                return match err {
                    AudioError::Interrupted => Ok(DebateOutcome::Stopped),
                    other => Err(other.into()),
                };
            }

            if !self.is_current(session) {
                if let Some(handle) = prefetch {
                    handle.abort();
                }
                return Ok(DebateOutcome::Stopped);
            }

            if !wants_more {
                return Ok(DebateOutcome::Done);
            }

            let next = match prefetch {
                Some(handle) => handle,
                None => match self.request_turn(session, next_slot, &cast, topic) {
                    Some(handle) => handle,
                    None => return Ok(DebateOutcome::Stopped),
                },
            };
            match await_turn(next).await? {
                Some(pending) => turn = pending,
                None => return Ok(DebateOutcome::Stopped),
            }
        }
    }

    /// Spawn generation and synthesis of a turn for `slot`. Returns `None`
    /// if the session has been stopped.
    fn request_turn(
        &self,
        session: u64,
        slot: Slot,
        cast: &Cast,
        topic: &str,
    ) -> Option<TurnHandle> {
        let character = cast.get(slot);
        let handle = {
            let mut state = self.lock_state();
            if !self.is_current(session) {
                return None;
            }
            state.thinking = Some(slot);

            let messages = state.messages.clone();
            let request = TurnRequest {
                topic: topic.to_string(),
                last_opponent_message: messages.last().map(|m| m.text.clone()),
                messages,
                character: slot,
                stance: Some(slot.stance()),
                character_info: Some(CharacterInfo::from(character)),
            };
            let handle = tokio::spawn(produce_turn(
                self.dialogue.clone(),
                self.speech.clone(),
                request,
                character.voice_id.clone(),
                self.epoch.clone(),
                session,
            ));
            track(&mut state, handle.abort_handle());
            handle
        };

        self.emit_current(
            session,
            DebateEvent::Thinking {
                slot,
                name: character.name.clone(),
            },
        );
        Some(handle)
    }

    /// Spawn `task` for `session`, unless it has already been stopped.
    fn spawn_current<F>(&self, session: u64, task: F) -> Option<JoinHandle<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let mut state = self.lock_state();
        if !self.is_current(session) {
            return None;
        }
        let handle = tokio::spawn(task);
        track(&mut state, handle.abort_handle());
        Some(handle)
    }

    fn finish(&self, session: u64) {
        let mut state = self.lock_state();
        if self.is_current(session) {
            state.running = false;
            state.debating = false;
            state.speaking = None;
            state.thinking = None;
        }
    }

    fn fail(&self, session: u64, err: &DebateError, description: &str) {
        tracing::error!(session, error = %err, "debate halted");
        self.finish(session);
        self.emit_current(
            session,
            DebateEvent::Notice {
                title: "Error".to_string(),
                description: description.to_string(),
            },
        );
    }

    fn is_current(&self, session: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == session
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emit an event if a callback is registered.
    fn emit(&self, event: DebateEvent) {
        if let Some(ref callback) = self.callback {
            callback(event);
        }
    }

    /// Emit only while `session` has not been stopped.
    fn emit_current(&self, session: u64, event: DebateEvent) {
        if self.is_current(session) {
            self.emit(event);
        }
    }
}

fn track(state: &mut SessionState, task: AbortHandle) {
    state.tasks.retain(|t| !t.is_finished());
    state.tasks.push(task);
}

/// Generate then synthesize one turn, checking for cancellation before each
/// network call. `Ok(None)` means the session was stopped meanwhile.
async fn produce_turn(
    dialogue: Arc<dyn DialogueGenerator>,
    speech: Arc<dyn SpeechSynthesizer>,
    request: TurnRequest,
    voice_id: String,
    epoch: Arc<AtomicU64>,
    session: u64,
) -> Result<Option<PendingTurn>, DebateError> {
    if epoch.load(Ordering::SeqCst) != session {
        return Ok(None);
    }
    let text = dialogue.generate_turn(&request).await?;
    if text.trim().is_empty() {
        return Err(DebateError::Generation("No response received".to_string()));
    }
    if epoch.load(Ordering::SeqCst) != session {
        return Ok(None);
    }

    let audio = speech.synthesize(&text, &voice_id).await?;
    if audio.trim().is_empty() {
        return Err(SpeechError::EmptyAudio.into());
    }
    if epoch.load(Ordering::SeqCst) != session {
        return Ok(None);
    }

    Ok(Some(PendingTurn {
        slot: request.character,
        text,
        audio,
    }))
}

async fn await_turn(handle: TurnHandle) -> Result<Option<PendingTurn>, DebateError> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(None),
        Err(e) => Err(DebateError::Generation(format!("turn task failed: {}", e))),
    }
}
