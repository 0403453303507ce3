//! Chat state store
//!
//! [`ChatController`] owns the conversation transcript, the generation
//! status, the connection settings, and the available model list. Front
//! ends call its operations and render from its accessors or from the
//! [`ChatUpdate`] broadcast.
//!
//! State lives behind a synchronous mutex that is never held across an
//! await point. Each streaming generation is identified by a UUID. Chunks
//! accumulate in the generation and are merged into the trailing assistant
//! entry. [`ChatController::clear_messages`] cancels the active generation,
//! which drops its stream right away; a later send waits for that stream to
//! be gone before opening its own.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{notice_for, RelayError, Result};
use crate::gateway::{ChatEvent, ChatGateway};
use crate::notice::{Notice, Notifier};
use crate::settings::{ConfigUpdate, ConnectionSettings, SettingsStore};
use crate::vendor::{GenerateParams, Message, ModelDescriptor};

/// Capacity of the update broadcast channel
const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Notice shown when sending without an API key
pub const MISSING_API_KEY_MESSAGE: &str = "Please set your OpenAI API key in settings";

/// Notice shown after settings are saved
pub const SETTINGS_UPDATED_MESSAGE: &str = "Settings updated successfully";

/// Whether a generation is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStatus {
    /// Ready to send
    Idle,
    /// A stream is active
    Generating,
}

/// Result of [`ChatController::send_message`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream finished and the reply is complete
    Completed,
    /// The stream failed; any partial reply is marked stopped
    Stopped,
    /// The conversation was cleared while streaming
    Abandoned,
    /// Another generation is active; nothing was sent
    Busy,
    /// The input was blank; nothing was sent
    Ignored,
    /// No API key is configured; nothing was sent
    MissingApiKey,
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    /// The message
    pub message: Message,
    /// The reply was cut short by a stream failure
    pub stopped: bool,
}

impl ChatEntry {
    fn new(message: Message) -> Self {
        Self {
            message,
            stopped: false,
        }
    }
}

/// Change notification for front ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    /// A generation started after the user message was appended
    Started {
        /// Generation id
        generation: Uuid,
    },
    /// A chunk was appended to the assistant reply
    Chunk {
        /// Generation id
        generation: Uuid,
        /// The new text
        text: String,
    },
    /// The generation completed
    Finished {
        /// Generation id
        generation: Uuid,
    },
    /// The generation failed
    Failed {
        /// Generation id
        generation: Uuid,
        /// User-facing message
        message: String,
    },
    /// The transcript was cleared
    Cleared,
    /// The model list was replaced
    ModelsRefreshed {
        /// Number of models now available
        count: usize,
    },
}

/// What a send needs once its generation is open
type StartedGeneration = (Uuid, CancellationToken, ConnectionSettings, GenerateParams);

struct Generation {
    id: Uuid,
    /// Cancelled when the generation is cleared
    cancel: CancellationToken,
    content: String,
    /// Index of the assistant entry once the first chunk arrived
    entry: Option<usize>,
}

struct ChatState {
    entries: Vec<ChatEntry>,
    generation: Option<Generation>,
    settings: ConnectionSettings,
    available_models: Vec<ModelDescriptor>,
    loading_models: bool,
}

/// Conversation state machine
pub struct ChatController {
    state: Mutex<ChatState>,
    gateway: Arc<dyn ChatGateway>,
    settings_store: Arc<dyn SettingsStore>,
    notifier: Arc<dyn Notifier>,
    updates: broadcast::Sender<ChatUpdate>,
    /// Held while a network stream is open
    stream_slot: tokio::sync::Mutex<()>,
}

impl ChatController {
    /// Create a controller with settings loaded from `settings_store`
    ///
    /// # Errors
    ///
    /// Returns error if the stored settings cannot be read
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        settings_store: Arc<dyn SettingsStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let settings = settings_store.load()?;
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Ok(Self {
            state: Mutex::new(ChatState {
                entries: Vec::new(),
                generation: None,
                settings,
                available_models: Vec::new(),
                loading_models: false,
            }),
            gateway,
            settings_store,
            notifier,
            updates,
            stream_slot: tokio::sync::Mutex::new(()),
        })
    }

    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, update: ChatUpdate) {
        // No subscribers is fine
        let _ = self.updates.send(update);
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ChatUpdate> {
        self.updates.subscribe()
    }

    /// Current generation status
    pub fn status(&self) -> ChatStatus {
        if self.state().generation.is_some() {
            ChatStatus::Generating
        } else {
            ChatStatus::Idle
        }
    }

    /// Transcript entries, oldest first
    pub fn entries(&self) -> Vec<ChatEntry> {
        self.state().entries.clone()
    }

    /// Transcript messages, oldest first
    pub fn messages(&self) -> Vec<Message> {
        self.state()
            .entries
            .iter()
            .map(|entry| entry.message.clone())
            .collect()
    }

    /// Current connection settings
    pub fn settings(&self) -> ConnectionSettings {
        self.state().settings.clone()
    }

    /// Models from the last refresh, sorted by id
    pub fn available_models(&self) -> Vec<ModelDescriptor> {
        self.state().available_models.clone()
    }

    /// Whether a model refresh is in flight
    pub fn is_loading_models(&self) -> bool {
        self.state().loading_models
    }

    /// Send a user message and stream the assistant reply
    ///
    /// Returns once the reply has finished, failed, or been abandoned. Only
    /// one generation runs at a time; a call made while another is active
    /// returns [`SendOutcome::Busy`] without touching the transcript.
    pub async fn send_message(&self, content: &str) -> SendOutcome {
        let (id, cancel, settings, params) = match self.begin_generation(content) {
            Ok(started) => started,
            Err(outcome) => return outcome,
        };
        self.publish(ChatUpdate::Started { generation: id });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("Generation {} was cleared; abandoning stream", id);
                SendOutcome::Abandoned
            }
            outcome = self.run_generation(id, settings, params) => outcome,
        }
    }

    /// Open the stream for generation `id` and read it to the end
    async fn run_generation(
        &self,
        id: Uuid,
        settings: ConnectionSettings,
        params: GenerateParams,
    ) -> SendOutcome {
        // A cleared generation's stream is dropped before this guard is released
        let _slot = self.stream_slot.lock().await;

        let mut events = match self.gateway.stream_chat(&settings, params).await {
            Ok(events) => events,
            Err(err) => {
                self.fail_generation(id, &err);
                return SendOutcome::Stopped;
            }
        };

        while let Some(event) = events.next().await {
            match event {
                Ok(ChatEvent::Chunk(text)) => {
                    if !self.apply_chunk(id, text) {
                        tracing::info!("Generation {} was cleared; abandoning stream", id);
                        return SendOutcome::Abandoned;
                    }
                }
                Ok(ChatEvent::Done) => break,
                Err(err) => {
                    self.fail_generation(id, &err);
                    return SendOutcome::Stopped;
                }
            }
        }

        if self.finish_generation(id) {
            SendOutcome::Completed
        } else {
            SendOutcome::Abandoned
        }
    }

    /// Validate the send and open a generation
    fn begin_generation(
        &self,
        content: &str,
    ) -> std::result::Result<StartedGeneration, SendOutcome> {
        if content.trim().is_empty() {
            return Err(SendOutcome::Ignored);
        }

        let mut state = self.state();
        if state.generation.is_some() {
            tracing::debug!("Ignoring send while a generation is active");
            return Err(SendOutcome::Busy);
        }

        if !state.settings.has_api_key() {
            drop(state);
            let err = RelayError::Config(MISSING_API_KEY_MESSAGE.to_string());
            self.notifier.notify(Notice::error(err.notice_message()));
            return Err(SendOutcome::MissingApiKey);
        }

        state.entries.push(ChatEntry::new(Message::user(content)));

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        state.generation = Some(Generation {
            id,
            cancel: cancel.clone(),
            content: String::new(),
            entry: None,
        });

        let settings = state.settings.clone();
        let messages = state.entries.iter().map(|e| e.message.clone()).collect();
        let params = GenerateParams::new(settings.selected_model.clone(), messages);

        tracing::debug!(
            "Starting generation {} with model {}",
            id,
            settings.selected_model
        );
        Ok((id, cancel, settings, params))
    }

    /// Append a chunk to generation `id`; false when it is no longer current
    fn apply_chunk(&self, id: Uuid, text: String) -> bool {
        {
            let mut guard = self.state();
            let ChatState {
                entries,
                generation,
                ..
            } = &mut *guard;

            let Some(generation) = generation.as_mut().filter(|g| g.id == id) else {
                return false;
            };

            generation.content.push_str(&text);
            match generation.entry {
                Some(index) => entries[index]
                    .message
                    .content
                    .clone_from(&generation.content),
                None => {
                    entries.push(ChatEntry::new(Message::assistant(
                        generation.content.clone(),
                    )));
                    generation.entry = Some(entries.len() - 1);
                }
            }
        }

        self.publish(ChatUpdate::Chunk {
            generation: id,
            text,
        });
        true
    }

    /// Close generation `id` normally; false when it is no longer current
    fn finish_generation(&self, id: Uuid) -> bool {
        {
            let mut state = self.state();
            if !state.generation.as_ref().is_some_and(|g| g.id == id) {
                return false;
            }
            state.generation = None;
        }

        tracing::debug!("Generation {} completed", id);
        self.publish(ChatUpdate::Finished { generation: id });
        true
    }

    /// Close generation `id` after a failure and notify the user
    fn fail_generation(&self, id: Uuid, err: &anyhow::Error) {
        tracing::error!("Generation {} failed: {:#}", id, err);

        let current = {
            let mut guard = self.state();
            let ChatState {
                entries,
                generation,
                ..
            } = &mut *guard;

            match generation.take() {
                Some(active) if active.id == id => {
                    if let Some(index) = active.entry {
                        entries[index].stopped = true;
                    }
                    true
                }
                other => {
                    *generation = other;
                    false
                }
            }
        };

        if !current {
            return;
        }

        let message = notice_for(err);
        self.notifier.notify(Notice::error(message.clone()));
        self.publish(ChatUpdate::Failed {
            generation: id,
            message,
        });
    }

    /// Remove every entry and drop any active generation
    pub fn clear_messages(&self) {
        let cancelled = {
            let mut state = self.state();
            state.entries.clear();
            state.generation.take().map(|g| g.cancel)
        };
        if let Some(cancel) = cancelled {
            cancel.cancel();
        }
        tracing::debug!("Conversation cleared");
        self.publish(ChatUpdate::Cleared);
    }

    /// Merge, persist, and announce a settings change
    ///
    /// Refreshes the model list when the API key or base URL changed.
    ///
    /// # Errors
    ///
    /// Returns error if the settings cannot be saved; the in-memory change
    /// is kept
    pub async fn update_config(&self, update: ConfigUpdate) -> Result<()> {
        let (settings, connection_changed) = {
            let mut state = self.state();
            let changed = state.settings.apply(update);
            (state.settings.clone(), changed)
        };

        if let Err(err) = self.settings_store.save(&settings) {
            tracing::error!("Failed to save settings: {:#}", err);
            self.notifier.notify(Notice::error(notice_for(&err)));
            return Err(err);
        }

        self.notifier.notify(Notice::success(SETTINGS_UPDATED_MESSAGE));

        if connection_changed {
            self.refresh_models().await;
        }
        Ok(())
    }

    /// Fetch the model list and store it sorted by id
    ///
    /// Does nothing without an API key. Vendor duplicates are kept.
    pub async fn refresh_models(&self) -> Vec<ModelDescriptor> {
        let settings = {
            let mut state = self.state();
            if !state.settings.has_api_key() {
                return Vec::new();
            }
            state.loading_models = true;
            state.settings.clone()
        };

        let mut models = self.gateway.fetch_models(&settings).await;
        models.sort_by(|a, b| a.id.cmp(&b.id));

        {
            let mut state = self.state();
            state.available_models = models.clone();
            state.loading_models = false;
        }

        tracing::debug!("Model list refreshed: {} models", models.len());
        self.publish(ChatUpdate::ModelsRefreshed {
            count: models.len(),
        });
        models
    }
}
