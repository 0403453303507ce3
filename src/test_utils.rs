//! Test utilities for ChatRelay
//!
//! This module provides a scripted [`ChatGateway`] double and helpers for
//! building controllers and settings in unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::Notify;

use crate::error::{RelayError, Result};
use crate::gateway::{ChatEvent, ChatEventStream, ChatGateway};
use crate::notice::{Notice, Notifier, RecordingNotifier};
use crate::settings::{ConnectionSettings, MemorySettingsStore};
use crate::store::ChatController;
use crate::vendor::{GenerateParams, ModelDescriptor};

/// One step of a scripted stream
pub enum ScriptStep {
    /// Yield a content chunk
    Chunk(String),
    /// Yield the terminal Done event
    Done,
    /// Yield a terminal error
    Fail(RelayError),
    /// Wait until the handle is notified, then continue
    Pause(Arc<Notify>),
}

/// Build a script of chunks followed by Done
pub fn chunks_then_done(chunks: &[&str]) -> Vec<ScriptStep> {
    chunks
        .iter()
        .map(|c| ScriptStep::Chunk(c.to_string()))
        .chain(std::iter::once(ScriptStep::Done))
        .collect()
}

/// Gateway double that replays scripted streams in order
#[derive(Default)]
pub struct ScriptedGateway {
    models: Mutex<Vec<ModelDescriptor>>,
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    requests: Mutex<Vec<(ConnectionSettings, GenerateParams)>>,
    model_fetches: Mutex<Vec<ConnectionSettings>>,
    model_failure: Option<Arc<dyn Notifier>>,
    live_streams: Arc<AtomicUsize>,
    live_at_request: Mutex<Vec<usize>>,
}

/// Decrements the live stream count when a scripted stream is dropped
struct LiveStream(Arc<AtomicUsize>);

impl Drop for LiveStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedGateway {
    /// Create a gateway with no models and no scripts
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway whose model fetch fails, reporting through `notifier`
    pub fn failing_models(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            model_failure: Some(notifier),
            ..Self::default()
        }
    }

    /// Set the model list returned by `fetch_models`
    pub fn with_models(self, ids: &[&str]) -> Self {
        *self.models.lock().unwrap() = ids.iter().map(|id| ModelDescriptor::new(*id)).collect();
        self
    }

    /// Queue the script for the next `stream_chat` call
    pub fn push_script(&self, steps: Vec<ScriptStep>) {
        self.scripts.lock().unwrap().push_back(steps);
    }

    /// Every `stream_chat` request received so far
    pub fn requests(&self) -> Vec<(ConnectionSettings, GenerateParams)> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of scripted streams still alive when each `stream_chat` call arrived
    pub fn live_at_request(&self) -> Vec<usize> {
        self.live_at_request.lock().unwrap().clone()
    }

    /// Number of scripted streams not yet dropped
    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    /// Settings passed to each `fetch_models` call
    pub fn model_fetches(&self) -> Vec<ConnectionSettings> {
        self.model_fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn fetch_models(&self, settings: &ConnectionSettings) -> Vec<ModelDescriptor> {
        self.model_fetches.lock().unwrap().push(settings.clone());
        if let Some(notifier) = &self.model_failure {
            notifier.notify(Notice::error("Error: model listing failed"));
            return Vec::new();
        }
        self.models.lock().unwrap().clone()
    }

    async fn stream_chat(
        &self,
        settings: &ConnectionSettings,
        params: GenerateParams,
    ) -> Result<ChatEventStream> {
        self.requests
            .lock()
            .unwrap()
            .push((settings.clone(), params));
        self.live_at_request
            .lock()
            .unwrap()
            .push(self.live_streams.load(Ordering::SeqCst));

        let steps = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RelayError::Transport("no scripted stream".to_string()))?;

        self.live_streams.fetch_add(1, Ordering::SeqCst);
        let live = LiveStream(self.live_streams.clone());

        Ok(Box::pin(stream::unfold(
            (steps.into_iter(), live),
            |(mut steps, live)| async move {
                loop {
                    let event = match steps.next()? {
                        ScriptStep::Chunk(text) => Ok(ChatEvent::Chunk(text)),
                        ScriptStep::Done => Ok(ChatEvent::Done),
                        ScriptStep::Fail(err) => Err(anyhow::Error::from(err)),
                        ScriptStep::Pause(gate) => {
                            gate.notified().await;
                            continue;
                        }
                    };
                    return Some((event, (steps, live)));
                }
            },
        )))
    }
}

/// Settings with a test API key and default URL and model
pub fn settings_with_key() -> ConnectionSettings {
    ConnectionSettings {
        api_key: "sk-test-key-123456".to_string(),
        ..Default::default()
    }
}

/// Controller wired to `gateway`, an in-memory store, and a recorder
pub fn controller_with(
    gateway: Arc<ScriptedGateway>,
    settings: &ConnectionSettings,
) -> (Arc<ChatController>, Arc<RecordingNotifier>, Arc<MemorySettingsStore>) {
    let notifier = Arc::new(RecordingNotifier::new());
    let store = Arc::new(MemorySettingsStore::with_settings(settings));
    let controller = ChatController::new(gateway, store.clone(), notifier.clone())
        .expect("in-memory settings always load");
    (Arc::new(controller), notifier, store)
}
