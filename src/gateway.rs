//! Client gateway to the relay proxy
//!
//! The chat store never talks to the vendor directly. It goes through a
//! [`ChatGateway`], which posts the current [`ConnectionSettings`] to the
//! relay proxy and decodes its `text/event-stream` response into
//! [`ChatEvent`]s.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};

use crate::error::{notice_for, RelayError, Result};
use crate::notice::{Notice, Notifier};
use crate::server::wire::{
    ChatRequest, ErrorPayload, FrameErrorKind, ModelsRequest, ModelsResponse, RelayFrame,
};
use crate::settings::ConnectionSettings;
use crate::sse::{self, FrameStream};
use crate::vendor::{normalize_base_url, GenerateParams, ModelDescriptor};

/// Event decoded from the relay stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// One content token
    Chunk(String),
    /// The generation finished
    Done,
}

/// Stream of relay events; `Done` or an `Err` is always the last item
pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>;

/// Access to models and streaming completions from the client side
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// List models for `settings`
    ///
    /// Never fails: on error a notice is emitted and an empty list returned.
    async fn fetch_models(&self, settings: &ConnectionSettings) -> Vec<ModelDescriptor>;

    /// Start a streaming completion
    ///
    /// # Errors
    ///
    /// Returns error if the relay rejects the request before streaming
    async fn stream_chat(
        &self,
        settings: &ConnectionSettings,
        params: GenerateParams,
    ) -> Result<ChatEventStream>;
}

/// Callbacks for a streaming completion
///
/// `on_chunk` runs once per token in order; then exactly one of `on_done`
/// or `on_error` runs.
pub trait StreamHandler: Send {
    /// A content token arrived
    fn on_chunk(&mut self, chunk: &str);
    /// The stream completed normally
    fn on_done(&mut self);
    /// The stream failed
    fn on_error(&mut self, error: &anyhow::Error);
}

/// Drive a gateway stream to completion through `handler`
pub async fn stream_chat_with<G, H>(
    gateway: &G,
    settings: &ConnectionSettings,
    params: GenerateParams,
    handler: &mut H,
) where
    G: ChatGateway + ?Sized,
    H: StreamHandler + ?Sized,
{
    let mut events = match gateway.stream_chat(settings, params).await {
        Ok(events) => events,
        Err(err) => {
            handler.on_error(&err);
            return;
        }
    };

    while let Some(event) = events.next().await {
        match event {
            Ok(ChatEvent::Chunk(chunk)) => handler.on_chunk(&chunk),
            Ok(ChatEvent::Done) => {
                handler.on_done();
                return;
            }
            Err(err) => {
                handler.on_error(&err);
                return;
            }
        }
    }

    // Streams from this module always end in Done or Err
    handler.on_done();
}

/// Gateway that calls the local relay proxy over HTTP
pub struct ProxyGateway {
    client: Client,
    proxy_url: String,
    notifier: Arc<dyn Notifier>,
}

impl ProxyGateway {
    /// Create a gateway for the relay at `proxy_url` (e.g. `http://127.0.0.1:5000/api`)
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        proxy_url: impl Into<String>,
        connect_timeout: Duration,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            proxy_url: proxy_url.into(),
            notifier,
        })
    }

    /// Relay base URL
    pub fn proxy_url(&self) -> &str {
        &self.proxy_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", normalize_base_url(&self.proxy_url), path)
    }

    async fn try_fetch_models(&self, settings: &ConnectionSettings) -> Result<Vec<ModelDescriptor>> {
        let request = ModelsRequest {
            api_key: Some(settings.api_key.clone()),
            base_url: Some(normalize_base_url(&settings.base_url)),
        };

        let response = self
            .client
            .post(self.endpoint("models"))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_relay_status(response).await?;
        let body: ModelsResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Parse(format!("Failed to parse model list: {}", e)))?;

        Ok(body.models)
    }
}

#[async_trait]
impl ChatGateway for ProxyGateway {
    async fn fetch_models(&self, settings: &ConnectionSettings) -> Vec<ModelDescriptor> {
        match self.try_fetch_models(settings).await {
            Ok(models) => models,
            Err(err) => {
                tracing::error!("Error fetching models: {:#}", err);
                self.notifier.notify(Notice::error(notice_for(&err)));
                Vec::new()
            }
        }
    }

    async fn stream_chat(
        &self,
        settings: &ConnectionSettings,
        params: GenerateParams,
    ) -> Result<ChatEventStream> {
        let request = ChatRequest {
            api_key: Some(settings.api_key.clone()),
            base_url: Some(normalize_base_url(&settings.base_url)),
            params,
        };

        let response = self
            .client
            .post(self.endpoint("chat"))
            .header(ACCEPT, "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_relay_status(response).await?;
        Ok(events_from_frames(sse::frame_stream(response.bytes_stream())))
    }
}

fn transport_error(err: reqwest::Error) -> anyhow::Error {
    RelayError::Transport(err.to_string()).into()
}

/// Map a relay error response to [`RelayError::Upstream`]
///
/// The vendor status inside the JSON body wins over the relay's own 500 so
/// that authentication and rate-limit failures stay recognizable.
async fn check_relay_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let err = match serde_json::from_str::<ErrorPayload>(&body) {
        Ok(payload) => {
            RelayError::upstream(payload.status.or(Some(status.as_u16())), payload.error)
        }
        Err(_) => RelayError::upstream(
            Some(status.as_u16()),
            status.canonical_reason().unwrap_or("Unknown error"),
        ),
    };

    tracing::error!("Relay returned {}: {}", status, err);
    Err(err.into())
}

/// Decode one relay frame
///
/// `None` means the frame carries nothing to act on and is skipped.
fn decode_relay_frame(data: &str) -> Option<Result<ChatEvent>> {
    let frame: RelayFrame = match serde_json::from_str(data) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Error parsing SSE data: {}", e);
            return None;
        }
    };

    if let Some(message) = frame.error {
        let err = match frame.kind {
            Some(FrameErrorKind::Transport) => RelayError::Transport(message),
            _ => RelayError::upstream(frame.status, message),
        };
        return Some(Err(err.into()));
    }
    if frame.done == Some(true) {
        return Some(Ok(ChatEvent::Done));
    }
    frame
        .content
        .filter(|content| !content.is_empty())
        .map(|content| Ok(ChatEvent::Chunk(content)))
}

/// Turn relay frames into events that always end in `Done` or `Err`
///
/// A body that ends without a terminal frame is treated as done.
fn events_from_frames(frames: FrameStream) -> ChatEventStream {
    Box::pin(stream::unfold(Some(frames), |state| async move {
        let mut frames = state?;
        loop {
            let frame = match frames.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(err)) => return Some((Err(err), None)),
                None => {
                    tracing::debug!("Relay stream ended without a done frame");
                    return Some((Ok(ChatEvent::Done), None));
                }
            };

            match decode_relay_frame(&frame.data) {
                Some(Ok(ChatEvent::Chunk(chunk))) => {
                    return Some((Ok(ChatEvent::Chunk(chunk)), Some(frames)))
                }
                Some(terminal) => return Some((terminal, None)),
                None => continue,
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::SseFrame;

    fn frames_of(payloads: &[&str]) -> FrameStream {
        let items: Vec<Result<SseFrame>> = payloads
            .iter()
            .map(|p| {
                Ok(SseFrame {
                    event: None,
                    data: p.to_string(),
                })
            })
            .collect();
        Box::pin(stream::iter(items))
    }

    async fn collect(frames: FrameStream) -> Vec<std::result::Result<ChatEvent, String>> {
        events_from_frames(frames)
            .map(|e| e.map_err(|err| err.to_string()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_events_skip_malformed_frames() {
        let events = collect(frames_of(&[
            r#"{"content":"a"}"#,
            "{broken",
            r#"{"content":"b"}"#,
            r#"{"done":true}"#,
        ]))
        .await;
        assert_eq!(
            events,
            vec![
                Ok(ChatEvent::Chunk("a".into())),
                Ok(ChatEvent::Chunk("b".into())),
                Ok(ChatEvent::Done),
            ]
        );
    }

    #[tokio::test]
    async fn test_nothing_after_done() {
        let events = collect(frames_of(&[
            r#"{"done":true}"#,
            r#"{"content":"late"}"#,
        ]))
        .await;
        assert_eq!(events, vec![Ok(ChatEvent::Done)]);
    }

    #[tokio::test]
    async fn test_end_of_body_counts_as_done() {
        let events = collect(frames_of(&[r#"{"content":"a"}"#])).await;
        assert_eq!(
            events,
            vec![Ok(ChatEvent::Chunk("a".into())), Ok(ChatEvent::Done)]
        );
    }

    #[tokio::test]
    async fn test_error_frame_is_terminal() {
        let events = collect(frames_of(&[
            r#"{"content":"a"}"#,
            r#"{"error":"upstream reset"}"#,
            r#"{"done":true}"#,
        ]))
        .await;
        assert_eq!(events.len(), 2);
        assert!(events[1].as_ref().unwrap_err().contains("upstream reset"));
    }

    #[test]
    fn test_error_frame_keeps_failure_class() {
        let transport = decode_relay_frame(r#"{"error":"connection reset","kind":"transport"}"#)
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            transport.downcast_ref::<RelayError>(),
            Some(RelayError::Transport(_))
        ));
        assert!(notice_for(&transport).contains("reachable"));

        let limited = decode_relay_frame(r#"{"error":"slow down","kind":"upstream","status":429}"#)
            .unwrap()
            .unwrap_err();
        assert!(notice_for(&limited).starts_with("Rate limit exceeded"));
    }

    #[test]
    fn test_empty_content_frame_is_skipped() {
        assert!(decode_relay_frame(r#"{"content":""}"#).is_none());
        assert!(decode_relay_frame(r#"{"done":false}"#).is_none());
    }
}
