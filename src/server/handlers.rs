//! Request handlers for the relay endpoints

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{stream, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::wire::{
    ChatRequest, ErrorPayload, FrameErrorKind, ModelsRequest, ModelsResponse, RelayFrame,
};
use super::AppState;
use crate::error::RelayError;
use crate::vendor::TokenStream;

/// Capacity of the channel between the upstream reader and the SSE body
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// `GET /api/health`
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /api/models`
pub async fn models(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ModelsRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let Some(api_key) = required_api_key(request.api_key) else {
        return bad_request("API key is required");
    };
    let base_url = state.resolve_base_url(request.base_url.as_deref());

    match state.vendor.list_models(&api_key, &base_url).await {
        Ok(models) => Json(ModelsResponse { models }).into_response(),
        Err(err) => {
            tracing::error!("Error fetching models: {:#}", err);
            upstream_failure(&err)
        }
    }
}

/// `POST /api/chat`
///
/// Failures before the first token produce a JSON error response. The
/// first vendor item is awaited before the response is committed to
/// `text/event-stream`.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let Some(api_key) = required_api_key(request.api_key) else {
        return bad_request("API key is required");
    };
    let base_url = state.resolve_base_url(request.base_url.as_deref());

    let mut tokens = match state
        .vendor
        .create_chat_stream(&api_key, &base_url, &request.params)
        .await
    {
        Ok(tokens) => tokens,
        Err(err) => {
            tracing::error!("Error starting chat stream: {:#}", err);
            return upstream_failure(&err);
        }
    };

    let tokens: TokenStream = match tokens.next().await {
        Some(Ok(first)) => Box::pin(stream::iter([Ok(first)]).chain(tokens)),
        Some(Err(err)) => {
            tracing::error!("Chat stream failed before the first token: {:#}", err);
            return upstream_failure(&err);
        }
        None => Box::pin(stream::empty()),
    };

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(relay_tokens(tokens, tx));

    (
        [(header::CONNECTION, "keep-alive")],
        Sse::new(ReceiverStream::new(rx)),
    )
        .into_response()
}

/// Forward vendor tokens as SSE events, then emit one terminal frame.
///
/// Stops early when the client disconnects, which drops the vendor stream.
async fn relay_tokens(
    mut tokens: TokenStream,
    tx: mpsc::Sender<Result<Event, axum::Error>>,
) {
    let mut relayed = 0usize;

    loop {
        let item = tokio::select! {
            _ = tx.closed() => {
                tracing::info!(
                    "Client disconnected after {} tokens; abandoning upstream stream",
                    relayed
                );
                return;
            }
            item = tokens.next() => item,
        };
        let Some(item) = item else { break };

        match item {
            Ok(token) => {
                if tx.send(frame_event(&RelayFrame::content(token))).await.is_err() {
                    tracing::info!(
                        "Client disconnected after {} tokens; abandoning upstream stream",
                        relayed
                    );
                    return;
                }
                relayed += 1;
            }
            Err(err) => {
                tracing::error!("Upstream stream failed after {} tokens: {:#}", relayed, err);
                let _ = tx
                    .send(frame_event(&error_frame(&err)))
                    .await;
                return;
            }
        }
    }

    tracing::debug!("Relayed {} tokens", relayed);
    let _ = tx.send(frame_event(&RelayFrame::done())).await;
}

fn frame_event(frame: &RelayFrame) -> Result<Event, axum::Error> {
    Event::default().json_data(frame)
}

/// Terminal frame describing a mid-stream failure
fn error_frame(err: &anyhow::Error) -> RelayFrame {
    let mut frame = RelayFrame::error(error_message(err));
    match err.downcast_ref::<RelayError>() {
        Some(RelayError::Transport(_)) => frame.kind = Some(FrameErrorKind::Transport),
        Some(relay @ RelayError::Upstream { .. }) => {
            frame.kind = Some(FrameErrorKind::Upstream);
            frame.status = relay.status();
        }
        _ => {}
    }
    frame
}

fn required_api_key(api_key: Option<String>) -> Option<String> {
    api_key.filter(|key| !key.trim().is_empty())
}

fn bad_request(message: impl Into<String>) -> Response {
    let payload = ErrorPayload {
        error: message.into(),
        status: None,
    };
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}

/// 500 response describing a vendor failure
fn upstream_failure(err: &anyhow::Error) -> Response {
    let payload = ErrorPayload {
        error: error_message(err),
        status: err.downcast_ref::<RelayError>().and_then(RelayError::status),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}

/// Message without the error-kind prefix when the vendor supplied one
fn error_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<RelayError>() {
        Some(RelayError::Upstream { message, .. }) => message.clone(),
        Some(RelayError::Transport(message)) => message.clone(),
        _ => err.to_string(),
    }
}
