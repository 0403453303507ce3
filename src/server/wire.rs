//! JSON shapes exchanged between the client gateway and the relay proxy

use serde::{Deserialize, Serialize};

use crate::vendor::{GenerateParams, ModelDescriptor};

/// Body of `POST /api/models`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsRequest {
    /// Vendor API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Vendor base URL; the proxy default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Successful body of `POST /api/models`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelsResponse {
    /// Models reported by the vendor
    pub models: Vec<ModelDescriptor>,
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Vendor API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Vendor base URL; the proxy default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Generation parameters
    pub params: GenerateParams,
}

/// JSON error body returned with 4xx/5xx statuses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable message
    pub error: String,
    /// Vendor HTTP status behind a 500, when one was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// What failed behind a mid-stream `{"error": ...}` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameErrorKind {
    /// The vendor answered with an error
    Upstream,
    /// The connection to the vendor failed
    Transport,
}

/// Payload of one SSE `data:` frame on `/api/chat`
///
/// A stream is zero or more `{"content": ...}` frames followed by exactly
/// one terminal frame: `{"done": true}` on success or `{"error": ...}` if the
/// vendor stream failed after it had started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayFrame {
    /// Content token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Completion marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    /// Mid-stream failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure class accompanying `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FrameErrorKind>,
    /// Vendor HTTP status accompanying `error`, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl RelayFrame {
    /// Frame carrying one content token
    pub fn content(token: impl Into<String>) -> Self {
        Self {
            content: Some(token.into()),
            ..Default::default()
        }
    }

    /// Terminal success frame
    pub fn done() -> Self {
        Self {
            done: Some(true),
            ..Default::default()
        }
    }

    /// Terminal failure frame
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_serialize_compactly() {
        assert_eq!(
            serde_json::to_string(&RelayFrame::content("a")).unwrap(),
            r#"{"content":"a"}"#
        );
        assert_eq!(
            serde_json::to_string(&RelayFrame::done()).unwrap(),
            r#"{"done":true}"#
        );
        assert_eq!(
            serde_json::to_string(&RelayFrame::error("boom")).unwrap(),
            r#"{"error":"boom"}"#
        );
    }

    #[test]
    fn test_error_frame_kind_is_lowercase() {
        let frame = RelayFrame {
            kind: Some(FrameErrorKind::Transport),
            ..RelayFrame::error("reset")
        };
        assert_eq!(
            serde_json::to_string(&frame).unwrap(),
            r#"{"error":"reset","kind":"transport"}"#
        );

        let decoded: RelayFrame =
            serde_json::from_str(r#"{"error":"x","kind":"upstream","status":401}"#).unwrap();
        assert_eq!(decoded.kind, Some(FrameErrorKind::Upstream));
        assert_eq!(decoded.status, Some(401));
    }

    #[test]
    fn test_chat_request_uses_camel_case_keys() {
        let body = r#"{
            "apiKey": "sk-test",
            "baseUrl": "http://localhost:1234/v1",
            "params": {"model": "m", "messages": [{"role": "user", "content": "hi"}]}
        }"#;
        let request: ChatRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.api_key.as_deref(), Some("sk-test"));
        assert_eq!(request.base_url.as_deref(), Some("http://localhost:1234/v1"));
        assert_eq!(request.params.messages.len(), 1);
    }

    #[test]
    fn test_models_request_fields_optional() {
        let request: ModelsRequest = serde_json::from_str("{}").unwrap();
        assert!(request.api_key.is_none());
        assert!(request.base_url.is_none());
    }
}
