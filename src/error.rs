//! Error types for ChatRelay
//!
//! This module defines the error taxonomy shared by the proxy server, the
//! client gateway, and the chat store, using `thiserror` for ergonomic error
//! handling.

use thiserror::Error;

/// Main error type for ChatRelay operations
///
/// Every failure is terminal for the operation that produced it; nothing in
/// the crate retries automatically.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Missing or invalid configuration (e.g. no API key set)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Non-2xx response from the vendor API or the relay proxy
    #[error("Upstream error{}: {message}", status_suffix(.status))]
    Upstream {
        /// HTTP status reported by the upstream, when known
        status: Option<u16>,
        /// Best-effort message extracted from the upstream body
        message: String,
    },

    /// Network-level failure (connection refused, aborted body, DNS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed SSE frame or unexpected payload shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl RelayError {
    /// Build an upstream error from a status code and message
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// User-facing notice text for this error
    ///
    /// Recognizable upstream statuses get a specific message; transport
    /// failures carry a hint about endpoint reachability and CORS.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::error::RelayError;
    ///
    /// let err = RelayError::upstream(Some(401), "Incorrect API key provided");
    /// assert!(err.notice_message().starts_with("Authentication failed"));
    /// ```
    pub fn notice_message(&self) -> String {
        match self {
            Self::Config(msg) => msg.clone(),
            Self::Upstream {
                status: Some(401), ..
            } => "Authentication failed: check your API key".to_string(),
            Self::Upstream {
                status: Some(429), ..
            } => "Rate limit exceeded: wait a moment before sending again".to_string(),
            Self::Upstream { message, .. } => format!("Error: {}", message),
            Self::Transport(msg) => format!(
                "Error: {}. Check that the endpoint is reachable and CORS-compatible",
                msg
            ),
            other => format!("Error: {}", other),
        }
    }
}

/// Classify an arbitrary error chain into a user-facing notice message
///
/// Falls back to the plain display text when the chain does not contain a
/// [`RelayError`].
pub fn notice_for(err: &anyhow::Error) -> String {
    match err.downcast_ref::<RelayError>() {
        Some(relay) => relay.notice_message(),
        None => format!("Error: {}", err),
    }
}

/// Result type alias for ChatRelay operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
