//! ChatRelay - streaming chat front-end and local SSE relay proxy
//!
//! This library provides the pieces of a small chat client for
//! OpenAI-compatible Chat Completions APIs: a vendor adapter, a local proxy
//! server that re-streams completions as Server-Sent Events, a client-side
//! gateway that decodes those events, and a chat state store that drives a
//! conversation.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `sse`: Incremental SSE frame decoding shared by the adapter and gateway
//! - `vendor`: Vendor client abstraction and the OpenAI-compatible client
//! - `server`: The `/api/models` and `/api/chat` relay endpoints
//! - `gateway`: Client-side access to the relay proxy
//! - `store`: Conversation state machine and settings mediation
//! - `settings`: Persisted connection settings (API key, base URL, model)
//! - `notice`: User-facing notices
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chatrelay::{Config, OpenAiClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let vendor = Arc::new(OpenAiClient::new(&config.upstream)?);
//!     chatrelay::server::serve(&config, vendor).await
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod gateway;
pub mod notice;
pub mod server;
pub mod settings;
pub mod sse;
pub mod store;
pub mod vendor;

// Re-export commonly used types
pub use config::Config;
pub use error::{RelayError, Result};
pub use gateway::{ChatEvent, ChatGateway, ProxyGateway};
pub use notice::{Notice, NoticeLevel, Notifier};
pub use settings::{ConfigUpdate, ConnectionSettings, SettingsStore};
pub use store::{ChatController, ChatStatus, SendOutcome};
pub use vendor::{GenerateParams, Message, ModelDescriptor, OpenAiClient, Role, VendorClient};

#[cfg(test)]
pub mod test_utils;
