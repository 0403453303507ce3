/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `serve`    : Run the relay proxy
- `chat`     : Interactive chat session
- `models`   : List available models
- `settings` : Show or change saved connection settings

Client commands share one wiring: a `ProxyGateway` pointed at the relay
(or at an embedded relay on a loopback port), a file-backed settings
store, and a console notifier, all handed to a `ChatController`.
*/

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::gateway::ProxyGateway;
use crate::notice::{ConsoleNotifier, Notifier};
use crate::server::{self, EmbeddedProxy};
use crate::settings::FileSettingsStore;
use crate::store::ChatController;
use crate::vendor::OpenAiClient;

pub mod chat;
pub mod models;
pub mod serve;
pub mod settings;
pub mod special_commands;

/// A chat controller plus the embedded relay it may depend on
pub struct ClientSession {
    /// The controller driving this session
    pub controller: Arc<ChatController>,
    proxy: Option<EmbeddedProxy>,
}

impl ClientSession {
    /// Relay base URL this session talks to
    pub fn proxy_url(&self) -> Option<String> {
        self.proxy.as_ref().map(EmbeddedProxy::api_url)
    }
}

/// Wire up a controller for a client command
///
/// With `embedded` set, a relay proxy is started in this process on an
/// ephemeral loopback port and the gateway points at it; otherwise the
/// configured `client.proxy_url` is used.
///
/// # Errors
///
/// Returns error if the settings cannot be loaded or the embedded relay
/// cannot start
pub async fn open_session(config: &Config, embedded: bool) -> Result<ClientSession> {
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);

    let proxy = if embedded {
        let vendor = Arc::new(OpenAiClient::new(&config.upstream)?);
        Some(server::spawn_embedded(vendor, &config.upstream.default_base_url).await?)
    } else {
        None
    };

    let proxy_url = proxy
        .as_ref()
        .map(EmbeddedProxy::api_url)
        .unwrap_or_else(|| config.client.proxy_url.clone());
    tracing::debug!("Using relay proxy at {}", proxy_url);

    let gateway = Arc::new(ProxyGateway::new(
        proxy_url,
        Duration::from_secs(config.upstream.connect_timeout_seconds),
        notifier.clone(),
    )?);
    let store = Arc::new(FileSettingsStore::new(config.client.settings_path()?));
    let controller = ChatController::new(gateway, store, notifier)?;

    Ok(ClientSession {
        controller: Arc::new(controller),
        proxy,
    })
}
