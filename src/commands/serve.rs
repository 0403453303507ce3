//! Relay proxy command

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::server;
use crate::vendor::OpenAiClient;

/// Run the relay proxy in the foreground until Ctrl-C
///
/// # Errors
///
/// Returns error if the configuration is invalid or the port cannot be bound
pub async fn run_serve(config: Config) -> Result<()> {
    config.validate()?;

    tracing::info!(
        "Starting relay proxy: default upstream {}",
        config.upstream.default_base_url
    );

    let vendor = Arc::new(OpenAiClient::new(&config.upstream)?);
    server::serve(&config, vendor).await
}
