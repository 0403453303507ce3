//! Model listing command for ChatRelay
//!
//! Refreshes the model list through the relay with the saved API key and
//! prints it as a table or as JSON.

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::vendor::ModelDescriptor;
use chrono::DateTime;
use prettytable::{row, Table};

/// List models available for the saved API key
///
/// # Arguments
///
/// * `config` - Configuration with relay and settings locations
/// * `json` - Print JSON instead of a table
/// * `embedded` - Start a relay in-process instead of using `client.proxy_url`
///
/// # Errors
///
/// Returns error if no API key is saved or the session cannot be opened
///
/// # Examples
///
/// ```no_run
/// use chatrelay::config::Config;
/// use chatrelay::commands::models::list_models;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load("config/config.yaml", &Default::default())?;
/// list_models(&config, false, true).await?;
/// # Ok(())
/// # }
/// ```
pub async fn list_models(config: &Config, json: bool, embedded: bool) -> Result<()> {
    let session = super::open_session(config, embedded).await?;
    let controller = &session.controller;

    let settings = controller.settings();
    if !settings.has_api_key() {
        return Err(RelayError::Config(
            "No API key saved. Run `chatrelay settings set --api-key <key>` first".to_string(),
        )
        .into());
    }

    tracing::info!("Listing models from {}", settings.base_url);
    let models = controller.refresh_models().await;

    if json {
        output_models_json(&models)?;
    } else {
        output_models_table(&models, &settings.selected_model);
    }
    Ok(())
}

/// Pretty JSON for a model list
pub(crate) fn models_json(models: &[ModelDescriptor]) -> Result<String> {
    serde_json::to_string_pretty(models).map_err(|e| RelayError::Serialization(e).into())
}

fn output_models_json(models: &[ModelDescriptor]) -> Result<()> {
    println!("{}", models_json(models)?);
    Ok(())
}

/// Build the model table; the selected model is marked with `*`
pub(crate) fn models_table(models: &[ModelDescriptor], selected: &str) -> Table {
    let mut table = Table::new();
    table.add_row(row!["", "Model ID", "Owned By", "Created"]);

    for model in models {
        let marker = if model.id == selected { "*" } else { "" };
        let owner = model.owned_by.as_deref().unwrap_or("-");
        let created = model
            .created
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(row![marker, model.id, owner, created]);
    }
    table
}

pub(crate) fn output_models_table(models: &[ModelDescriptor], selected: &str) {
    if models.is_empty() {
        println!("No models available.");
        return;
    }

    println!("\nAvailable models ({}):\n", models.len());
    models_table(models, selected).printstd();
    println!();
}
