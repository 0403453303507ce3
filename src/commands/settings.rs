//! Settings commands
//!
//! `settings show` prints the saved connection settings with the API key
//! masked; `settings set` merges changes into the saved file.

use colored::Colorize;
use serde_json::json;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::settings::{ConfigUpdate, ConnectionSettings, FileSettingsStore, SettingsStore};

/// Print the saved settings
///
/// # Errors
///
/// Returns error if the settings file cannot be read
pub fn show_settings(config: &Config, json: bool) -> Result<()> {
    let path = config.client.settings_path()?;
    let settings = FileSettingsStore::new(&path).load()?;

    if json {
        println!("{}", settings_json(&settings)?);
    } else {
        println!("{}", format!("Settings ({})", path.display()).bold());
        print_settings(&settings);
    }
    Ok(())
}

/// Merge `update` into the saved settings
///
/// # Errors
///
/// Returns error if nothing was given to change or the file cannot be written
pub fn set_settings(config: &Config, update: ConfigUpdate) -> Result<()> {
    if update.is_empty() {
        return Err(RelayError::Config(
            "Nothing to change. Pass --api-key, --base-url, or --model".to_string(),
        )
        .into());
    }

    let store = FileSettingsStore::new(config.client.settings_path()?);
    let mut settings = store.load()?;
    settings.apply(update);
    store.save(&settings)?;

    tracing::info!("Settings saved to {}", store.path().display());
    println!("{}", "Settings updated successfully".green());
    print_settings(&settings);
    Ok(())
}

/// Print settings as aligned lines with the key masked
pub fn print_settings(settings: &ConnectionSettings) {
    println!("  API key:  {}", settings.masked_api_key());
    println!("  Base URL: {}", settings.base_url);
    println!("  Model:    {}", settings.selected_model);
}

fn settings_json(settings: &ConnectionSettings) -> Result<String> {
    let value = json!({
        "api_key": settings.masked_api_key(),
        "base_url": settings.base_url,
        "model": settings.selected_model,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.client.settings_path = Some(dir.path().join("settings.json"));
        config
    }

    #[test]
    fn test_set_then_load() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);

        set_settings(
            &config,
            ConfigUpdate {
                api_key: Some("sk-test-abcdefgh".to_string()),
                model: Some("gpt-4o".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let saved = FileSettingsStore::new(dir.path().join("settings.json"))
            .load()
            .unwrap();
        assert_eq!(saved.api_key, "sk-test-abcdefgh");
        assert_eq!(saved.selected_model, "gpt-4o");
        assert_eq!(saved.base_url, "https://api.openai.com/v1/");
    }

    #[test]
    fn test_set_requires_a_change() {
        let dir = TempDir::new().unwrap();
        let err = set_settings(&config_in(&dir), ConfigUpdate::default()).unwrap_err();
        assert!(err.to_string().contains("Nothing to change"));
    }

    #[test]
    fn test_settings_json_masks_key() {
        let settings = ConnectionSettings {
            api_key: "sk-secret-value-1234".to_string(),
            ..Default::default()
        };
        let json = settings_json(&settings).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("sk-s...1234"));
    }

    #[test]
    fn test_show_settings_with_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(show_settings(&config_in(&dir), true).is_ok());
    }
}
