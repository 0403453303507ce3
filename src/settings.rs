//! Persisted connection settings
//!
//! The API key, vendor base URL, and selected model survive restarts. They
//! are stored as a flat JSON object of string values under the keys
//! `openai-api-key`, `openai-base-url`, and `openai-model`. Missing keys fall
//! back to defaults and empty values are never written.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Vendor base URL used when none has been saved
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
/// Model selected when none has been saved
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const KEY_API_KEY: &str = "openai-api-key";
const KEY_BASE_URL: &str = "openai-base-url";
const KEY_MODEL: &str = "openai-model";

/// Connection settings of the chat client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Vendor API key; empty when unset
    pub api_key: String,
    /// Vendor base URL
    pub base_url: String,
    /// Model used for new generations
    pub selected_model: String,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            selected_model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl ConnectionSettings {
    /// Whether a non-blank API key is set
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// API key with everything but the first and last four characters hidden
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::ConnectionSettings;
    ///
    /// let mut settings = ConnectionSettings::default();
    /// assert_eq!(settings.masked_api_key(), "(not set)");
    ///
    /// settings.api_key = "sk-abcdefghijkl".to_string();
    /// assert_eq!(settings.masked_api_key(), "sk-a...ijkl");
    /// ```
    pub fn masked_api_key(&self) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return "(not set)".to_string();
        }
        let chars: Vec<char> = key.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }

    /// Merge an update into these settings
    ///
    /// Returns `true` when the API key or base URL changed, which means the
    /// model list has to be refreshed.
    pub fn apply(&mut self, update: ConfigUpdate) -> bool {
        let mut connection_changed = false;

        if let Some(api_key) = update.api_key {
            connection_changed |= api_key != self.api_key;
            self.api_key = api_key;
        }
        if let Some(base_url) = update.base_url {
            connection_changed |= base_url != self.base_url;
            self.base_url = base_url;
        }
        if let Some(model) = update.model {
            self.selected_model = model;
        }

        connection_changed
    }

    fn from_entries(entries: &BTreeMap<String, String>) -> Self {
        let defaults = Self::default();
        let value = |key: &str, fallback: String| {
            entries
                .get(key)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .unwrap_or(fallback)
        };

        Self {
            api_key: value(KEY_API_KEY, defaults.api_key),
            base_url: value(KEY_BASE_URL, defaults.base_url),
            selected_model: value(KEY_MODEL, defaults.selected_model),
        }
    }

    fn to_entries(&self) -> BTreeMap<String, String> {
        [
            (KEY_API_KEY, &self.api_key),
            (KEY_BASE_URL, &self.base_url),
            (KEY_MODEL, &self.selected_model),
        ]
        .into_iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }
}

/// Partial settings change; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    /// New API key
    pub api_key: Option<String>,
    /// New vendor base URL
    pub base_url: Option<String>,
    /// New selected model
    pub model: Option<String>,
}

impl ConfigUpdate {
    /// Whether the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.api_key.is_none() && self.base_url.is_none() && self.model.is_none()
    }
}

/// Durable key-value storage for [`ConnectionSettings`]
pub trait SettingsStore: Send + Sync {
    /// Load settings, falling back to defaults for anything not stored
    fn load(&self) -> Result<ConnectionSettings>;

    /// Persist settings; empty values are skipped
    fn save(&self, settings: &ConnectionSettings) -> Result<()>;
}

/// Settings stored in a JSON file
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    /// Create a store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Platform config location, e.g. `~/.config/chatrelay/settings.json`
    ///
    /// # Errors
    ///
    /// Returns error if no home directory can be determined
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "chatrelay").ok_or_else(|| {
            RelayError::Config("Unable to determine a configuration directory".to_string())
        })?;
        Ok(dirs.config_dir().join("settings.json"))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<ConnectionSettings> {
        if !self.path.exists() {
            tracing::debug!(
                "Settings file {} not found, using defaults",
                self.path.display()
            );
            return Ok(ConnectionSettings::default());
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            RelayError::Config(format!(
                "Failed to read settings file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let entries: BTreeMap<String, String> = serde_json::from_str(&contents)
            .map_err(|e| RelayError::Config(format!("Failed to parse settings file: {}", e)))?;

        Ok(ConnectionSettings::from_entries(&entries))
    }

    fn save(&self, settings: &ConnectionSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(&settings.to_entries())?;
        std::fs::write(&self.path, contents)?;

        tracing::debug!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

/// In-memory settings store
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemorySettingsStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `settings`
    pub fn with_settings(settings: &ConnectionSettings) -> Self {
        Self {
            entries: Mutex::new(settings.to_entries()),
        }
    }

    /// Raw stored entries
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<ConnectionSettings> {
        Ok(ConnectionSettings::from_entries(&self.entries()))
    }

    fn save(&self, settings: &ConnectionSettings) -> Result<()> {
        *self.entries.lock().unwrap_or_else(PoisonError::into_inner) = settings.to_entries();
        Ok(())
    }
}
