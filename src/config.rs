//! Configuration management for ChatRelay
//!
//! This module handles loading, parsing, and validating configuration
//! from YAML files, environment variables, and command-line arguments.
//! Later sources win: file, then environment, then CLI flags.

use crate::cli::{Cli, Commands};
use crate::error::{RelayError, Result};
use crate::settings::{FileSettingsStore, DEFAULT_BASE_URL};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

/// Main configuration structure for ChatRelay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Relay proxy server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Vendor connection settings used by the proxy
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Terminal client settings
    #[serde(default)]
    pub client: ClientConfig,
}

/// Relay proxy server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Socket address built from `host` and `port`
    ///
    /// # Errors
    ///
    /// Returns error if `host` is not an IP address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|e| {
            RelayError::Config(format!("Invalid server host '{}': {}", self.host, e))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Vendor connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL used when a request does not carry one
    #[serde(default = "default_base_url")]
    pub default_base_url: String,

    /// Connect timeout for vendor requests
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// User agent sent to the vendor
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("chatrelay/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            default_base_url: default_base_url(),
            connect_timeout_seconds: default_connect_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Terminal client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the relay API
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,

    /// Settings file location; the platform config directory when unset
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
}

fn default_proxy_url() -> String {
    "http://127.0.0.1:5000/api".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: default_proxy_url(),
            settings_path: None,
        }
    }
}

impl ClientConfig {
    /// Resolve the settings file location
    ///
    /// # Errors
    ///
    /// Returns error if no path is configured and no platform config
    /// directory exists
    pub fn settings_path(&self) -> Result<PathBuf> {
        match &self.settings_path {
            Some(path) => Ok(path.clone()),
            None => FileSettingsStore::default_path(),
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            client: ClientConfig::default(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        // Plain PORT first so the prefixed variable wins when both are set
        if let Ok(port) = std::env::var("PORT") {
            self.apply_port_var("PORT", &port);
        }
        if let Ok(port) = std::env::var("CHATRELAY_PORT") {
            self.apply_port_var("CHATRELAY_PORT", &port);
        }

        if let Ok(host) = std::env::var("CHATRELAY_HOST") {
            self.server.host = host;
        }

        if let Ok(base_url) = std::env::var("CHATRELAY_BASE_URL") {
            self.upstream.default_base_url = base_url;
        }

        if let Ok(timeout) = std::env::var("CHATRELAY_TIMEOUT_SECONDS") {
            match timeout.parse::<u64>() {
                Ok(seconds) => self.upstream.connect_timeout_seconds = seconds,
                Err(_) => tracing::warn!(
                    "Ignoring invalid CHATRELAY_TIMEOUT_SECONDS value: {}",
                    timeout
                ),
            }
        }

        if let Ok(proxy_url) = std::env::var("CHATRELAY_PROXY_URL") {
            self.client.proxy_url = proxy_url;
        }

        if let Ok(settings_path) = std::env::var("CHATRELAY_SETTINGS_PATH") {
            self.client.settings_path = Some(PathBuf::from(settings_path));
        }
    }

    fn apply_port_var(&mut self, name: &str, value: &str) {
        match value.parse::<u16>() {
            Ok(port) => self.server.port = port,
            Err(_) => tracing::warn!("Ignoring invalid {} value: {}", name, value),
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(proxy_url) = &cli.proxy_url {
            self.client.proxy_url = proxy_url.clone();
        }

        if let Commands::Serve { host, port } = &cli.command {
            if let Some(host) = host {
                self.server.host = host.clone();
            }
            if let Some(port) = port {
                self.server.port = *port;
            }
        }
    }

    /// Validate the configuration
    ///
    /// Ensures the server address, timeouts, and URLs are usable.
    ///
    /// # Returns
    ///
    /// Returns Ok if configuration is valid
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(RelayError::Config("server.port must be greater than 0".to_string()).into());
        }

        self.server.socket_addr()?;

        if self.upstream.connect_timeout_seconds == 0 {
            return Err(RelayError::Config(
                "upstream.connect_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        validate_http_url("upstream.default_base_url", &self.upstream.default_base_url)?;
        validate_http_url("client.proxy_url", &self.client.proxy_url)?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| RelayError::Config(format!("{} is not a valid URL ({}): {}", field, value, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(RelayError::Config(format!(
            "{} must use http or https, got '{}'",
            field, other
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;
    use tempfile::TempDir;

    const ENV_VARS: [&str; 8] = [
        "PORT",
        "CHATRELAY_PORT",
        "CHATRELAY_HOST",
        "CHATRELAY_BASE_URL",
        "CHATRELAY_TIMEOUT_SECONDS",
        "CHATRELAY_PROXY_URL",
        "CHATRELAY_SETTINGS_PATH",
        "RUST_LOG",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.upstream.default_base_url, "https://api.openai.com/v1/");
        assert_eq!(config.client.proxy_url, "http://127.0.0.1:5000/api");
        assert!(config.client.settings_path.is_none());
    }

    #[test]
    fn test_config_validation_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_host() {
        let mut config = Config::default();
        config.server.host = "not an ip".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.upstream.connect_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_bad_urls() {
        let mut config = Config::default();
        config.upstream.default_base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.client.proxy_url = "ftp://example.com/api".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
server:
  port: 8080
upstream:
  default_base_url: "http://localhost:11434/v1"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.upstream.default_base_url, "http://localhost:11434/v1");
        assert_eq!(config.upstream.connect_timeout_seconds, 30);
        assert_eq!(config.client.proxy_url, "http://127.0.0.1:5000/api");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "client:\n  proxy_url: \"http://127.0.0.1:7000/api\"\n").unwrap();

        let config = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap();
        assert_eq!(config.client.proxy_url, "http://127.0.0.1:7000/api");
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        clear_env();
        let config = Config::load("/nonexistent/config.yaml", &Cli::default()).unwrap();
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    #[serial]
    fn test_load_invalid_yaml_fails() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server: [unclosed").unwrap();

        let err = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("PORT", "6000");
        std::env::set_var("CHATRELAY_HOST", "0.0.0.0");
        std::env::set_var("CHATRELAY_BASE_URL", "http://localhost:8080/v1");
        std::env::set_var("CHATRELAY_TIMEOUT_SECONDS", "5");
        std::env::set_var("CHATRELAY_PROXY_URL", "http://127.0.0.1:6000/api");
        std::env::set_var("CHATRELAY_SETTINGS_PATH", "/tmp/chatrelay-settings.json");

        let config = Config::load("/nonexistent/config.yaml", &Cli::default()).unwrap();
        clear_env();

        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.upstream.default_base_url, "http://localhost:8080/v1");
        assert_eq!(config.upstream.connect_timeout_seconds, 5);
        assert_eq!(config.client.proxy_url, "http://127.0.0.1:6000/api");
        assert_eq!(
            config.client.settings_path,
            Some(PathBuf::from("/tmp/chatrelay-settings.json"))
        );
    }

    #[test]
    #[serial]
    fn test_prefixed_port_wins_over_plain_port() {
        clear_env();
        std::env::set_var("PORT", "6000");
        std::env::set_var("CHATRELAY_PORT", "7000");

        let config = Config::load("/nonexistent/config.yaml", &Cli::default()).unwrap();
        clear_env();

        assert_eq!(config.server.port, 7000);
    }

    #[test]
    #[serial]
    fn test_invalid_env_values_are_ignored() {
        clear_env();
        std::env::set_var("PORT", "not-a-port");
        std::env::set_var("CHATRELAY_TIMEOUT_SECONDS", "soon");

        let config = Config::load("/nonexistent/config.yaml", &Cli::default()).unwrap();
        clear_env();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.upstream.connect_timeout_seconds, 30);
    }

    #[test]
    #[serial]
    fn test_cli_overrides_win_over_env() {
        clear_env();
        std::env::set_var("CHATRELAY_PORT", "7000");

        let cli = Cli::try_parse_from([
            "chatrelay",
            "--proxy-url",
            "http://127.0.0.1:9999/api",
            "serve",
            "--port",
            "8000",
            "--host",
            "0.0.0.0",
        ])
        .unwrap();
        let config = Config::load("/nonexistent/config.yaml", &cli).unwrap();
        clear_env();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.client.proxy_url, "http://127.0.0.1:9999/api");
    }

    #[test]
    fn test_settings_path_prefers_configured_value() {
        let client = ClientConfig {
            settings_path: Some(PathBuf::from("/tmp/x.json")),
            ..Default::default()
        };
        assert_eq!(client.settings_path().unwrap(), PathBuf::from("/tmp/x.json"));
    }
}
