//! Command-line interface definition for ChatRelay
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for running the relay proxy, chatting, listing
//! models, and managing connection settings.

use clap::{Parser, Subcommand};

/// ChatRelay - streaming chat client and local SSE relay proxy
///
/// Chat with any OpenAI-compatible Chat Completions API through a small
/// local proxy that re-streams tokens as Server-Sent Events.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatrelay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Relay proxy base URL used by client commands
    #[arg(long)]
    pub proxy_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for ChatRelay
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the relay proxy server
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Start an interactive chat session
    Chat {
        /// Run a relay proxy inside this process instead of using a separate one
        #[arg(short, long)]
        embedded: bool,
    },

    /// List models available for the saved API key
    Models {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,

        /// Run a relay proxy inside this process instead of using a separate one
        #[arg(short, long)]
        embedded: bool,
    },

    /// Show or change the saved connection settings
    Settings {
        /// Settings subcommand
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

/// Settings subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Show the saved settings (API key masked)
    Show {
        /// Print settings as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change one or more saved settings
    Set {
        /// Vendor API key
        #[arg(long)]
        api_key: Option<String>,

        /// Vendor base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Model used for new conversations
        #[arg(short, long)]
        model: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            proxy_url: None,
            command: Commands::Settings {
                command: SettingsCommand::Show { json: false },
            },
        }
    }
}
