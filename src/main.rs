//! ChatRelay - streaming chat client and local SSE relay proxy
//!
#![doc = "ChatRelay - streaming chat client and local SSE relay proxy"]
#![doc = "Main entry point for the chatrelay binary."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatrelay::cli::{Cli, Commands, SettingsCommand};
use chatrelay::commands;
use chatrelay::config::Config;
use chatrelay::settings::ConfigUpdate;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse first so -v and --json-logs shape the subscriber
    let cli = Cli::parse_args();

    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!("Starting relay proxy");
            commands::serve::run_serve(config).await?;
            Ok(())
        }
        Commands::Chat { embedded } => {
            tracing::info!("Starting interactive chat mode");
            if embedded {
                tracing::debug!("Using embedded relay proxy");
            }
            commands::chat::run_chat(config, embedded).await?;
            Ok(())
        }
        Commands::Models { json, embedded } => {
            commands::models::list_models(&config, json, embedded).await?;
            Ok(())
        }
        Commands::Settings { command } => match command {
            SettingsCommand::Show { json } => {
                commands::settings::show_settings(&config, json)?;
                Ok(())
            }
            SettingsCommand::Set {
                api_key,
                base_url,
                model,
            } => {
                let update = ConfigUpdate {
                    api_key,
                    base_url,
                    model,
                };
                commands::settings::set_settings(&config, update)?;
                Ok(())
            }
        },
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose {
        "chatrelay=debug"
    } else {
        "chatrelay=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Logs go to stderr so stdout stays clean for replies and --json output
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
