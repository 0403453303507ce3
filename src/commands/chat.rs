//! Interactive chat session
//!
//! A readline loop over a [`ChatController`]. Plain lines are sent as chat
//! messages and the reply is printed token by token from the controller's
//! update broadcast; `/` lines are session commands.

use std::io::Write;
use std::sync::Arc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::broadcast::error::RecvError;

use super::models::output_models_table;
use super::settings::print_settings;
use super::special_commands::{parse_special_command, print_help, SpecialCommand};
use crate::config::Config;
use crate::error::Result;
use crate::settings::ConfigUpdate;
use crate::store::{ChatController, ChatEntry, ChatUpdate, SendOutcome};
use crate::vendor::Role;

/// Start interactive chat mode
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
/// * `embedded` - Start a relay in-process instead of using `client.proxy_url`
///
/// # Examples
///
/// ```
/// use chatrelay::commands::chat;
/// use chatrelay::config::Config;
///
/// // In application code:
/// // chat::run_chat(Config::default(), true).await?;
/// ```
pub async fn run_chat(config: Config, embedded: bool) -> Result<()> {
    let session = super::open_session(&config, embedded).await?;
    let controller = session.controller.clone();

    let mut rl = DefaultEditor::new()?;
    print_welcome_banner(&controller);

    if controller.settings().has_api_key() {
        controller.refresh_models().await;
    } else {
        println!(
            "{}",
            "No API key set. Use /key <api_key> to add one.\n".yellow()
        );
    }

    loop {
        let prompt = format!("[{}] >> ", controller.settings().selected_model);
        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);

                let command = match parse_special_command(trimmed) {
                    Ok(command) => command,
                    Err(e) => {
                        eprintln!("{}\n", e.to_string().red());
                        continue;
                    }
                };

                match command {
                    SpecialCommand::Exit => break,
                    SpecialCommand::None => stream_reply(&controller, trimmed).await,
                    other => handle_special_command(&controller, other).await,
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                tracing::error!("Readline error: {:?}", err);
                break;
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn handle_special_command(controller: &ChatController, command: SpecialCommand) {
    match command {
        SpecialCommand::Help => print_help(),
        SpecialCommand::Clear => {
            controller.clear_messages();
            println!("{}\n", "Conversation cleared.".cyan());
        }
        SpecialCommand::ListModels => {
            let models = controller.refresh_models().await;
            output_models_table(&models, &controller.settings().selected_model);
        }
        SpecialCommand::ShowSettings => {
            print_settings(&controller.settings());
            println!();
        }
        SpecialCommand::SwitchModel(model) => {
            apply_update(
                controller,
                ConfigUpdate {
                    model: Some(model),
                    ..Default::default()
                },
            )
            .await
        }
        SpecialCommand::SetApiKey(api_key) => {
            apply_update(
                controller,
                ConfigUpdate {
                    api_key: Some(api_key),
                    ..Default::default()
                },
            )
            .await
        }
        SpecialCommand::SetBaseUrl(base_url) => {
            apply_update(
                controller,
                ConfigUpdate {
                    base_url: Some(base_url),
                    ..Default::default()
                },
            )
            .await
        }
        SpecialCommand::Exit | SpecialCommand::None => {}
    }
}

async fn apply_update(controller: &ChatController, update: ConfigUpdate) {
    // Failures were already reported through the notifier
    if let Err(e) = controller.update_config(update).await {
        tracing::debug!("Settings update failed: {:#}", e);
    }
}

/// Send one message and print the reply as it streams
///
/// If the display falls behind the update broadcast, live printing stops
/// and the rest of the reply is printed from the transcript at the end.
async fn stream_reply(controller: &Arc<ChatController>, text: &str) {
    let mut updates = controller.subscribe();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        let mut printed = String::new();
        let mut lagged = false;
        loop {
            match updates.recv().await {
                Ok(ChatUpdate::Chunk { text, .. }) if !lagged => {
                    if printed.is_empty() {
                        print!("\n{} ", "assistant>".green().bold());
                    }
                    print!("{}", text);
                    let _ = stdout.flush();
                    printed.push_str(&text);
                }
                Ok(ChatUpdate::Finished { .. })
                | Ok(ChatUpdate::Failed { .. })
                | Ok(ChatUpdate::Cleared) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Display fell behind by {} updates", skipped);
                    lagged = true;
                }
                Err(RecvError::Closed) => break,
            }
        }
        printed
    });

    let outcome = controller.send_message(text).await;

    let printed = match outcome {
        SendOutcome::Completed | SendOutcome::Stopped | SendOutcome::Abandoned => {
            printer.await.unwrap_or_default()
        }
        SendOutcome::Busy | SendOutcome::Ignored | SendOutcome::MissingApiKey => {
            printer.abort();
            String::new()
        }
    };

    let reply = match outcome {
        SendOutcome::Completed | SendOutcome::Stopped => last_reply(&controller.entries()),
        _ => None,
    };
    let tail = reply.as_deref().map(|r| unprinted_tail(r, &printed)).unwrap_or("");
    if printed.is_empty() && !tail.is_empty() {
        print!("\n{} ", "assistant>".green().bold());
    }
    print!("{}", tail);

    let shown_any = !printed.is_empty() || !tail.is_empty();
    if shown_any {
        println!();
    }
    if outcome == SendOutcome::Stopped && shown_any {
        println!("{}", "[stopped]".yellow());
    }
    println!();
}

/// Content of the trailing assistant entry, if the transcript ends in one
fn last_reply(entries: &[ChatEntry]) -> Option<String> {
    entries
        .last()
        .filter(|entry| entry.message.role == Role::Assistant)
        .map(|entry| entry.message.content.clone())
}

/// Part of `reply` not yet shown, given the prefix already printed
fn unprinted_tail<'a>(reply: &'a str, printed: &str) -> &'a str {
    reply.strip_prefix(printed).unwrap_or("")
}

/// Display welcome banner at the start of interactive chat mode
fn print_welcome_banner(controller: &ChatController) {
    let settings = controller.settings();

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║              ChatRelay Interactive Chat - Welcome!           ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");
    println!("Model:    {}", settings.selected_model.cyan());
    println!("Endpoint: {}\n", settings.base_url);
    println!("Type '/help' for available commands, 'exit' to quit\n");
}
