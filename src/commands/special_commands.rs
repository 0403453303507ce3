//! Special commands parser for interactive chat mode
//!
//! Lines starting with `/` are session commands rather than chat messages.
//! The command word is case-insensitive; arguments (model ids, keys, URLs)
//! are kept verbatim.

use colored::Colorize;
use thiserror::Error;

/// Errors that can occur when parsing special commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command was entered
    #[error("Unknown command: {0}\n\nType '/help' to see available commands")]
    UnknownCommand(String),

    /// Command requires an argument but none was provided
    #[error("Command {command} requires an argument\n\nUsage: {usage}")]
    MissingArgument { command: String, usage: String },

    /// Command takes no argument but one was provided
    #[error("Command {command} takes no argument, got: {arg}")]
    UnexpectedArgument { command: String, arg: String },
}

/// Special commands that can be executed during interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Display help information
    Help,

    /// Clear the conversation
    Clear,

    /// Refresh and list available models
    ListModels,

    /// Select the model for new messages
    SwitchModel(String),

    /// Replace the API key
    SetApiKey(String),

    /// Replace the vendor base URL
    SetBaseUrl(String),

    /// Show the current connection settings
    ShowSettings,

    /// Exit the session
    Exit,

    /// Not a special command; send as a chat message
    None,
}

/// Parse one input line
///
/// # Examples
///
/// ```
/// use chatrelay::commands::special_commands::{parse_special_command, SpecialCommand};
///
/// assert_eq!(
///     parse_special_command("/model gpt-4o").unwrap(),
///     SpecialCommand::SwitchModel("gpt-4o".to_string())
/// );
/// assert_eq!(parse_special_command("hello").unwrap(), SpecialCommand::None);
/// ```
pub fn parse_special_command(input: &str) -> Result<SpecialCommand, CommandError> {
    let trimmed = input.trim();
    let lower = trimmed.to_lowercase();

    // Plain exit/quit work without a slash
    if lower == "exit" || lower == "quit" {
        return Ok(SpecialCommand::Exit);
    }
    if !trimmed.starts_with('/') {
        return Ok(SpecialCommand::None);
    }

    let (word, arg) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word.to_lowercase(), rest.trim()),
        None => (lower.clone(), ""),
    };

    match word.as_str() {
        "/help" | "/?" => no_argument(&word, arg, SpecialCommand::Help),
        "/clear" | "/new" => no_argument(&word, arg, SpecialCommand::Clear),
        "/models" => no_argument(&word, arg, SpecialCommand::ListModels),
        "/settings" => no_argument(&word, arg, SpecialCommand::ShowSettings),
        "/exit" | "/quit" => no_argument(&word, arg, SpecialCommand::Exit),
        "/model" => required_argument("/model", "/model <model_id>", arg)
            .map(SpecialCommand::SwitchModel),
        "/key" => required_argument("/key", "/key <api_key>", arg).map(SpecialCommand::SetApiKey),
        "/base" => {
            required_argument("/base", "/base <url>", arg).map(SpecialCommand::SetBaseUrl)
        }
        _ => Err(CommandError::UnknownCommand(trimmed.to_string())),
    }
}

fn no_argument(
    command: &str,
    arg: &str,
    parsed: SpecialCommand,
) -> Result<SpecialCommand, CommandError> {
    if arg.is_empty() {
        Ok(parsed)
    } else {
        Err(CommandError::UnexpectedArgument {
            command: command.to_string(),
            arg: arg.to_string(),
        })
    }
}

fn required_argument(command: &str, usage: &str, arg: &str) -> Result<String, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument {
            command: command.to_string(),
            usage: usage.to_string(),
        })
    } else {
        Ok(arg.to_string())
    }
}

/// Print the list of special commands
pub fn print_help() {
    println!("\n{}", "Chat commands:".bold());
    println!("  /help            Show this help");
    println!("  /clear           Start a new conversation");
    println!("  /models          Refresh and list available models");
    println!("  /model <id>      Use <id> for new messages");
    println!("  /key <api_key>   Save a new API key");
    println!("  /base <url>      Save a new vendor base URL");
    println!("  /settings        Show current settings");
    println!("  /exit            Leave the session (also: exit, quit, Ctrl-D)");
    println!();
}
