//! Command parsing for the chat application.
//!
//! The bare words `exit` and `clear` and a handful of `/` commands control the
//! session itself; anything else is a message for the assistant.

/// A parsed chat command.
///
/// These commands control the chat session and are never sent to the
/// generator.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// End the session.
    Exit,

    /// Clear the display.
    Clear,

    /// Display help information.
    Help,

    /// Print this session's messages.
    History,

    /// Save the transcript to a file as JSON.
    Save(String),

    /// Switch between streaming and blocking delivery.
    Stream(bool),

    /// Display session statistics.
    Stats,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for commands.
///
/// Returns `Some(ChatCommand)` if the input controls the session,
/// or `None` if it should be sent as a regular message.
///
/// # Examples
///
/// ```
/// # use colloquy::chat::{parse_command, ChatCommand};
/// assert_eq!(parse_command("  EXIT "), Some(ChatCommand::Exit));
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Exit));
/// assert!(parse_command("Hello there").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if input.eq_ignore_ascii_case("exit") {
        return Some(ChatCommand::Exit);
    }
    if input.eq_ignore_ascii_case("clear") {
        return Some(ChatCommand::Clear);
    }

    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "quit" | "exit" | "q" => ChatCommand::Exit,
        "clear" => ChatCommand::Clear,
        "help" | "?" => ChatCommand::Help,
        "history" => ChatCommand::History,
        "stats" | "status" => ChatCommand::Stats,
        "save" => match argument {
            Some(arg) => ChatCommand::Save(arg.to_string()),
            None => ChatCommand::Invalid("/save requires a file path".to_string()),
        },
        "stream" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Stream(value),
            None => ChatCommand::Invalid("/stream expects 'on' or 'off'".to_string()),
        },
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  exit, /quit            Exit the chat
  clear, /clear          Clear the screen
  /history               Show this session's messages
  /save <file>           Save the transcript as JSON
  /stream on|off         Stream replies or wait for them whole
  /stats                 Show session statistics
  /help                  Show this help message
Press Ctrl+C while a reply is generating to cancel it."#
}
