//! Interactive chat application.
//!
//! This binary provides a REPL for chatting with a model over the Anthropic
//! Messages API, streaming replies as they are generated.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings (reads COLLOQUY_API_KEY)
//! colloquy-chat
//!
//! # Specify a model and a system prompt
//! colloquy-chat --model claude-sonnet-4-0 --system "You are a helpful coding assistant"
//!
//! # Wait for whole replies, and send the full transcript each turn
//! colloquy-chat --no-stream --full-context
//!
//! # Load settings from a YAML file; flags still win
//! colloquy-chat --config colloquy.yaml
//! ```
//!
//! Type `exit` to leave, `clear` to clear the screen, or `/help` for the rest.
//! Ctrl+C while a reply is generating cancels that reply.  Logs go to stderr
//! and are filtered with `RUST_LOG` (default `warn`).

use std::sync::Arc;

use arrrg::CommandLine;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use colloquy::chat::{
    ChatArgs, ChatConfig, ChatOptions, ChatService, Console, Interrupter, PlainTextRenderer,
    RustylineSource, Session,
};
use colloquy::{Anthropic, MemoryHistoryStore};

/// Main entry point for the colloquy-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();

    let (args, _) = ChatArgs::from_command_line_relaxed("colloquy-chat [OPTIONS]");
    let config = ChatConfig::resolve(args)?;

    let generator = Anthropic::with_options(
        None,
        config.base_url.clone(),
        Some(config.request_timeout),
    )?
    .with_model(config.model.clone())
    .with_max_tokens(config.max_tokens)
    .with_system_prompt(config.system_prompt.clone())
    .with_stream_capacity(config.stream_capacity);
    let service = ChatService::new(Arc::new(generator), Arc::new(MemoryHistoryStore::new()))
        .with_options(ChatOptions::from(&config));

    let console = Console::new(PlainTextRenderer::with_color(config.use_color));
    let interrupter = Interrupter::new();
    let handler = interrupter.clone();
    ctrlc::set_handler(move || {
        handler.interrupt();
    })?;

    let mut session = Session::new(service, console.clone(), RustylineSource::new()?, &config)?
        .with_interrupter(interrupter);

    console.print_primary(&format!("Colloquy (model: {})", config.model));
    console.print_secondary("Type /help for commands, exit to quit");

    match session.start(&CancellationToken::new()).await {
        Ok(()) => {}
        Err(err) if err.is_input() => tracing::debug!(error = %err, "input closed"),
        Err(err) => return Err(err.into()),
    }
    console.print_primary("Goodbye!");
    Ok(())
}
