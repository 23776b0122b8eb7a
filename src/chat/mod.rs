//! Interactive chat built on a [`Generator`](crate::Generator) and a
//! [`HistoryStore`](crate::HistoryStore).
//!
//! # Architecture
//!
//! - [`service`]: one chat turn, blocking or streaming
//! - [`relay`]: the task that forwards and persists a streamed reply
//! - [`session`]: the read-dispatch loop
//! - [`indicator`]: the spinner shown while a turn runs
//! - [`input`]: line sources and the Ctrl+C interrupter
//! - [`commands`]: command parsing
//! - [`config`]: CLI argument parsing and configuration

pub mod commands;
pub mod config;
pub mod indicator;
pub mod input;
pub mod relay;
pub mod service;
pub mod session;

pub use crate::render::{Console, PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, ChatConfigFile, ContextPolicy, PartialStreamPolicy};
pub use indicator::ThinkingIndicator;
pub use input::{Input, Interrupter, LineSource, RustylineSource, ScriptedInput};
pub use relay::{Relay, RelayOutcome};
pub use service::{ChatOptions, ChatService};
pub use session::{Session, SessionState, SessionStats};
