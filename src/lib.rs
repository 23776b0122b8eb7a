// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod generate;
pub mod history;
pub mod observability;
pub mod render;
pub mod sse;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testutil;

// Re-exports
pub use client::Anthropic;
pub use error::{Error, Result};
pub use generate::{Generator, IncrementReceiver, IncrementSender, increment_channel};
pub use history::{HistoryStore, MemoryHistoryStore};
pub use observability::register_biometrics;
pub use render::{Console, PlainTextRenderer, Renderer};
pub use types::*;
