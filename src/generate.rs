//! The generation capability the chat core drives.
//!
//! A [`Generator`] turns a list of role-tagged messages into a reply, either
//! in one blocking call or as a channel of [`StreamIncrement`]s.  The core is
//! agnostic to what sits behind it; [`crate::client::Anthropic`] is the
//! bundled HTTP implementation.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{AssistantReply, Message, StreamIncrement};

/// Default capacity of increment channels.
pub const DEFAULT_STREAM_CAPACITY: usize = 64;

/// Receiving half of an increment stream.
///
/// The stream is finite and cannot be restarted; it ends after a terminal
/// increment or when the sender hangs up.
pub type IncrementReceiver = mpsc::Receiver<StreamIncrement>;

/// Sending half of an increment stream.
pub type IncrementSender = mpsc::Sender<StreamIncrement>;

/// Create a bounded increment channel.
pub fn increment_channel(capacity: usize) -> (IncrementSender, IncrementReceiver) {
    mpsc::channel(capacity.max(1))
}

/// A text-generation backend.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    /// Generate a complete reply in one call.
    ///
    /// Implementations should stop work promptly once `cancel` fires.
    async fn generate(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
    ) -> Result<AssistantReply>;

    /// Start generating a reply and return the stream of increments.
    ///
    /// Errors returned here happen before any increment is produced; failures
    /// after the stream starts arrive as an increment carrying an error.
    async fn generate_stream(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
    ) -> Result<IncrementReceiver>;
}
