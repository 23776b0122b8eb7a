//! The task that sits between a generator's increment stream and the caller.
//!
//! A [`Relay`] is the only writer of its result channel.  It forwards every
//! increment, accumulates the reply text and appends the assistant message
//! once the stream finishes.  By then the caller has long since returned, so
//! failures here are logged and counted rather than returned.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::chat::config::PartialStreamPolicy;
use crate::generate::{IncrementReceiver, IncrementSender};
use crate::history::HistoryStore;
use crate::observability::{
    RELAY_BYTES, RELAY_CANCELLED, RELAY_CONSUMER_GONE, RELAY_HANGUPS, RELAY_INCREMENTS,
    RELAY_PERSIST_ERRORS, RELAY_STREAM_DURATION, RELAY_STREAM_ERRORS,
};
use crate::types::{Message, SessionId, StreamIncrement};

/// How a relay finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The generator sent its final increment.
    Completed {
        /// The full reply.
        text: String,
        /// Whether the reply reached the history store.
        persisted: bool,
    },
    /// The generator closed its stream without a final increment.
    HungUp {
        /// Whatever text arrived before the hang-up.
        text: String,
        /// Whether the partial reply reached the history store.
        persisted: bool,
    },
    /// The generator reported an error.
    Failed {
        /// Whether partial text was kept.
        persisted: bool,
    },
    /// The turn was cancelled; nothing was persisted.
    Cancelled,
}

enum Forward {
    Sent,
    ConsumerGone,
    Cancelled,
}

/// Forwards one streaming reply and persists it.
pub struct Relay {
    history: Arc<dyn HistoryStore>,
    session_id: SessionId,
    cancel: CancellationToken,
    partial_policy: PartialStreamPolicy,
    source: IncrementReceiver,
    sink: Option<IncrementSender>,
}

impl Relay {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        session_id: SessionId,
        cancel: CancellationToken,
        partial_policy: PartialStreamPolicy,
        source: IncrementReceiver,
        sink: IncrementSender,
    ) -> Self {
        Self {
            history,
            session_id,
            cancel,
            partial_policy,
            source,
            sink: Some(sink),
        }
    }

    /// Run the relay on its own task.
    pub fn spawn(self) -> JoinHandle<RelayOutcome> {
        tokio::spawn(self.run())
    }

    /// Drive the stream to its end.
    ///
    /// The result channel closes when this returns.
    pub async fn run(mut self) -> RelayOutcome {
        let started = Instant::now();
        let mut text = String::new();
        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    break self.cancelled(&text);
                }
                next = self.source.recv() => next,
            };

            let Some(increment) = next else {
                RELAY_HANGUPS.click();
                warn!(session = %self.session_id, bytes = text.len(), "generator hung up before finishing");
                let persisted = self.persist(&text);
                break RelayOutcome::HungUp { text, persisted };
            };
            RELAY_INCREMENTS.click();

            if let Some(err) = increment.error.clone() {
                RELAY_STREAM_ERRORS.click();
                warn!(session = %self.session_id, error = %err, "stream failed");
                if let Forward::Cancelled = self.forward(increment).await {
                    break self.cancelled(&text);
                }
                let persisted = match self.partial_policy {
                    PartialStreamPolicy::Persist if !text.is_empty() => self.persist(&text),
                    _ => false,
                };
                break RelayOutcome::Failed { persisted };
            }

            RELAY_BYTES.count(increment.text.len() as u64);
            text.push_str(&increment.text);

            if increment.done {
                let persisted = self.persist(&text);
                self.forward(increment).await;
                debug!(session = %self.session_id, bytes = text.len(), "stream completed");
                break RelayOutcome::Completed { text, persisted };
            }

            if let Forward::Cancelled = self.forward(increment).await {
                break self.cancelled(&text);
            }
        };
        RELAY_STREAM_DURATION.add(started.elapsed().as_secs_f64());
        outcome
    }

    async fn forward(&mut self, increment: StreamIncrement) -> Forward {
        let Some(sink) = &self.sink else {
            return Forward::ConsumerGone;
        };
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Forward::Cancelled,
            sent = sink.send(increment) => sent,
        };
        match sent {
            Ok(()) => Forward::Sent,
            Err(_) => {
                RELAY_CONSUMER_GONE.click();
                debug!(session = %self.session_id, "consumer went away; draining without forwarding");
                self.sink = None;
                Forward::ConsumerGone
            }
        }
    }

    fn cancelled(&self, text: &str) -> RelayOutcome {
        RELAY_CANCELLED.click();
        debug!(session = %self.session_id, bytes = text.len(), "stream cancelled; reply abandoned");
        RelayOutcome::Cancelled
    }

    fn persist(&self, text: &str) -> bool {
        match self
            .history
            .append_message(&self.session_id, Message::assistant(text))
        {
            Ok(()) => true,
            Err(err) => {
                RELAY_PERSIST_ERRORS.click();
                error!(session = %self.session_id, error = %err, "could not persist streamed reply");
                false
            }
        }
    }
}
