//! The chat turn: record what the user said, generate, record the reply.

use std::sync::Arc;
use std::time::Instant;

use biometrics::Counter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chat::config::{ChatConfig, ContextPolicy, PartialStreamPolicy};
use crate::chat::relay::{Relay, RelayOutcome};
use crate::error::{Error, Result};
use crate::generate::{DEFAULT_STREAM_CAPACITY, Generator, IncrementReceiver, increment_channel};
use crate::history::HistoryStore;
use crate::observability::{
    CHAT_CANCELLED, CHAT_GENERATION_ERRORS, CHAT_STREAMING_TURNS, CHAT_TURN_DURATION, CHAT_TURNS,
};
use crate::types::{AssistantReply, ChatHistory, Message, SessionId};

/// Per-service policy knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatOptions {
    /// Which messages the generator sees.
    pub context_policy: ContextPolicy,
    /// Fate of partial text when a stream fails.
    pub partial_stream_policy: PartialStreamPolicy,
    /// Capacity of the result channel returned by streaming turns.
    pub stream_capacity: usize,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            context_policy: ContextPolicy::default(),
            partial_stream_policy: PartialStreamPolicy::default(),
            stream_capacity: DEFAULT_STREAM_CAPACITY,
        }
    }
}

impl From<&ChatConfig> for ChatOptions {
    fn from(config: &ChatConfig) -> Self {
        Self {
            context_policy: config.context_policy,
            partial_stream_policy: config.partial_stream_policy,
            stream_capacity: config.stream_capacity,
        }
    }
}

/// Runs chat turns against a generator, persisting both sides to a history store.
///
/// The service holds no per-session state; many sessions may share one
/// service concurrently.
#[derive(Clone)]
pub struct ChatService {
    generator: Arc<dyn Generator>,
    history: Arc<dyn HistoryStore>,
    options: ChatOptions,
}

impl ChatService {
    pub fn new(generator: Arc<dyn Generator>, history: Arc<dyn HistoryStore>) -> Self {
        Self {
            generator,
            history,
            options: ChatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ChatOptions {
        self.options
    }

    /// The store this service writes to.
    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    /// Allocate a fresh session in the history store.
    pub fn create_session(&self) -> Result<ChatHistory> {
        self.history.create_session()
    }

    /// Run one blocking turn.
    ///
    /// # Errors
    ///
    /// - [`Error::HistoryWrite`] without an unsaved reply if the user message
    ///   could not be recorded; the generator is not called.
    /// - [`Error::Generation`] if the generator failed; nothing further is
    ///   recorded.
    /// - [`Error::Cancelled`] if `cancel` fired first.
    /// - [`Error::HistoryWrite`] carrying the reply text if the reply was
    ///   generated but could not be recorded.
    pub async fn chat(
        &self,
        cancel: &CancellationToken,
        session_id: &SessionId,
        user_text: &str,
    ) -> Result<AssistantReply> {
        CHAT_TURNS.click();
        let started = Instant::now();
        let context = self.record_user(session_id, user_text)?;
        debug!(session = %session_id, messages = context.len(), "generating reply");

        let reply = self
            .generator
            .generate(cancel, &context)
            .await
            .map_err(wrap_generation_error)?;
        if cancel.is_cancelled() {
            return Err(Error::cancelled("turn cancelled"));
        }

        self.history
            .append_message(session_id, Message::assistant(reply.text.clone()))
            .map_err(|err| {
                Error::unsaved_reply(
                    "reply generated but not recorded",
                    reply.text.clone(),
                    Some(Box::new(err)),
                )
            })?;
        CHAT_TURN_DURATION.add(started.elapsed().as_secs_f64());
        debug!(session = %session_id, bytes = reply.text.len(), "turn complete");
        Ok(reply)
    }

    /// Start one streaming turn and return its increments.
    ///
    /// Returns as soon as the generator has accepted the request; a relay task
    /// forwards increments and records the reply when the stream finishes.
    /// Errors are as for [`ChatService::chat`], limited to what can go wrong
    /// before the stream starts.
    pub async fn chat_streaming(
        &self,
        cancel: &CancellationToken,
        session_id: &SessionId,
        user_text: &str,
    ) -> Result<IncrementReceiver> {
        let (increments, _relay) = self
            .chat_streaming_with_handle(cancel, session_id, user_text)
            .await?;
        Ok(increments)
    }

    /// Like [`ChatService::chat_streaming`], also returning the relay's handle.
    pub async fn chat_streaming_with_handle(
        &self,
        cancel: &CancellationToken,
        session_id: &SessionId,
        user_text: &str,
    ) -> Result<(IncrementReceiver, JoinHandle<RelayOutcome>)> {
        CHAT_STREAMING_TURNS.click();
        let context = self.record_user(session_id, user_text)?;
        debug!(session = %session_id, messages = context.len(), "streaming reply");

        let source = self
            .generator
            .generate_stream(cancel, &context)
            .await
            .map_err(wrap_generation_error)?;
        let (sink, increments) = increment_channel(self.options.stream_capacity);
        let relay = Relay::new(
            Arc::clone(&self.history),
            *session_id,
            cancel.clone(),
            self.options.partial_stream_policy,
            source,
            sink,
        )
        .spawn();
        Ok((increments, relay))
    }

    /// Append the user message and return the context to generate from.
    fn record_user(&self, session_id: &SessionId, user_text: &str) -> Result<Vec<Message>> {
        let message = Message::user(user_text);
        self.history
            .append_message(session_id, message.clone())
            .map_err(|err| {
                Error::history_write("could not record user message", Some(Box::new(err)))
            })?;
        match self.options.context_policy {
            ContextPolicy::CurrentTurn => Ok(vec![message]),
            ContextPolicy::FullTranscript => self
                .history
                .get_session(session_id)
                .map(|history| history.messages)
                .map_err(|err| {
                    Error::history_write("could not read transcript", Some(Box::new(err)))
                }),
        }
    }
}

fn wrap_generation_error(err: Error) -> Error {
    error_counter(&err).click();
    if err.is_cancelled() || err.is_generation() {
        err
    } else {
        Error::generation("generation failed", Some(Box::new(err)))
    }
}

fn error_counter(err: &Error) -> &'static Counter {
    if err.is_cancelled() {
        &CHAT_CANCELLED
    } else {
        &CHAT_GENERATION_ERRORS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryHistoryStore;
    use crate::testutil::{FlakyHistory, Script, ScriptedGenerator};
    use crate::types::{Role, StreamIncrement};

    fn service(
        generator: Arc<ScriptedGenerator>,
        history: Arc<dyn HistoryStore>,
    ) -> ChatService {
        ChatService::new(generator, history)
    }

    #[tokio::test]
    async fn turns_alternate_in_history() {
        let generator = ScriptedGenerator::new(
            (0..3).map(|i| Script::Reply(format!("reply {i}"))),
        );
        let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());
        let chat = service(generator, history.clone());
        let session = chat.create_session().unwrap().id;
        let cancel = CancellationToken::new();

        for i in 0..3 {
            let reply = chat.chat(&cancel, &session, &format!("say {i}")).await.unwrap();
            assert_eq!(reply.text, format!("reply {i}"));
        }

        let messages = history.get_session(&session).unwrap().messages;
        assert_eq!(messages.len(), 6);
        for (i, pair) in messages.chunks(2).enumerate() {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[0].text, format!("say {i}"));
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].text, format!("reply {i}"));
        }
    }

    #[tokio::test]
    async fn context_policy_controls_what_is_sent() {
        let generator =
            ScriptedGenerator::new([Script::Reply("a".into()), Script::Reply("b".into())]);
        let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());
        let chat = service(generator.clone(), history).with_options(ChatOptions {
            context_policy: ContextPolicy::FullTranscript,
            ..ChatOptions::default()
        });
        let session = chat.create_session().unwrap().id;
        let cancel = CancellationToken::new();
        chat.chat(&cancel, &session, "one").await.unwrap();
        chat.chat(&cancel, &session, "two").await.unwrap();

        let calls = generator.calls();
        assert_eq!(calls[0].len(), 1);
        let texts: Vec<&str> = calls[1].iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "a", "two"]);
    }

    #[tokio::test]
    async fn current_turn_sends_only_new_message() {
        let generator =
            ScriptedGenerator::new([Script::Reply("a".into()), Script::Reply("b".into())]);
        let chat = service(generator.clone(), Arc::new(MemoryHistoryStore::new()));
        let session = chat.create_session().unwrap().id;
        let cancel = CancellationToken::new();
        chat.chat(&cancel, &session, "one").await.unwrap();
        chat.chat(&cancel, &session, "two").await.unwrap();

        let calls = generator.calls();
        assert_eq!(calls[1].len(), 1);
        assert_eq!(calls[1][0].text, "two");
    }

    #[tokio::test]
    async fn failed_user_append_skips_generation() {
        let generator = ScriptedGenerator::new([Script::Reply("unused".into())]);
        let chat = service(generator.clone(), FlakyHistory::failing_on(Role::User));
        let session = chat.create_session().unwrap().id;

        let err = chat
            .chat(&CancellationToken::new(), &session, "hello")
            .await
            .unwrap_err();
        assert!(err.is_history_write());
        assert!(err.unsaved_reply_text().is_none());
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_reply_append_carries_reply() {
        let generator = ScriptedGenerator::new([Script::Reply("the answer".into())]);
        let history = FlakyHistory::failing_on(Role::Assistant);
        let chat = service(generator, history.clone());
        let session = chat.create_session().unwrap().id;

        let err = chat
            .chat(&CancellationToken::new(), &session, "question")
            .await
            .unwrap_err();
        assert!(err.is_history_write());
        assert_eq!(err.unsaved_reply_text(), Some("the answer"));
        assert_eq!(history.get_session(&session).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn generation_failure_is_wrapped() {
        let generator = ScriptedGenerator::new([Script::Fail(Error::rate_limit("slow down", None))]);
        let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());
        let chat = service(generator, history.clone());
        let session = chat.create_session().unwrap().id;

        let err = chat
            .chat(&CancellationToken::new(), &session, "hi")
            .await
            .unwrap_err();
        assert!(err.is_generation());
        assert!(err.to_string().contains("slow down"));
        let messages = history.get_session(&session).unwrap().messages;
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_user());
    }

    #[tokio::test]
    async fn unreadable_transcript_is_a_history_write_error() {
        let generator = ScriptedGenerator::new([Script::Reply("unused".into())]);
        let chat = service(generator.clone(), FlakyHistory::failing_reads()).with_options(
            ChatOptions {
                context_policy: ContextPolicy::FullTranscript,
                ..ChatOptions::default()
            },
        );
        let session = chat.create_session().unwrap().id;

        let err = chat
            .chat(&CancellationToken::new(), &session, "hello")
            .await
            .unwrap_err();
        assert!(err.is_history_write());
        assert!(err.unsaved_reply_text().is_none());
        assert!(generator.calls().is_empty());
    }

    #[test]
    fn cancellation_is_not_counted_as_generation_error() {
        let cancelled = Error::cancelled("turn cancelled");
        assert!(std::ptr::eq(error_counter(&cancelled), &CHAT_CANCELLED));
        let failed = Error::generation("boom", None);
        assert!(std::ptr::eq(error_counter(&failed), &CHAT_GENERATION_ERRORS));
        assert!(wrap_generation_error(cancelled).is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_turn_records_no_reply() {
        let generator = ScriptedGenerator::new([Script::Pending]);
        let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());
        let chat = service(generator, history.clone());
        let session = chat.create_session().unwrap().id;
        let cancel = CancellationToken::new();

        let turn = chat.chat(&cancel, &session, "hi");
        cancel.cancel();
        let err = turn.await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(history.get_session(&session).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_session_is_a_history_write_error() {
        let chat = service(
            ScriptedGenerator::new([]),
            Arc::new(MemoryHistoryStore::new()),
        );
        let err = chat
            .chat(&CancellationToken::new(), &SessionId::generate(), "hi")
            .await
            .unwrap_err();
        assert!(err.is_history_write());
    }

    #[tokio::test]
    async fn streaming_turn_persists_after_done() {
        let generator = ScriptedGenerator::new([Script::Stream(vec![
            StreamIncrement::text("Hel"),
            StreamIncrement::text("lo"),
            StreamIncrement::done("!"),
        ])]);
        let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());
        let chat = service(generator, history.clone());
        let session = chat.create_session().unwrap().id;

        let mut rx = chat
            .chat_streaming(&CancellationToken::new(), &session, "greet")
            .await
            .unwrap();
        let mut received = String::new();
        while let Some(increment) = rx.recv().await {
            received.push_str(&increment.text);
        }
        assert_eq!(received, "Hello!");

        let messages = history.get_session(&session).unwrap().messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "Hello!");
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn streaming_start_failure_is_synchronous() {
        let generator = ScriptedGenerator::new([Script::StreamFail(Error::authentication(
            "bad key",
        ))]);
        let chat = service(generator, Arc::new(MemoryHistoryStore::new()));
        let session = chat.create_session().unwrap().id;
        let err = chat
            .chat_streaming(&CancellationToken::new(), &session, "hi")
            .await
            .unwrap_err();
        assert!(err.is_generation());
    }

    #[tokio::test]
    async fn concurrent_sessions_stay_separate() {
        let generator = ScriptedGenerator::new((0..8).map(|_| Script::Reply("ok".into())));
        let history: Arc<dyn HistoryStore> = Arc::new(MemoryHistoryStore::new());
        let chat = service(generator, history.clone());
        let sessions: Vec<SessionId> = (0..4).map(|_| chat.create_session().unwrap().id).collect();

        let mut tasks = Vec::new();
        for session in sessions.clone() {
            let chat = chat.clone();
            tasks.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                for turn in 0..2 {
                    chat.chat(&cancel, &session, &format!("{session} {turn}"))
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for session in sessions {
            let messages = history.get_session(&session).unwrap().messages;
            assert_eq!(messages.len(), 4);
            assert_eq!(messages[0].text, format!("{session} 0"));
            assert_eq!(messages[2].text, format!("{session} 1"));
        }
    }
}
