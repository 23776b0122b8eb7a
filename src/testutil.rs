//! Fakes shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::generate::{Generator, IncrementReceiver, increment_channel};
use crate::history::{HistoryStore, MemoryHistoryStore};
use crate::render::Renderer;
use crate::types::{AssistantReply, ChatHistory, Message, Role, SessionId, StreamIncrement};

/// One scripted generator response.
#[derive(Debug)]
pub enum Script {
    Reply(String),
    Fail(Error),
    /// Sent in order; the stream hangs up afterwards unless the last one is terminal.
    Stream(Vec<StreamIncrement>),
    /// Returned from `generate_stream` before any increment.
    StreamFail(Error),
    /// Never answers; waits for cancellation.
    Pending,
}

/// A generator that plays back a script and records what it was asked.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedGenerator {
    pub fn new(script: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::default(),
        })
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self, messages: &[Message]) -> Option<Script> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.script.lock().unwrap().pop_front()
    }
}

#[async_trait::async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
    ) -> Result<AssistantReply> {
        match self.next(messages) {
            Some(Script::Reply(text)) => Ok(AssistantReply::new(text)),
            Some(Script::Fail(err)) => Err(err),
            Some(Script::Pending) => {
                cancel.cancelled().await;
                Err(Error::cancelled("request cancelled"))
            }
            Some(other) => Err(Error::generation(
                format!("unexpected blocking call for {other:?}"),
                None,
            )),
            None => Err(Error::generation("script exhausted", None)),
        }
    }

    async fn generate_stream(
        &self,
        cancel: &CancellationToken,
        messages: &[Message],
    ) -> Result<IncrementReceiver> {
        match self.next(messages) {
            Some(Script::Stream(increments)) => {
                let (tx, rx) = increment_channel(increments.len().max(1));
                tokio::spawn(async move {
                    for increment in increments {
                        if tx.send(increment).await.is_err() {
                            return;
                        }
                    }
                });
                Ok(rx)
            }
            Some(Script::StreamFail(err)) => Err(err),
            Some(Script::Pending) => {
                let (tx, rx) = increment_channel(1);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    drop(tx);
                });
                Ok(rx)
            }
            Some(other) => Err(Error::generation(
                format!("unexpected streaming call for {other:?}"),
                None,
            )),
            None => Err(Error::generation("script exhausted", None)),
        }
    }
}

/// A history store whose appends fail for one role.
pub struct FlakyHistory {
    inner: MemoryHistoryStore,
    fail_role: Option<Role>,
    fail_reads: bool,
}

impl FlakyHistory {
    pub fn failing_on(fail_role: Role) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryHistoryStore::new(),
            fail_role: Some(fail_role),
            fail_reads: false,
        })
    }

    pub fn failing_reads() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryHistoryStore::new(),
            fail_role: None,
            fail_reads: true,
        })
    }
}

impl HistoryStore for FlakyHistory {
    fn create_session(&self) -> Result<ChatHistory> {
        self.inner.create_session()
    }

    fn append_message(&self, session_id: &SessionId, message: Message) -> Result<()> {
        if Some(message.role) == self.fail_role {
            return Err(Error::storage("disk full"));
        }
        self.inner.append_message(session_id, message)
    }

    fn get_session(&self, session_id: &SessionId) -> Result<ChatHistory> {
        if self.fail_reads {
            return Err(Error::storage("read failed"));
        }
        self.inner.get_session(session_id)
    }

    fn list_sessions(&self) -> Vec<ChatHistory> {
        self.inner.list_sessions()
    }

    fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        self.inner.delete_session(session_id)
    }
}

/// Everything a [`RecordingRenderer`] was asked to draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Drawn {
    Primary(String),
    Secondary(String),
    Info(String),
    Success(String),
    Warning(String),
    Error(String),
    Begin(String),
    Text(String),
    Finish,
    Frame(String),
    ClearThinking,
    ClearScreen,
}

/// A renderer that records calls instead of drawing.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    drawn: Arc<Mutex<Vec<Drawn>>>,
}

impl RecordingRenderer {
    pub fn drawn(&self) -> Vec<Drawn> {
        self.drawn.lock().unwrap().clone()
    }

    /// Drawn calls without indicator noise.
    pub fn output(&self) -> Vec<Drawn> {
        self.drawn()
            .into_iter()
            .filter(|d| !matches!(d, Drawn::Frame(_) | Drawn::ClearThinking))
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.drawn()
            .into_iter()
            .filter_map(|d| match d {
                Drawn::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    fn push(&self, drawn: Drawn) {
        self.drawn.lock().unwrap().push(drawn);
    }
}

impl Renderer for RecordingRenderer {
    fn print_primary(&mut self, text: &str) {
        self.push(Drawn::Primary(text.to_string()));
    }

    fn print_secondary(&mut self, text: &str) {
        self.push(Drawn::Secondary(text.to_string()));
    }

    fn print_info(&mut self, info: &str) {
        self.push(Drawn::Info(info.to_string()));
    }

    fn print_success(&mut self, text: &str) {
        self.push(Drawn::Success(text.to_string()));
    }

    fn print_warning(&mut self, warning: &str) {
        self.push(Drawn::Warning(warning.to_string()));
    }

    fn print_error(&mut self, error: &str) {
        self.push(Drawn::Error(error.to_string()));
    }

    fn begin_response(&mut self, label: &str) {
        self.push(Drawn::Begin(label.to_string()));
    }

    fn print_text(&mut self, text: &str) {
        self.push(Drawn::Text(text.to_string()));
    }

    fn finish_response(&mut self) {
        self.push(Drawn::Finish);
    }

    fn print_thinking_frame(&mut self, frame: &str) {
        self.push(Drawn::Frame(frame.to_string()));
    }

    fn clear_thinking(&mut self) {
        self.push(Drawn::ClearThinking);
    }

    fn clear_screen(&mut self) {
        self.push(Drawn::ClearScreen);
    }
}
