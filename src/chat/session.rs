//! The interactive read-dispatch loop.
//!
//! A [`Session`] reads a line, decides what it means, and either runs a chat
//! turn or handles it locally.  Turn failures are rendered and the loop goes
//! back to reading; only input failures end it.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use serde_json::to_writer_pretty;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chat::commands::{ChatCommand, help_text, parse_command};
use crate::chat::config::ChatConfig;
use crate::chat::indicator::ThinkingIndicator;
use crate::chat::input::{Input, Interrupter, LineSource};
use crate::chat::service::ChatService;
use crate::error::{Error, Result};
use crate::render::Console;
use crate::types::{Role, SessionId};
use crate::utils::time::clock;

/// Where the loop is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next line.
    AwaitingInput,
    /// A line was read and needs classifying.
    Dispatch(String),
    /// A message is being answered.
    Processing(String),
    /// The display is being cleared.
    ScreenClear,
    /// The user asked to leave.
    ExitRequested,
}

/// Aggregated stats for a chat session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionStats {
    /// The session's identifier.
    pub session_id: SessionId,
    /// Messages recorded so far.
    pub message_count: usize,
    /// Turns attempted, whether or not they succeeded.
    pub turns: usize,
    /// Whether replies are streamed.
    pub streaming: bool,
}

/// An interactive chat session bound to one history.
pub struct Session<I: LineSource> {
    service: ChatService,
    console: Console,
    input: I,
    interrupter: Interrupter,
    session_id: SessionId,
    display_name: String,
    assistant_name: String,
    streaming: bool,
    indicator_interval: Duration,
    turns: usize,
}

impl<I: LineSource> Session<I> {
    /// Create a session and allocate its history.
    pub fn new(
        service: ChatService,
        console: Console,
        input: I,
        config: &ChatConfig,
    ) -> Result<Self> {
        let history = service.create_session()?;
        Ok(Self {
            service,
            console,
            input,
            interrupter: Interrupter::new(),
            session_id: history.id,
            display_name: config.display_name.clone(),
            assistant_name: config.assistant_name.clone(),
            streaming: config.streaming,
            indicator_interval: config.indicator_interval,
            turns: 0,
        })
    }

    /// Share an interrupter, typically one wired to a Ctrl+C handler.
    pub fn with_interrupter(mut self, interrupter: Interrupter) -> Self {
        self.interrupter = interrupter;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn stats(&self) -> Result<SessionStats> {
        let history = self.service.history().get_session(&self.session_id)?;
        Ok(SessionStats {
            session_id: self.session_id,
            message_count: history.len(),
            turns: self.turns,
            streaming: self.streaming,
        })
    }

    /// Run until the user exits or input fails.
    ///
    /// Cancelling `cancel` aborts the turn in flight and ends the session
    /// before the next read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Input`] when the line source fails, including at end
    /// of input.
    pub async fn start(&mut self, cancel: &CancellationToken) -> Result<()> {
        let prompt = format!("{}> ", self.display_name);
        let mut state = SessionState::AwaitingInput;
        loop {
            state = match state {
                SessionState::AwaitingInput => {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    match self.input.read_line(&prompt).await.map_err(as_input_error)? {
                        Input::Line(line) => SessionState::Dispatch(line),
                        Input::Interrupted => {
                            self.console
                                .print_secondary("(type exit or press Ctrl+D to quit)");
                            SessionState::AwaitingInput
                        }
                    }
                }
                SessionState::Dispatch(line) => self.dispatch(&line),
                SessionState::Processing(text) => {
                    self.take_turn(cancel, &text).await;
                    SessionState::AwaitingInput
                }
                SessionState::ScreenClear => {
                    self.console.clear_screen();
                    SessionState::AwaitingInput
                }
                SessionState::ExitRequested => return Ok(()),
            };
        }
    }

    fn dispatch(&mut self, line: &str) -> SessionState {
        let text = line.trim();
        if text.is_empty() {
            return SessionState::AwaitingInput;
        }
        match parse_command(text) {
            Some(ChatCommand::Exit) => SessionState::ExitRequested,
            Some(ChatCommand::Clear) => SessionState::ScreenClear,
            Some(command) => {
                self.run_command(command);
                SessionState::AwaitingInput
            }
            None => SessionState::Processing(text.to_string()),
        }
    }

    fn run_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Help => {
                for line in help_text().lines() {
                    self.console.print_info(line);
                }
            }
            ChatCommand::History => self.print_history(),
            ChatCommand::Save(path) => match self.save_transcript(Path::new(&path)) {
                Ok(()) => self
                    .console
                    .print_success(&format!("Transcript saved to {path}")),
                Err(err) => self.console.print_error(&err.to_string()),
            },
            ChatCommand::Stream(on) => {
                self.streaming = on;
                let mode = if on { "enabled" } else { "disabled" };
                self.console.print_info(&format!("Streaming {mode}."));
            }
            ChatCommand::Stats => match self.stats() {
                Ok(stats) => {
                    self.console
                        .print_info(&format!("Session: {}", stats.session_id.short()));
                    self.console
                        .print_info(&format!("Messages: {}", stats.message_count));
                    self.console.print_info(&format!("Turns: {}", stats.turns));
                    let mode = if stats.streaming { "streaming" } else { "blocking" };
                    self.console.print_info(&format!("Mode: {mode}"));
                }
                Err(err) => self.console.print_error(&err.to_string()),
            },
            ChatCommand::Invalid(message) => self.console.print_error(&message),
            ChatCommand::Exit | ChatCommand::Clear => {}
        }
    }

    fn print_history(&self) {
        let history = match self.service.history().get_session(&self.session_id) {
            Ok(history) => history,
            Err(err) => {
                self.console.print_error(&err.to_string());
                return;
            }
        };
        if history.is_empty() {
            self.console.print_info("No messages yet.");
            return;
        }
        for message in &history.messages {
            let speaker = match message.role {
                Role::User => &self.display_name,
                Role::Assistant => &self.assistant_name,
            };
            self.console.print_secondary(&format!(
                "[{}] {speaker}: {}",
                clock(message.generated_at),
                message.text
            ));
        }
    }

    fn save_transcript(&self, path: &Path) -> Result<()> {
        let history = self.service.history().get_session(&self.session_id)?;
        let file = File::create(path)
            .map_err(|e| Error::io(format!("could not create {}", path.display()), e))?;
        let mut writer = BufWriter::new(file);
        to_writer_pretty(&mut writer, &history)?;
        writer
            .flush()
            .map_err(|e| Error::io(format!("could not write {}", path.display()), e))
    }

    async fn take_turn(&mut self, cancel: &CancellationToken, text: &str) {
        self.turns += 1;
        let turn = cancel.child_token();
        self.interrupter.arm(turn.clone());
        let indicator =
            ThinkingIndicator::start(self.console.clone(), self.indicator_interval, turn.clone());

        let result = if self.streaming {
            self.streaming_turn(&turn, text, indicator).await
        } else {
            self.blocking_turn(&turn, text, indicator).await
        };
        self.interrupter.disarm();

        if let Err(err) = result {
            if err.is_cancelled() {
                debug!(session = %self.session_id, "turn cancelled");
            } else {
                warn!(session = %self.session_id, error = %err, "turn failed");
            }
            self.render_error(&err);
        }
    }

    async fn blocking_turn(
        &self,
        turn: &CancellationToken,
        text: &str,
        indicator: ThinkingIndicator,
    ) -> Result<()> {
        let reply = self.service.chat(turn, &self.session_id, text).await;
        indicator.stop().await;
        let reply = reply?;
        self.console.begin_response(&self.assistant_name);
        self.console.print_text(&reply.text);
        self.console.finish_response();
        Ok(())
    }

    async fn streaming_turn(
        &self,
        turn: &CancellationToken,
        text: &str,
        indicator: ThinkingIndicator,
    ) -> Result<()> {
        let mut increments = match self
            .service
            .chat_streaming(turn, &self.session_id, text)
            .await
        {
            Ok(increments) => increments,
            Err(err) => {
                indicator.stop().await;
                return Err(err);
            }
        };

        let mut started = false;
        let mut failure = None;
        while let Some(increment) = increments.recv().await {
            if let Some(err) = increment.error {
                failure = Some(err);
                continue;
            }
            if increment.text.is_empty() {
                continue;
            }
            if !started {
                self.console.begin_response(&self.assistant_name);
                started = true;
            }
            self.console.print_text(&increment.text);
        }
        indicator.stop().await;
        if started {
            self.console.finish_response();
        }

        if let Some(err) = failure {
            return Err(err);
        }
        if turn.is_cancelled() {
            return Err(Error::cancelled("turn cancelled"));
        }
        Ok(())
    }

    fn render_error(&self, err: &Error) {
        if let Some(reply) = err.unsaved_reply_text() {
            self.console.begin_response(&self.assistant_name);
            self.console.print_text(reply);
            self.console.finish_response();
            self.console
                .print_warning("this reply could not be saved to the history");
        } else if err.is_cancelled() {
            self.console.print_warning("Cancelled.");
        } else {
            self.console.print_error(&err.to_string());
        }
    }
}

fn as_input_error(err: Error) -> Error {
    if err.is_input() {
        err
    } else {
        Error::input("could not read input", Some(Box::new(err)))
    }
}
