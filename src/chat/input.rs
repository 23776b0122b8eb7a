//! Where the session's lines come from, and how Ctrl+C reaches a turn.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// One read from a [`LineSource`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// A line, without its terminator.
    Line(String),
    /// The user pressed Ctrl+C at the prompt.
    Interrupted,
}

/// A blocking source of user input lines.
#[async_trait::async_trait]
pub trait LineSource: Send {
    /// Show `prompt` and wait for one line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Input`] at end of input or if the source fails.
    async fn read_line(&mut self, prompt: &str) -> Result<Input>;
}

/// Terminal input through `rustyline`, read on the blocking pool.
pub struct RustylineSource {
    editor: Option<DefaultEditor>,
}

impl RustylineSource {
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new()
            .map_err(|e| Error::input("could not start line editor", Some(Box::new(e))))?;
        Ok(Self {
            editor: Some(editor),
        })
    }
}

#[async_trait::async_trait]
impl LineSource for RustylineSource {
    async fn read_line(&mut self, prompt: &str) -> Result<Input> {
        let mut editor = self
            .editor
            .take()
            .ok_or_else(|| Error::input("line editor is unavailable", None))?;
        let prompt = prompt.to_string();
        let (editor, line) = tokio::task::spawn_blocking(move || {
            let line = editor.readline(&prompt);
            if let Ok(line) = &line
                && !line.trim().is_empty()
            {
                let _ = editor.add_history_entry(line.as_str());
            }
            (editor, line)
        })
        .await
        .map_err(|e| Error::input("line reader stopped", Some(Box::new(e))))?;
        self.editor = Some(editor);

        match line {
            Ok(line) => Ok(Input::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Err(Error::input("end of input", None)),
            Err(e) => Err(Error::input("could not read input", Some(Box::new(e)))),
        }
    }
}

/// Input played back from memory; ends with an end-of-input error.
#[derive(Debug, Default)]
pub struct ScriptedInput {
    entries: VecDeque<Input>,
    prompts: Vec<String>,
}

impl ScriptedInput {
    pub fn new(entries: impl IntoIterator<Item = Input>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            prompts: Vec::new(),
        }
    }

    pub fn from_lines<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self::new(lines.into_iter().map(|line| Input::Line(line.into())))
    }

    /// Prompts shown so far.
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

#[async_trait::async_trait]
impl LineSource for ScriptedInput {
    async fn read_line(&mut self, prompt: &str) -> Result<Input> {
        self.prompts.push(prompt.to_string());
        self.entries
            .pop_front()
            .ok_or_else(|| Error::input("end of input", None))
    }
}

/// Routes an interrupt to whichever turn is in flight.
///
/// The session arms it with the turn's token while a turn runs and disarms it
/// afterwards; an interrupt with nothing armed does nothing.
#[derive(Clone, Debug, Default)]
pub struct Interrupter {
    armed: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&self, token: CancellationToken) {
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    pub fn disarm(&self) {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Cancel the armed turn, returning whether there was one.
    pub fn interrupt(&self) -> bool {
        match self
            .armed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_input_ends_with_input_error() {
        let mut input = ScriptedInput::from_lines(["one"]);
        assert_eq!(
            input.read_line("> ").await.unwrap(),
            Input::Line("one".to_string())
        );
        assert!(input.read_line("> ").await.unwrap_err().is_input());
        assert_eq!(input.prompts(), ["> ", "> "]);
    }

    #[test]
    fn interrupter_cancels_only_armed_token() {
        let interrupter = Interrupter::new();
        assert!(!interrupter.interrupt());

        let token = CancellationToken::new();
        interrupter.arm(token.clone());
        assert!(interrupter.clone().interrupt());
        assert!(token.is_cancelled());
        assert!(!interrupter.interrupt());
    }

    #[test]
    fn disarmed_turn_is_left_alone() {
        let interrupter = Interrupter::new();
        let token = CancellationToken::new();
        interrupter.arm(token.clone());
        interrupter.disarm();
        assert!(!interrupter.interrupt());
        assert!(!token.is_cancelled());
    }
}
