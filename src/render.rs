//! Output rendering for the chat application.
//!
//! This module provides a trait-based rendering abstraction that allows
//! for different output styles, and [`Console`], the shared handle the
//! session and the thinking indicator draw through.

use std::io::{self, Stdout, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// ANSI escape code for bold text (used for reply labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for dim text (used for secondary output and the spinner).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for info and labels).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for warnings).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (used for success).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Return to column zero and erase the line.
const ERASE_LINE: &str = "\r\x1b[2K";

/// Erase the screen and home the cursor.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Trait for rendering chat output.
///
/// Leveled prints end their own line.  Reply text arrives in fragments between
/// [`Renderer::begin_response`] and [`Renderer::finish_response`].
pub trait Renderer: Send {
    /// Print ordinary output.
    fn print_primary(&mut self, text: &str);

    /// Print de-emphasized output.
    fn print_secondary(&mut self, text: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print a success message.
    fn print_success(&mut self, text: &str);

    /// Print a warning.
    fn print_warning(&mut self, warning: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Called before the first fragment of a reply.
    fn begin_response(&mut self, label: &str);

    /// Print a chunk of reply text.
    ///
    /// This is called incrementally as fragments arrive.
    fn print_text(&mut self, text: &str);

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn finish_response(&mut self);

    /// Draw one frame of the thinking indicator.
    ///
    /// Ignored while a response is being written.
    fn print_thinking_frame(&mut self, frame: &str);

    /// Erase the thinking indicator if it is showing.
    fn clear_thinking(&mut self);

    /// Clear the display.
    fn clear_screen(&mut self);
}

/// Plain text renderer with optional ANSI styling.
///
/// Writes to stdout by default; any writer works, which is how tests capture
/// the output.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    in_response: bool,
    frame_showing: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer over an arbitrary writer.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            in_response: false,
            frame_showing: false,
        }
    }

    /// Consumes the renderer, returning its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Flushes the writer to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.out.flush();
    }

    fn erase_frame(&mut self) {
        if self.frame_showing {
            let _ = write!(self.out, "{ERASE_LINE}");
            self.frame_showing = false;
        }
    }

    fn line(&mut self, style: Option<&str>, text: &str) {
        self.erase_frame();
        if self.in_response {
            let _ = writeln!(self.out);
            self.in_response = false;
        }
        let _ = match style {
            Some(style) if self.use_color => writeln!(self.out, "{style}{text}{ANSI_RESET}"),
            _ => writeln!(self.out, "{text}"),
        };
        self.flush();
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn print_primary(&mut self, text: &str) {
        self.line(None, text);
    }

    fn print_secondary(&mut self, text: &str) {
        self.line(Some(ANSI_DIM), text);
    }

    fn print_info(&mut self, info: &str) {
        self.line(Some(ANSI_CYAN), info);
    }

    fn print_success(&mut self, text: &str) {
        self.line(Some(ANSI_GREEN), text);
    }

    fn print_warning(&mut self, warning: &str) {
        self.line(Some(ANSI_YELLOW), &format!("Warning: {warning}"));
    }

    fn print_error(&mut self, error: &str) {
        self.line(Some(ANSI_RED), &format!("Error: {error}"));
    }

    fn begin_response(&mut self, label: &str) {
        self.erase_frame();
        let _ = if self.use_color {
            write!(self.out, "{ANSI_BOLD}{ANSI_CYAN}{label}:{ANSI_RESET} ")
        } else {
            write!(self.out, "{label}: ")
        };
        self.in_response = true;
        self.flush();
    }

    fn print_text(&mut self, text: &str) {
        self.erase_frame();
        let _ = write!(self.out, "{text}");
        self.flush();
    }

    fn finish_response(&mut self) {
        self.erase_frame();
        let _ = writeln!(self.out);
        self.in_response = false;
        self.flush();
    }

    fn print_thinking_frame(&mut self, frame: &str) {
        if self.in_response || !self.use_color {
            return;
        }
        let _ = write!(self.out, "\r{ANSI_DIM}{frame} thinking...{ANSI_RESET}");
        self.frame_showing = true;
        self.flush();
    }

    fn clear_thinking(&mut self) {
        self.erase_frame();
        self.flush();
    }

    fn clear_screen(&mut self) {
        self.frame_showing = false;
        self.in_response = false;
        let _ = write!(self.out, "{CLEAR_SCREEN}");
        self.flush();
    }
}

/// Shared, lockable handle to a [`Renderer`].
///
/// Every call takes the lock for its duration, so output from the session and
/// the thinking indicator never interleaves within a call.
#[derive(Clone)]
pub struct Console {
    inner: Arc<Mutex<Box<dyn Renderer>>>,
}

impl Console {
    /// Wrap a renderer.
    pub fn new(renderer: impl Renderer + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(renderer))),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut dyn Renderer) -> T) -> T {
        let mut renderer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(renderer.as_mut())
    }

    pub fn print_primary(&self, text: &str) {
        self.with(|r| r.print_primary(text))
    }

    pub fn print_secondary(&self, text: &str) {
        self.with(|r| r.print_secondary(text))
    }

    pub fn print_info(&self, info: &str) {
        self.with(|r| r.print_info(info))
    }

    pub fn print_success(&self, text: &str) {
        self.with(|r| r.print_success(text))
    }

    pub fn print_warning(&self, warning: &str) {
        self.with(|r| r.print_warning(warning))
    }

    pub fn print_error(&self, error: &str) {
        self.with(|r| r.print_error(error))
    }

    pub fn begin_response(&self, label: &str) {
        self.with(|r| r.begin_response(label))
    }

    pub fn print_text(&self, text: &str) {
        self.with(|r| r.print_text(text))
    }

    pub fn finish_response(&self) {
        self.with(|r| r.finish_response())
    }

    pub fn print_thinking_frame(&self, frame: &str) {
        self.with(|r| r.print_thinking_frame(frame))
    }

    pub fn clear_thinking(&self) {
        self.with(|r| r.clear_thinking())
    }

    pub fn clear_screen(&self) {
        self.with(|r| r.clear_screen())
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console").finish_non_exhaustive()
    }
}
