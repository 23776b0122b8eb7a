use crate::Error;

/// One fragment of a streamed reply.
///
/// `done` and `error` are terminal signals and never appear together: an
/// increment carrying an error is a failure no matter what `done` says.
#[derive(Debug, Clone, Default)]
pub struct StreamIncrement {
    /// Text fragment, possibly empty.
    pub text: String,

    /// Set on the final increment of a successful stream.
    pub done: bool,

    /// Set on the final increment of a failed stream.
    pub error: Option<Error>,
}

impl StreamIncrement {
    /// A non-terminal text fragment.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: false,
            error: None,
        }
    }

    /// The terminal increment of a successful stream, with its last fragment.
    pub fn done(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            done: true,
            error: None,
        }
    }

    /// The terminal increment of a failed stream.
    pub fn failed(error: Error) -> Self {
        Self {
            text: String::new(),
            done: false,
            error: Some(error),
        }
    }

    /// Returns true if this increment ends the stream.
    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }

    /// Returns true if this increment reports a failure.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_shapes() {
        assert!(!StreamIncrement::text("a").is_terminal());
        assert!(StreamIncrement::done("").is_terminal());
        let failed = StreamIncrement::failed(Error::stream("reset", None));
        assert!(failed.is_terminal());
        assert!(failed.is_error());
        assert!(!failed.done);
    }
}
