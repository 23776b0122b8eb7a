//! Error types for colloquy.
//!
//! One error enum covers the chat core (history, generation, streaming, input)
//! and the HTTP transport that backs the bundled generator.  The core only ever
//! constructs the first group; transport errors reach callers wrapped inside a
//! [`Error::Generation`] or carried by a failed stream increment.

use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::sync::Arc;

/// The main error type for colloquy.
#[derive(Clone, Debug)]
pub enum Error {
    /// Persisting a message to history failed.
    HistoryWrite {
        /// Human-readable error message.
        message: String,
        /// Reply text that was generated but could not be saved, if any.
        unsaved_reply: Option<String>,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// The generation backend failed to produce a reply.
    Generation {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A stream failed after it started delivering increments.
    Stream {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Reading user input failed or input ended.
    Input {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// A session identifier is unknown to the history store.
    NotFound {
        /// Human-readable error message.
        message: String,
        /// The session that was looked up.
        session_id: Option<String>,
    },

    /// The history store backing failed (resource exhaustion and similar).
    Storage {
        /// Human-readable error message.
        message: String,
    },

    /// The operation was cancelled before it completed.
    Cancelled {
        /// Human-readable error message.
        message: String,
    },

    /// Invalid configuration.
    Config {
        /// Human-readable error message.
        message: String,
        /// Setting that failed validation.
        param: Option<String>,
    },

    /// A generic API error returned by the provider.
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error type string from the API.
        error_type: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Request ID for debugging and support.
        request_id: Option<String>,
    },

    /// Authentication error.
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// Rate limit exceeded.
    RateLimit {
        /// Human-readable error message.
        message: String,
        /// Time to wait before retrying, in seconds.
        retry_after: Option<u64>,
    },

    /// API timeout error.
    Timeout {
        /// Human-readable error message.
        message: String,
        /// Duration of the timeout in seconds.
        duration: Option<f64>,
    },

    /// Connection error.
    Connection {
        /// Human-readable error message.
        message: String,
        /// Underlying cause.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// Error during JSON or YAML serialization or deserialization.
    Serialization {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },

    /// I/O error.
    Io {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Arc<io::Error>,
    },

    /// HTTP client error.
    HttpClient {
        /// Human-readable error message.
        message: String,
        /// The underlying error.
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Creates a new history write error.
    pub fn history_write(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HistoryWrite {
            message: message.into(),
            unsaved_reply: None,
            source: source.map(Arc::from),
        }
    }

    /// Creates a history write error for a reply that was generated but not saved.
    pub fn unsaved_reply(
        message: impl Into<String>,
        reply: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HistoryWrite {
            message: message.into(),
            unsaved_reply: Some(reply.into()),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new generation error.
    pub fn generation(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Generation {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new stream error.
    pub fn stream(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Stream {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new input error.
    pub fn input(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Input {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new not found error.
    pub fn not_found(message: impl Into<String>, session_id: Option<String>) -> Self {
        Error::NotFound {
            message: message.into(),
            session_id,
        }
    }

    /// Creates a new storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Error::Storage {
            message: message.into(),
        }
    }

    /// Creates a new cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Error::Cancelled {
            message: message.into(),
        }
    }

    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>, param: Option<String>) -> Self {
        Error::Config {
            message: message.into(),
            param,
        }
    }

    /// Creates a new API error.
    pub fn api(
        status_code: u16,
        error_type: Option<String>,
        message: String,
        request_id: Option<String>,
    ) -> Self {
        Error::Api {
            status_code,
            error_type,
            message,
            request_id,
        }
    }

    /// Creates a new authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
        }
    }

    /// Creates a new rate limit error.
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates a new timeout error.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    /// Creates a new connection error.
    pub fn connection(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new serialization error.
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Creates a new I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new HTTP client error.
    pub fn http_client(
        message: impl Into<String>,
        source: Option<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Returns true if persisting to history failed.
    pub fn is_history_write(&self) -> bool {
        matches!(self, Error::HistoryWrite { .. })
    }

    /// Returns true if the generation backend failed.
    pub fn is_generation(&self) -> bool {
        matches!(self, Error::Generation { .. })
    }

    /// Returns true if a stream failed mid-delivery.
    pub fn is_stream(&self) -> bool {
        matches!(self, Error::Stream { .. })
    }

    /// Returns true if reading input failed.
    pub fn is_input(&self) -> bool {
        matches!(self, Error::Input { .. })
    }

    /// Returns true if this error is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Returns true if the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// Returns true if this error is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config { .. })
    }

    /// Returns true if this error is related to authentication.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }

    /// Returns the reply that was generated but could not be saved, if any.
    pub fn unsaved_reply_text(&self) -> Option<&str> {
        match self {
            Error::HistoryWrite { unsaved_reply, .. } => unsaved_reply.as_deref(),
            _ => None,
        }
    }

    /// Returns the status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::HistoryWrite { message, .. } => {
                write!(f, "History write error: {message}")
            }
            Error::Generation { message, source } => {
                if let Some(source) = source {
                    write!(f, "Generation error: {message}: {source}")
                } else {
                    write!(f, "Generation error: {message}")
                }
            }
            Error::Stream { message, .. } => {
                write!(f, "Stream error: {message}")
            }
            Error::Input { message, .. } => {
                write!(f, "Input error: {message}")
            }
            Error::NotFound {
                message,
                session_id,
            } => {
                if let Some(session_id) = session_id {
                    write!(f, "Session not found: {message} [ID: {session_id}]")
                } else {
                    write!(f, "Session not found: {message}")
                }
            }
            Error::Storage { message } => {
                write!(f, "Storage error: {message}")
            }
            Error::Cancelled { message } => {
                write!(f, "Cancelled: {message}")
            }
            Error::Config { message, param } => {
                if let Some(param) = param {
                    write!(f, "Configuration error: {message} (setting: {param})")
                } else {
                    write!(f, "Configuration error: {message}")
                }
            }
            Error::Api {
                message,
                error_type,
                request_id,
                ..
            } => match (error_type, request_id) {
                (Some(error_type), Some(request_id)) => {
                    write!(f, "{error_type}: {message} (Request ID: {request_id})")
                }
                (Some(error_type), None) => write!(f, "{error_type}: {message}"),
                (None, Some(request_id)) => {
                    write!(f, "API error: {message} (Request ID: {request_id})")
                }
                (None, None) => write!(f, "API error: {message}"),
            },
            Error::Authentication { message } => {
                write!(f, "Authentication error: {message}")
            }
            Error::RateLimit {
                message,
                retry_after,
            } => {
                if let Some(retry_after) = retry_after {
                    write!(
                        f,
                        "Rate limit exceeded: {message} (retry after {retry_after} seconds)"
                    )
                } else {
                    write!(f, "Rate limit exceeded: {message}")
                }
            }
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "Timeout error: {message} ({duration} seconds)")
                } else {
                    write!(f, "Timeout error: {message}")
                }
            }
            Error::Connection { message, .. } => {
                write!(f, "Connection error: {message}")
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::HttpClient { message, .. } => {
                write!(f, "HTTP client error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::HistoryWrite { source, .. }
            | Error::Generation { source, .. }
            | Error::Stream { source, .. }
            | Error::Input { source, .. }
            | Error::Connection { source, .. }
            | Error::Serialization { source, .. }
            | Error::HttpClient { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(format!("YAML error: {err}"), Some(Box::new(err)))
    }
}

impl From<Utf8Error> for Error {
    fn from(err: Utf8Error) -> Self {
        Error::serialization(format!("UTF-8 error: {err}"), Some(Box::new(err)))
    }
}

/// A specialized Result type for colloquy operations.
pub type Result<T> = std::result::Result<T, Error>;
