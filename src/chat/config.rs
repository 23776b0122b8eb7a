//! Configuration types for the chat application.
//!
//! Settings resolve in three layers: built-in defaults, then an optional YAML
//! file, then command-line flags parsed with `arrrg`.

use std::path::Path;
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::generate::DEFAULT_STREAM_CAPACITY;

/// Default maximum tokens per response.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Default model identifier.
const DEFAULT_MODEL: &str = "claude-haiku-4-5";

/// Default label for the user's prompt.
const DEFAULT_DISPLAY_NAME: &str = "You";

/// Default label printed before assistant replies.
const DEFAULT_ASSISTANT_NAME: &str = "Assistant";

const DEFAULT_INDICATOR_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Which messages are sent to the generator on each turn.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPolicy {
    /// Only the message the user just typed.
    #[default]
    CurrentTurn,
    /// The session's whole transcript, ending with the new message.
    FullTranscript,
}

/// What happens to text accumulated before a stream fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialStreamPolicy {
    /// Drop the partial text; history keeps only the user message.
    #[default]
    Discard,
    /// Append the partial text as an assistant message.
    Persist,
}

/// Command-line arguments for the colloquy-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Path to a YAML configuration file.
    #[arrrg(optional, "YAML configuration file", "FILE")]
    pub config: Option<String>,

    /// Model to use for chat.
    #[arrrg(optional, "Model to use (default: claude-haiku-4-5)", "MODEL")]
    pub model: Option<String>,

    /// System prompt to set context for the conversation.
    #[arrrg(optional, "System prompt for the conversation", "PROMPT")]
    pub system: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: 4096)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Label shown in the input prompt.
    #[arrrg(optional, "Name shown in the prompt (default: You)", "NAME")]
    pub name: Option<String>,

    /// Wait for whole replies instead of streaming them.
    #[arrrg(flag, "Wait for whole replies instead of streaming")]
    pub no_stream: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Send the whole transcript with every turn.
    #[arrrg(flag, "Send the whole transcript with every turn")]
    pub full_context: bool,

    /// Keep partial replies when a stream fails.
    #[arrrg(flag, "Keep partial replies when a stream fails")]
    pub keep_partial: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after layering the
/// configuration file and command-line arguments over the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Label shown in the input prompt.
    pub display_name: String,

    /// Label printed before each assistant reply.
    pub assistant_name: String,

    /// Deliver replies incrementally.
    pub streaming: bool,

    /// The model to use for generating responses.
    pub model: String,

    /// Optional system prompt to set conversation context.
    pub system_prompt: Option<String>,

    /// Maximum tokens per response.
    pub max_tokens: u32,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Which messages are sent to the generator.
    pub context_policy: ContextPolicy,

    /// Fate of partial text when a stream fails.
    pub partial_stream_policy: PartialStreamPolicy,

    /// Capacity of the relay's result channel.
    pub stream_capacity: usize,

    /// Time between thinking-indicator frames.
    pub indicator_interval: Duration,

    /// Override for the provider's base URL.
    pub base_url: Option<String>,

    /// Per-request timeout for the HTTP generator.
    pub request_timeout: Duration,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Display name: You
    /// - Streaming: enabled
    /// - Model: claude-haiku-4-5
    /// - Max tokens: 4096
    /// - Color: enabled
    /// - Context: current turn only
    /// - Partial streams: discarded
    pub fn new() -> Self {
        Self {
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            assistant_name: DEFAULT_ASSISTANT_NAME.to_string(),
            streaming: true,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            use_color: true,
            context_policy: ContextPolicy::default(),
            partial_stream_policy: PartialStreamPolicy::default(),
            stream_capacity: DEFAULT_STREAM_CAPACITY,
            indicator_interval: DEFAULT_INDICATOR_INTERVAL,
            base_url: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets the prompt label.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Sets whether replies are streamed.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Sets the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = Some(prompt);
        self
    }

    /// Sets the maximum tokens per response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the context policy.
    pub fn with_context_policy(mut self, policy: ContextPolicy) -> Self {
        self.context_policy = policy;
        self
    }

    /// Sets the partial stream policy.
    pub fn with_partial_stream_policy(mut self, policy: PartialStreamPolicy) -> Self {
        self.partial_stream_policy = policy;
        self
    }

    /// Sets the indicator frame interval.
    pub fn with_indicator_interval(mut self, interval: Duration) -> Self {
        self.indicator_interval = interval;
        self
    }

    /// Resolve the final configuration from command-line arguments.
    ///
    /// Loads the file named by `--config` if present; flags override it.
    pub fn resolve(args: ChatArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => ChatConfigFile::from_file(path)?,
            None => ChatConfigFile::default(),
        };
        let mut config = ChatConfig::new();
        file.apply(&mut config)?;

        if let Some(model) = args.model {
            config.model = model;
        }
        if let Some(system) = args.system {
            config.system_prompt = Some(system);
        }
        if let Some(max_tokens) = args.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(name) = args.name {
            config.display_name = name;
        }
        if args.no_stream {
            config.streaming = false;
        }
        if args.no_color {
            config.use_color = false;
        }
        if args.full_context {
            config.context_policy = ContextPolicy::FullTranscript;
        }
        if args.keep_partial {
            config.partial_stream_policy = PartialStreamPolicy::Persist;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::config(
                "max_tokens must be positive",
                Some("max_tokens".to_string()),
            ));
        }
        if self.stream_capacity == 0 {
            return Err(Error::config(
                "stream_capacity must be positive",
                Some("stream_capacity".to_string()),
            ));
        }
        if self.indicator_interval.is_zero() {
            return Err(Error::config(
                "indicator_interval_ms must be positive",
                Some("indicator_interval_ms".to_string()),
            ));
        }
        Ok(())
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// On-disk form of [`ChatConfig`]; every field is optional.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ChatConfigFile {
    pub display_name: Option<String>,
    pub assistant_name: Option<String>,
    pub streaming: Option<bool>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub color: Option<bool>,
    pub context_policy: Option<ContextPolicy>,
    pub partial_stream_policy: Option<PartialStreamPolicy>,
    pub stream_capacity: Option<usize>,
    pub indicator_interval_ms: Option<u64>,
    pub base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl ChatConfigFile {
    /// Parse a configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| {
            Error::config(format!("invalid configuration: {e}"), None)
        })
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::io(format!("could not read {}", path.display()), e)
        })?;
        Self::from_yaml_str(&yaml)
    }

    fn apply(self, config: &mut ChatConfig) -> Result<()> {
        if let Some(name) = self.display_name {
            config.display_name = name;
        }
        if let Some(name) = self.assistant_name {
            config.assistant_name = name;
        }
        if let Some(streaming) = self.streaming {
            config.streaming = streaming;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if self.system_prompt.is_some() {
            config.system_prompt = self.system_prompt;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(color) = self.color {
            config.use_color = color;
        }
        if let Some(policy) = self.context_policy {
            config.context_policy = policy;
        }
        if let Some(policy) = self.partial_stream_policy {
            config.partial_stream_policy = policy;
        }
        if let Some(capacity) = self.stream_capacity {
            config.stream_capacity = capacity;
        }
        if let Some(ms) = self.indicator_interval_ms {
            config.indicator_interval = Duration::from_millis(ms);
        }
        if self.base_url.is_some() {
            config.base_url = self.base_url;
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        config.validate()
    }
}
