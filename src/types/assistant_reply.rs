use serde::{Deserialize, Serialize};

/// The complete reply produced by a one-shot generation call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssistantReply {
    /// The reply text.
    pub text: String,
}

impl AssistantReply {
    /// Create a reply from text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl From<String> for AssistantReply {
    fn from(text: String) -> Self {
        Self { text }
    }
}

impl From<&str> for AssistantReply {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}
