use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{Message, Role, SessionId};

/// The ordered message log of one session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatHistory {
    /// The session this history belongs to.
    pub id: SessionId,

    /// When the session was created.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,

    /// Messages in insertion order.
    pub messages: Vec<Message>,
}

impl ChatHistory {
    /// Create an empty history for the given session.
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            created_at: OffsetDateTime::now_utc(),
            messages: Vec::new(),
        }
    }

    /// Number of messages recorded.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of completed user/assistant exchanges.
    pub fn turn_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
