use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The speaker of a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of dialogue.
///
/// Messages are immutable once created; a history orders them by insertion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Who produced the message.
    pub role: Role,

    /// The text of the message.
    pub text: String,

    /// When the message was created.
    #[serde(with = "crate::utils::time")]
    pub generated_at: OffsetDateTime,
}

impl Message {
    /// Create a new message stamped with the given time.
    pub fn new(role: Role, text: impl Into<String>, generated_at: OffsetDateTime) -> Self {
        Self {
            role,
            text: text.into(),
            generated_at,
        }
    }

    /// Create a user message stamped with the current wall-clock time.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text, OffsetDateTime::now_utc())
    }

    /// Create an assistant message stamped with the current wall-clock time.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text, OffsetDateTime::now_utc())
    }

    /// Returns true if this message was written by the user.
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn message_serialization() {
        let message = Message::new(Role::User, "Hello", datetime!(2024-05-01 12:30:00 UTC));
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "role": "user",
                "text": "Hello",
                "generated_at": "2024-05-01T12:30:00Z"
            })
        );

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, message);
    }

    #[test]
    fn constructors_set_role() {
        assert!(Message::user("hi").is_user());
        assert!(!Message::assistant("hello").is_user());
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
