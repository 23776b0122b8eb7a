// Public modules
pub mod assistant_reply;
pub mod chat_history;
pub mod message;
pub mod session_id;
pub mod stream_increment;

// Re-exports
pub use assistant_reply::AssistantReply;
pub use chat_history::ChatHistory;
pub use message::{Message, Role};
pub use session_id::SessionId;
pub use stream_increment::StreamIncrement;
