//! Append-only conversation history keyed by session.
//!
//! The [`HistoryStore`] trait is the contract the chat core writes through;
//! [`MemoryHistoryStore`] is the in-process backing used by the chat binary.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::observability::{HISTORY_APPENDS, HISTORY_APPEND_ERRORS};
use crate::types::{ChatHistory, Message, SessionId};

/// Storage backend for chat histories.
///
/// Implementations must make each append atomic with respect to readers and
/// must allow appends to different sessions to proceed concurrently.
pub trait HistoryStore: Send + Sync {
    /// Allocate a new session with an empty message list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backing cannot hold another session.
    fn create_session(&self) -> Result<ChatHistory>;

    /// Append a message to the end of a session's history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the session is unknown.
    fn append_message(&self, session_id: &SessionId, message: Message) -> Result<()>;

    /// Return a snapshot of a session's history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the session is unknown.
    fn get_session(&self, session_id: &SessionId) -> Result<ChatHistory>;

    /// Return snapshots of every session, oldest first.
    fn list_sessions(&self) -> Vec<ChatHistory>;

    /// Remove a session and its messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the session is unknown.
    fn delete_session(&self, session_id: &SessionId) -> Result<()>;
}

/// In-memory history store.
///
/// The session map sits behind one lock and every session's message list
/// behind its own, so appends to different sessions only share a read lock on
/// the map.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    sessions: RwLock<HashMap<SessionId, Arc<RwLock<ChatHistory>>>>,
    max_sessions: Option<usize>,
}

impl MemoryHistoryStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that refuses to hold more than `max_sessions` sessions.
    pub fn with_capacity_limit(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::default(),
            max_sessions: Some(max_sessions),
        }
    }

    fn session(&self, session_id: &SessionId) -> Result<Arc<RwLock<ChatHistory>>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::not_found("unknown session", Some(session_id.to_string())))
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn create_session(&self) -> Result<ChatHistory> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(limit) = self.max_sessions
            && sessions.len() >= limit
        {
            return Err(Error::storage(format!(
                "session limit of {limit} reached"
            )));
        }
        let mut id = SessionId::generate();
        while sessions.contains_key(&id) {
            id = SessionId::generate();
        }
        let history = ChatHistory::new(id);
        sessions.insert(id, Arc::new(RwLock::new(history.clone())));
        Ok(history)
    }

    fn append_message(&self, session_id: &SessionId, message: Message) -> Result<()> {
        let session = self.session(session_id).inspect_err(|_| {
            HISTORY_APPEND_ERRORS.click();
        })?;
        let mut history = session.write().unwrap_or_else(PoisonError::into_inner);
        history.messages.push(message);
        HISTORY_APPENDS.click();
        Ok(())
    }

    fn get_session(&self, session_id: &SessionId) -> Result<ChatHistory> {
        let session = self.session(session_id)?;
        let history = session.read().unwrap_or_else(PoisonError::into_inner);
        Ok(history.clone())
    }

    fn list_sessions(&self) -> Vec<ChatHistory> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut histories: Vec<ChatHistory> = sessions
            .values()
            .map(|session| {
                session
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            })
            .collect();
        histories.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        histories
    }

    fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("unknown session", Some(session_id.to_string())))
    }
}
