//! Core traits for the domain layer
//!
//! These traits define the interfaces that domain components depend on,
//! allowing infrastructure to be injected and tests to use temp directories.

use anyhow::Result;

use super::errors::SessionError;
use crate::storage::ChatSession;

/// Session storage abstraction
///
/// Allows the chat service to persist sessions without depending on the
/// JSON file layout directly.
pub trait SessionStore: Send + Sync {
    /// Load every readable session, most recently active first
    ///
    /// Never fails: missing or malformed data yields an empty list and
    /// individually corrupt records are skipped.
    fn load(&self) -> Vec<ChatSession>;

    /// Replace the full persisted set
    fn save_all(&self, sessions: &[ChatSession]) -> Result<()>;

    /// Put `session` at the front, replacing any entry with the same id
    fn upsert(&self, session: &ChatSession) -> Result<Vec<ChatSession>>;

    /// Load a session by ID
    fn get(&self, id: &str) -> Result<ChatSession, SessionError>;

    /// Delete a session by ID
    fn delete(&self, id: &str) -> Result<(), SessionError>;

    /// Remove every session
    fn clear(&self) -> Result<()>;
}
