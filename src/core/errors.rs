//! Domain error types
//!
//! These errors represent business logic failures, distinct from infrastructure errors.
//! Using thiserror for ergonomic error handling with proper Display implementations.

use thiserror::Error;

use super::types::{Mode, ModelId};
use crate::llm::BackendError;

/// Errors raised by the mode/model router
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// Attempted model is not eligible in the active mode
    #[error("Model {model} is not available in {mode} mode")]
    InvalidModelSelection { model: ModelId, mode: Mode },

    /// Model identifier not known to the router or missing from the endpoint table
    #[error("No endpoint configured for model: {0}")]
    UnknownModel(String),

    /// Mode name not in the closed set
    #[error("Unknown mode: {0}")]
    UnknownMode(String),
}

/// Errors related to session management
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session not found
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A persisted session record could not be decoded
    #[error("Corrupt session record at index {index}: {reason}")]
    PersistenceCorrupt { index: usize, reason: String },

    /// Storage error (wraps infrastructure errors)
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors related to the conversation buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    /// No message with this id in the active session
    #[error("Message not found: {0}")]
    MessageNotFound(u64),

    /// Only assistant turns can be revealed
    #[error("Message {0} is not an assistant turn")]
    NotAssistant(u64),

    /// Content of a finished message cannot change
    #[error("Message {0} is already final")]
    AlreadyFinal(u64),
}

/// Errors surfaced by a chat submission
#[derive(Debug, Error)]
pub enum ChatError {
    /// Blank or whitespace-only input; nothing is appended
    #[error("Empty input")]
    EmptyInput,

    /// Another submission is still waiting on the backend
    #[error("A request is already in flight")]
    Busy,

    /// Router rejected the request
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Session bookkeeping failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Conversation buffer rejected an operation
    #[error(transparent)]
    Conversation(#[from] ConversationError),

    /// Backend failure (only surfaced by calls that do not absorb it)
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<anyhow::Error> for SessionError {
    fn from(err: anyhow::Error) -> Self {
        SessionError::Storage(err.to_string())
    }
}

impl ChatError {
    /// Whether the caller should simply ignore this outcome
    pub fn is_silent(&self) -> bool {
        matches!(self, ChatError::EmptyInput | ChatError::Busy)
    }
}
