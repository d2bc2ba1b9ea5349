//! Service layer for tutor
//!
//! Services coordinate the domain types with storage and the backend.

pub mod chat_service;

pub use chat_service::{AppState, ChatOptions, ChatService, Reply, ReplyKind, SubmitOutcome};
