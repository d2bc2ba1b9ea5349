//! Core domain modules
//!
//! This module contains domain logic and types shared across the application:
//! the mode/model router, the conversation buffer and the reveal schedule.

pub mod conversation_buffer;
pub mod errors;
pub mod reveal;
pub mod router;
pub mod traits;
pub mod types;

// Re-export canonical types
pub use types::{Mode, ModelId, Role};

// Re-export main types for convenience
pub use conversation_buffer::{
    ConversationBuffer, PendingReply, RevealStep, DEFAULT_HISTORY_WINDOW,
};
pub use errors::{ChatError, ConversationError, RouterError, SessionError};
pub use reveal::RevealSchedule;
pub use router::{Endpoint, ModelRouter};
pub use traits::SessionStore;
