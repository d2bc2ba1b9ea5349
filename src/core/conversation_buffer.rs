//! Conversation Buffer - Message history of the active session
//!
//! Handles:
//! - Ordered message history and id allocation
//! - The windowed history sent to the backend
//! - The reservation held for an in-flight reply
//! - Progressive reveal of assistant replies
//! - Conversion to and from the persisted session record

use chrono::{DateTime, Utc};

use super::errors::ConversationError;
use super::reveal::RevealProgress;
use super::types::{ModelId, Role};
use crate::llm::HistoryTurn;
use crate::storage::{ChatSession, SessionMessage};

/// Number of recent turns sent as context with each request
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Longest title derived from the first prompt, in characters
const TITLE_MAX_CHARS: usize = 50;

/// Reply slot held while a backend call is in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    pub message_id: u64,
    pub model: ModelId,
}

/// Outcome of one reveal step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealStep {
    /// One more character is visible
    Revealed(char),
    /// The whole text is visible and the message is final
    Finished,
    /// This reveal is no longer the active one
    Superseded,
}

/// In-memory message list of the active session
#[derive(Debug, Clone)]
pub struct ConversationBuffer {
    session_id: String,
    title: String,
    created_at: DateTime<Utc>,
    messages: Vec<SessionMessage>,
    next_id: u64,
    pending: Option<PendingReply>,
    /// Assistant turn appended by `complete_reply` and not yet revealed
    unrevealed: Option<u64>,
    reveal: Option<RevealProgress>,
}

impl ConversationBuffer {
    /// Start an empty conversation with a fresh session id
    pub fn new() -> Self {
        Self::from_session(ChatSession::new())
    }

    /// Load a persisted session as the active conversation
    pub fn from_session(session: ChatSession) -> Self {
        let next_id = session
            .messages
            .iter()
            .map(|m| m.id + 1)
            .max()
            .unwrap_or(1);
        Self {
            session_id: session.id,
            title: session.title,
            created_at: session.created_at,
            messages: session.messages,
            next_id,
            pending: None,
            unrevealed: None,
            reveal: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Messages in conversation order
    pub fn messages(&self) -> &[SessionMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, message_id: u64) -> Option<&SessionMessage> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Append a message at the end of the conversation
    ///
    /// The buffer assigns the identifier; whatever id the message carried is
    /// replaced. The first user message also names the session.
    pub fn append(&mut self, mut message: SessionMessage) -> &[SessionMessage] {
        message.id = self.allocate_id();
        self.unrevealed = None;
        self.push(message)
    }

    /// Append a user turn with the given text
    pub fn append_user(&mut self, content: impl Into<String>) -> &SessionMessage {
        self.append(SessionMessage::new(0, Role::User, content));
        &self.messages[self.messages.len() - 1]
    }

    /// The last `limit` turns in order, reduced to role and content
    pub fn windowed_history(&self, limit: usize) -> Vec<HistoryTurn> {
        let start = self.messages.len().saturating_sub(limit);
        self.messages[start..]
            .iter()
            .map(|m| HistoryTurn {
                role: m.role,
                content: self.persisted_content(m).to_string(),
            })
            .collect()
    }

    // ---- Reply reservation ----

    /// Reserve the id the assistant reply will take
    ///
    /// Replaces any previous reservation, which makes its late reply stale.
    pub fn reserve_reply(&mut self, model: ModelId) -> PendingReply {
        let pending = PendingReply {
            message_id: self.allocate_id(),
            model,
        };
        self.pending = Some(pending.clone());
        pending
    }

    /// Claim the reservation if `message_id` is still the active one
    pub fn take_reply(&mut self, message_id: u64) -> Option<PendingReply> {
        match &self.pending {
            Some(p) if p.message_id == message_id => self.pending.take(),
            _ => None,
        }
    }

    /// Drop the reservation; a late reply will be ignored
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    /// Append the assistant turn for a claimed reservation
    pub fn complete_reply(
        &mut self,
        reply: PendingReply,
        content: impl Into<String>,
        model_used: Option<ModelId>,
    ) -> &SessionMessage {
        let mut message = SessionMessage::new(reply.message_id, Role::Assistant, content);
        message.model_used = model_used;
        self.unrevealed = Some(reply.message_id);
        self.push(message);
        &self.messages[self.messages.len() - 1]
    }

    // ---- Reveal ----

    /// Start revealing `full_text` into an assistant message
    ///
    /// Only the reply just added by `complete_reply` can be revealed, and
    /// only once. The visible content restarts from empty. Any other reveal
    /// still in flight is finished first.
    pub fn reveal(
        &mut self,
        message_id: u64,
        full_text: impl Into<String>,
    ) -> Result<(), ConversationError> {
        let message = self
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .ok_or(ConversationError::MessageNotFound(message_id))?;
        if message.role != Role::Assistant {
            return Err(ConversationError::NotAssistant(message_id));
        }
        if self.revealing() == Some(message_id) {
            return Ok(());
        }
        let full_text = full_text.into();
        // The reveal replays the stored reply, it never rewrites it
        if self.unrevealed != Some(message_id) || message.content != full_text {
            return Err(ConversationError::AlreadyFinal(message_id));
        }
        if let Some(other) = self.finish_reveal() {
            tracing::debug!("Reveal of message {} superseded", other);
        }
        self.unrevealed = None;
        self.set_content(message_id, String::new());
        self.reveal = Some(RevealProgress::new(message_id, full_text));
        Ok(())
    }

    /// Id of the message currently being revealed
    pub fn revealing(&self) -> Option<u64> {
        self.reveal.as_ref().map(|r| r.message_id())
    }

    /// Reveal one more character of `message_id`
    pub fn advance_reveal(&mut self, message_id: u64) -> RevealStep {
        let Some(progress) = self.reveal.as_mut() else {
            return RevealStep::Superseded;
        };
        if progress.message_id() != message_id {
            return RevealStep::Superseded;
        }
        match progress.step() {
            Some(ch) => {
                let visible = progress.visible().to_string();
                self.set_content(message_id, visible);
                RevealStep::Revealed(ch)
            }
            None => {
                self.reveal = None;
                RevealStep::Finished
            }
        }
    }

    /// Jump the in-flight reveal to its full text
    ///
    /// Returns the id of the message that was being revealed.
    pub fn finish_reveal(&mut self) -> Option<u64> {
        let progress = self.reveal.take()?;
        let id = progress.message_id();
        self.set_content(id, progress.full_text().to_string());
        Some(id)
    }

    // ---- Persistence ----

    /// Snapshot for the session store
    ///
    /// A message under reveal is written with its full text, never the
    /// partially revealed prefix.
    pub fn snapshot(&self) -> ChatSession {
        ChatSession {
            id: self.session_id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            messages: self
                .messages
                .iter()
                .map(|m| SessionMessage {
                    content: self.persisted_content(m).to_string(),
                    ..m.clone()
                })
                .collect(),
        }
    }

    // Private helper methods

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn push(&mut self, message: SessionMessage) -> &[SessionMessage] {
        if self.title.is_empty() && message.role == Role::User {
            self.title = title_from_prompt(&message.content);
        }
        self.next_id = self.next_id.max(message.id + 1);
        self.messages.push(message);
        &self.messages
    }

    fn set_content(&mut self, message_id: u64, content: String) {
        if let Some(m) = self.messages.iter_mut().find(|m| m.id == message_id) {
            m.content = content;
        }
    }

    fn persisted_content<'a>(&'a self, message: &'a SessionMessage) -> &'a str {
        match &self.reveal {
            Some(r) if r.message_id() == message.id => r.full_text(),
            _ => &message.content,
        }
    }
}

impl Default for ConversationBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Session title from the first prompt: first line, truncated
pub fn title_from_prompt(prompt: &str) -> String {
    let first_line = prompt.trim().lines().next().unwrap_or("");
    let name: String = first_line.chars().take(TITLE_MAX_CHARS).collect();
    let name = name.trim().to_string();
    if name.is_empty() {
        "New conversation".to_string()
    } else if name.chars().count() < prompt.trim().chars().count() {
        format!("{}...", name)
    } else {
        name
    }
}
