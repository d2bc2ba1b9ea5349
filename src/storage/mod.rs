//! Persistent storage for tutor sessions
//!
//! Layout:
//!
//! ~/.local/share/tutor/              # Data directory (platform dependent)
//! └── sessions.json                  # All sessions, most recently active first
//!
//! The file holds a single JSON array. Every write replaces the whole array;
//! the last writer wins.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::errors::SessionError;
use crate::core::traits::SessionStore;
use crate::core::types::{ModelId, Role};

/// Data directory name
const DATA_DIR: &str = "tutor";

/// File holding every persisted session
const SESSIONS_FILE: &str = "sessions.json";

/// A chat session with its conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// Unique session ID
    pub id: String,
    /// Derived from the first user message
    #[serde(default)]
    pub title: String,
    /// Conversation messages in order
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl ChatSession {
    /// Create a new empty session
    pub fn new() -> Self {
        // Use UUID v4 for cryptographically unique session IDs
        let id = format!("session_{}", uuid::Uuid::new_v4());
        Self {
            id,
            title: String::new(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Timestamp of the latest message, or creation time when empty
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.messages
            .last()
            .map(|m| m.timestamp)
            .unwrap_or(self.created_at)
    }

    /// Build the one-way export document
    pub fn export(&self) -> ExportDocument {
        ExportDocument {
            session_id: self.id.clone(),
            exported_at: Utc::now(),
            messages: self
                .messages
                .iter()
                .map(|m| ExportMessage {
                    role: m.role,
                    content: m.content.clone(),
                    timestamp: m.timestamp,
                })
                .collect(),
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// A message in a chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub id: u64,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_model"
    )]
    pub model_used: Option<ModelId>,
}

impl SessionMessage {
    pub fn new(id: u64, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            role,
            timestamp: Utc::now(),
            model_used: None,
        }
    }
}

/// Unknown model tags written by other clients load as `None`
fn lenient_model<'de, D>(deserializer: D) -> Result<Option<ModelId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

/// Session metadata for listing
#[derive(Debug, Clone, Serialize)]
pub struct SessionMeta {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
}

impl From<&ChatSession> for SessionMeta {
    fn from(session: &ChatSession) -> Self {
        Self {
            id: session.id.clone(),
            title: session.title.clone(),
            created_at: session.created_at,
            last_activity: session.last_activity(),
            message_count: session.messages.len(),
        }
    }
}

/// Downloadable transcript of one session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub session_id: String,
    pub exported_at: DateTime<Utc>,
    pub messages: Vec<ExportMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Default data directory for session storage
pub fn default_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join(DATA_DIR)
    } else {
        // Fallback to home directory
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".local")
            .join("share")
            .join(DATA_DIR)
    }
}

/// Session store backed by one JSON file
#[derive(Debug, Clone)]
pub struct JsonSessionStore {
    path: PathBuf,
}

impl JsonSessionStore {
    /// Store sessions under `data_dir`, creating the directory if needed
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).with_context(|| {
            format!("Failed to create data directory {}", data_dir.display())
        })?;
        Ok(Self {
            path: data_dir.join(SESSIONS_FILE),
        })
    }

    /// Path of the sessions file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(content: &str) -> Vec<ChatSession> {
        let records: Vec<serde_json::Value> = match serde_json::from_str(content) {
            Ok(serde_json::Value::Array(records)) => records,
            Ok(_) => {
                tracing::warn!("Sessions file is not a JSON array, ignoring it");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("Failed to parse sessions file: {}", e);
                return Vec::new();
            }
        };

        let mut sessions: Vec<ChatSession> = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<ChatSession>(record) {
                Ok(session) if sessions.iter().any(|s| s.id == session.id) => {
                    tracing::warn!("Skipping duplicate session id {}", session.id);
                }
                Ok(session) => sessions.push(session),
                Err(e) => {
                    let err = SessionError::PersistenceCorrupt {
                        index,
                        reason: e.to_string(),
                    };
                    tracing::warn!("{}", err);
                }
            }
        }
        sessions
    }
}

impl SessionStore for JsonSessionStore {
    fn load(&self) -> Vec<ChatSession> {
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                // Invalid UTF-8 in one record must not cost the others
                let content = String::from_utf8_lossy(&bytes);
                if let std::borrow::Cow::Owned(_) = content {
                    tracing::warn!(
                        "{} contains invalid UTF-8, replacing bad bytes",
                        self.path.display()
                    );
                }
                Self::decode(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    fn save_all(&self, sessions: &[ChatSession]) -> Result<()> {
        let content = serde_json::to_string_pretty(sessions)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        tracing::debug!("Saved {} sessions", sessions.len());
        Ok(())
    }

    fn upsert(&self, session: &ChatSession) -> Result<Vec<ChatSession>> {
        let mut sessions = self.load();
        sessions.retain(|s| s.id != session.id);
        sessions.insert(0, session.clone());
        self.save_all(&sessions)?;
        Ok(sessions)
    }

    fn get(&self, id: &str) -> Result<ChatSession, SessionError> {
        self.load()
            .into_iter()
            .find(|s| s.id == id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> Result<(), SessionError> {
        let mut sessions = self.load();
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        if sessions.len() == before {
            return Err(SessionError::NotFound(id.to_string()));
        }
        self.save_all(&sessions)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.save_all(&[])
    }
}
