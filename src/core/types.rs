//! Canonical type definitions for the core domain
//!
//! This module contains the single source of truth for the task modes,
//! backend models and message roles shared by the router, the conversation
//! buffer, storage and the backend client.

use serde::{Deserialize, Serialize};

use super::errors::RouterError;

/// Task category that constrains which backend models are eligible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Networking concepts and protocol explanations
    #[default]
    Concepts,
    /// Device configuration and CLI commands
    Configuration,
    /// Diagnosing network problems
    Troubleshooting,
    /// Rapid-fire practice questions
    Practice,
}

impl Mode {
    pub const ALL: [Mode; 4] = [
        Mode::Concepts,
        Mode::Configuration,
        Mode::Troubleshooting,
        Mode::Practice,
    ];

    /// Get display label for this mode
    pub fn label(&self) -> &'static str {
        match self {
            Self::Concepts => "Concepts",
            Self::Configuration => "Configuration",
            Self::Troubleshooting => "Troubleshooting",
            Self::Practice => "Practice",
        }
    }

    /// Get description for this mode
    pub fn description(&self) -> &'static str {
        match self {
            Self::Concepts => "Protocols, theory and exam concepts",
            Self::Configuration => "Cisco IOS commands and device configuration",
            Self::Troubleshooting => "Step-by-step diagnosis of network issues",
            Self::Practice => "Quick answers for drilling questions",
        }
    }

    /// Guess a mode from the wording of a question.
    ///
    /// Configuration keywords win over troubleshooting ones, which win over
    /// concept keywords. Anything else is treated as practice.
    pub fn infer(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        if has_any(&["configure", "setup", "command", "cli"]) {
            Self::Configuration
        } else if has_any(&["troubleshoot", "problem", "issue", "error"]) {
            Self::Troubleshooting
        } else if has_any(&["what", "explain", "define"]) {
            Self::Concepts
        } else {
            Self::Practice
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concepts" => Ok(Self::Concepts),
            "configuration" => Ok(Self::Configuration),
            "troubleshooting" => Ok(Self::Troubleshooting),
            "practice" => Ok(Self::Practice),
            other => Err(RouterError::UnknownMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concepts => write!(f, "concepts"),
            Self::Configuration => write!(f, "configuration"),
            Self::Troubleshooting => write!(f, "troubleshooting"),
            Self::Practice => write!(f, "practice"),
        }
    }
}

/// A model served by the tutor backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelId {
    /// Llama 3.1 8B, local, comprehensive answers
    Llama,
    /// Phi3 mini, local, fast
    Phi3,
    /// Gemini Flash, cloud, code and configuration
    Gemini,
    /// Qwen2 0.5B, local, ultra-fast
    Qwen2,
}

impl ModelId {
    pub const ALL: [ModelId; 4] = [
        ModelId::Llama,
        ModelId::Phi3,
        ModelId::Gemini,
        ModelId::Qwen2,
    ];

    /// Short identifier used in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llama => "llama",
            Self::Phi3 => "phi3",
            Self::Gemini => "gemini",
            Self::Qwen2 => "qwen2",
        }
    }

    /// Model tag as reported by the backend
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Llama => "llama3.1:8b",
            Self::Phi3 => "phi3:mini",
            Self::Gemini => "gemini-1.5-flash-latest",
            Self::Qwen2 => "qwen2:0.5b",
        }
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Llama => "Llama 3.1 8B",
            Self::Phi3 => "Phi3 Mini",
            Self::Gemini => "Gemini 1.5 Flash",
            Self::Qwen2 => "Qwen2 0.5B",
        }
    }

    /// Endpoint path the backend serves this model on
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Llama => "/chat-llama",
            Self::Phi3 => "/chat-phi3",
            Self::Gemini => "/chat-gemini",
            Self::Qwen2 => "/chat-qwen2",
        }
    }
}

impl std::str::FromStr for ModelId {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == needle || m.tag() == needle)
            .ok_or(RouterError::UnknownModel(needle))
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
