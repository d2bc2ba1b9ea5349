//! Wire types for the tutor backend API

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::Role;

/// Reply used when the backend answered but gave no usable text
pub const FALLBACK_REPLY: &str = "I apologize, but I couldn't process your request at the moment.";

/// Assistant text shown when the backend cannot be reached
pub const CONNECTION_NOTICE: &str = "I'm having trouble connecting to the tutor backend right now. \
Please make sure the server is running and try again.";

/// One turn of context sent with a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

/// Body of a chat POST
#[derive(Debug, Clone, Serialize)]
pub struct TutorRequest<'a> {
    pub message: &'a str,
    pub conversation_history: &'a [HistoryTurn],
}

/// Body of a successful chat response
///
/// The backend reports model failures with a 200 and an `error` field, so
/// every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TutorResponse {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TutorResponse {
    /// `response`, else `answer`, ignoring empty strings
    pub fn answer_text(&self) -> Option<&str> {
        [self.response.as_deref(), self.answer.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
    }
}

/// Answer extracted from a successful call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub text: String,
    /// Model tag the backend says it used
    pub model_used: Option<String>,
    /// True when `text` is the fallback apology
    pub fallback: bool,
}

impl BackendReply {
    /// Extract the answer from a 2xx body
    pub fn from_body(body: &str) -> Self {
        let parsed: TutorResponse = match serde_json::from_str(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Backend returned a non-JSON body: {}", e);
                TutorResponse::default()
            }
        };
        if let Some(error) = &parsed.error {
            tracing::warn!("Backend reported an error: {}", error);
        }
        match parsed.answer_text() {
            Some(text) => Self {
                text: text.to_string(),
                model_used: parsed.model_used.clone(),
                fallback: false,
            },
            None => Self {
                text: FALLBACK_REPLY.to_string(),
                model_used: parsed.model_used.clone(),
                fallback: true,
            },
        }
    }
}

/// `GET /health` report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthReport {
    pub status: String,
    pub api_version: Option<String>,
    pub models_available: Vec<HealthModel>,
    pub current_model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthModel {
    pub name: String,
    pub description: String,
    pub endpoint: String,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// `GET /models` report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsReport {
    pub available_models: Vec<BackendModelInfo>,
    pub current_model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendModelInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub model: String,
    pub response_time: String,
    pub endpoint: String,
}

/// A multiple-choice practice question from the backend's dataset
///
/// Fields the client does not use are kept so the question can be sent
/// back unchanged with `POST /check-answer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    /// Answer text keyed by choice letter
    #[serde(default)]
    pub choices: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `GET /random-question` body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RandomQuestionResponse {
    pub question: Option<QuizQuestion>,
    pub status: Option<String>,
    pub error: Option<String>,
}

/// `POST /check-answer` body
#[derive(Debug, Clone, Serialize)]
pub struct CheckAnswerRequest<'a> {
    pub user_answer: &'a str,
    pub question_data: &'a QuizQuestion,
}

/// `POST /check-answer` reply
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CheckAnswerResponse {
    pub correct: Option<bool>,
    pub correct_answer: Option<String>,
    pub explanation: Option<String>,
    pub status: Option<String>,
    pub error: Option<String>,
}

/// Graded answer to a quiz question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerVerdict {
    pub correct: bool,
    pub correct_answer: String,
    pub explanation: String,
}

/// `GET /topics` body
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TopicsResponse {
    pub topics: Vec<String>,
    pub status: Option<String>,
    pub error: Option<String>,
}

impl QuizQuestion {
    /// Normalise a typed answer to a choice letter
    pub fn parse_choice(&self, input: &str) -> Option<String> {
        let letter = input.trim().to_uppercase();
        self.choices
            .keys()
            .find(|k| k.to_uppercase() == letter)
            .cloned()
    }
}
