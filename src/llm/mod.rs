//! Backend client for the tutor inference service

mod error;
mod tutor_api;
mod types;

pub use error::BackendError;
pub use tutor_api::{TutorApiBackend, DEFAULT_BACKEND_URL};
pub use types::*;

use async_trait::async_trait;

use crate::core::router::Endpoint;

/// Trait for inference backends
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Send one message with its windowed history to `endpoint`
    ///
    /// Exactly one outcome per call: no retries. A 2xx answer without usable
    /// text still succeeds and carries the fallback apology.
    async fn send(
        &self,
        message: &str,
        history: &[HistoryTurn],
        endpoint: &Endpoint,
    ) -> Result<BackendReply, BackendError>;

    /// Query backend health
    async fn health(&self) -> Result<HealthReport, BackendError>;

    /// List the models the backend has loaded
    async fn models(&self) -> Result<ModelsReport, BackendError>;

    /// Draw a random practice question
    async fn random_question(&self) -> Result<QuizQuestion, BackendError>;

    /// Grade `answer` (a choice letter) for `question`
    async fn check_answer(
        &self,
        question: &QuizQuestion,
        answer: &str,
    ) -> Result<AnswerVerdict, BackendError>;

    /// Topics covered by the practice questions
    async fn topics(&self) -> Result<Vec<String>, BackendError>;
}
