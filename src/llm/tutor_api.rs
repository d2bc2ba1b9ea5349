//! HTTP client for the tutor backend (FastAPI service fronting the models)

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use super::{
    AnswerVerdict, BackendError, BackendReply, CheckAnswerRequest, CheckAnswerResponse,
    HealthReport, HistoryTurn, InferenceBackend, ModelsReport, QuizQuestion,
    RandomQuestionResponse, TopicsResponse, TutorRequest,
};
use crate::config::BackendConfig;
use crate::core::router::Endpoint;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

/// Timeout for the small status endpoints
const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TutorApiBackend {
    client: reqwest::Client,
    base_url: String,
}

impl TutorApiBackend {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tutor-cli/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T>(&self, path: &str) -> Result<T, BackendError>
    where
        T: serde::de::DeserializeOwned,
    {
        let request = self.client.get(self.url(path)).timeout(STATUS_TIMEOUT);
        self.read_json(request, path).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, BackendError>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let request = self.client.post(self.url(path)).json(body);
        self.read_json(request, path).await
    }

    async fn read_json<T>(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<T, BackendError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(BackendError::from_network_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::from_http_status(status, body));
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
            .map_err(BackendError::Other)
    }
}

#[async_trait]
impl InferenceBackend for TutorApiBackend {
    fn name(&self) -> &str {
        "tutor-api"
    }

    async fn send(
        &self,
        message: &str,
        history: &[HistoryTurn],
        endpoint: &Endpoint,
    ) -> Result<BackendReply, BackendError> {
        let url = self.url(&endpoint.path);
        let request = TutorRequest {
            message,
            conversation_history: history,
        };
        tracing::debug!(
            "POST {} (model {}, {} history turns)",
            url,
            endpoint.model,
            history.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(BackendError::from_network_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Backend error ({}) from {}", status, url);
            return Err(BackendError::from_http_status(status, body));
        }

        let body = response
            .text()
            .await
            .map_err(BackendError::from_network_error)?;
        Ok(BackendReply::from_body(&body))
    }

    async fn health(&self) -> Result<HealthReport, BackendError> {
        self.get_json("/health").await
    }

    async fn models(&self) -> Result<ModelsReport, BackendError> {
        self.get_json("/models").await
    }

    async fn random_question(&self) -> Result<QuizQuestion, BackendError> {
        let body: RandomQuestionResponse = self.get_json("/random-question").await?;
        match body.question {
            Some(question) => Ok(question),
            None => Err(service_error(body.error)),
        }
    }

    async fn check_answer(
        &self,
        question: &QuizQuestion,
        answer: &str,
    ) -> Result<AnswerVerdict, BackendError> {
        let request = CheckAnswerRequest {
            user_answer: answer,
            question_data: question,
        };
        let body: CheckAnswerResponse = self.post_json("/check-answer", &request).await?;
        let Some(correct) = body.correct else {
            return Err(service_error(body.error));
        };
        Ok(AnswerVerdict {
            correct,
            correct_answer: body.correct_answer.unwrap_or_default(),
            explanation: body.explanation.unwrap_or_default(),
        })
    }

    async fn topics(&self) -> Result<Vec<String>, BackendError> {
        let body: TopicsResponse = self.get_json("/topics").await?;
        if body.status.as_deref() == Some("error") {
            return Err(service_error(body.error));
        }
        Ok(body.topics)
    }
}

fn service_error(error: Option<String>) -> BackendError {
    BackendError::Service(error.unwrap_or_else(|| "no details given".to_string()))
}
