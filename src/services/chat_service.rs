//! Chat service coordinating router, conversation buffer, store and backend
//!
//! One submission at a time: a second `submit` while a request is in flight
//! is rejected with `ChatError::Busy`. A reply that arrives after its
//! reservation was dropped (session switched, new session started) is
//! discarded instead of being written into the wrong conversation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::Config;
use crate::core::errors::{ChatError, RouterError, SessionError};
use crate::core::types::{Mode, ModelId};
use crate::core::{ConversationBuffer, ModelRouter, RevealSchedule, RevealStep, SessionStore};
use crate::llm::{
    AnswerVerdict, BackendError, BackendReply, HealthReport, InferenceBackend, ModelsReport,
    QuizQuestion, CONNECTION_NOTICE,
};
use crate::storage::{ExportDocument, SessionMessage, SessionMeta};

/// Mutable application state shared by the service
#[derive(Debug, Default)]
pub struct AppState {
    pub router: ModelRouter,
    pub buffer: ConversationBuffer,
}

/// Tunables of the chat service
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub mode: Mode,
    pub history_window: usize,
    /// `None` makes replies final immediately
    pub reveal: Option<RevealSchedule>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Concepts,
            history_window: crate::core::DEFAULT_HISTORY_WINDOW,
            reveal: Some(RevealSchedule::default()),
        }
    }
}

impl ChatOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.chat.default_mode,
            history_window: config.chat.history_window,
            reveal: config
                .reveal
                .enabled
                .then(|| RevealSchedule::from(&config.reveal)),
        }
    }
}

/// How the assistant turn of a submission was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// The backend answered
    Answer,
    /// The backend answered without usable text
    Fallback,
    /// The backend could not be reached or returned an error status
    ConnectionError,
}

/// Assistant turn appended by a submission
#[derive(Debug, Clone)]
pub struct Reply {
    pub message_id: u64,
    pub text: String,
    pub model: ModelId,
    pub kind: ReplyKind,
    /// True when the reply must be driven with `drive_reveal`
    pub revealing: bool,
}

/// Result of a submission
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Replied(Reply),
    /// The reply arrived after the user moved on and was dropped
    Stale { message_id: u64 },
}

/// Clears the busy flag when the submission ends, however it ends
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct ChatService {
    state: Arc<RwLock<AppState>>,
    store: Arc<dyn SessionStore>,
    backend: Arc<dyn InferenceBackend>,
    busy: AtomicBool,
    history_window: usize,
    reveal: Option<RevealSchedule>,
}

impl ChatService {
    /// Create a service with a fresh, unsaved session
    pub fn new(
        store: Arc<dyn SessionStore>,
        backend: Arc<dyn InferenceBackend>,
        router: ModelRouter,
        options: ChatOptions,
    ) -> Self {
        let mut router = router;
        router.set_mode(options.mode);
        Self {
            state: Arc::new(RwLock::new(AppState {
                router,
                buffer: ConversationBuffer::new(),
            })),
            store,
            backend,
            busy: AtomicBool::new(false),
            history_window: options.history_window,
            reveal: options.reveal,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn mode(&self) -> Mode {
        self.state.read().await.router.mode()
    }

    pub async fn selected_model(&self) -> ModelId {
        self.state.read().await.router.selected()
    }

    pub async fn eligible_models(&self) -> Vec<ModelId> {
        self.state.read().await.router.eligible_models()
    }

    pub async fn session_id(&self) -> String {
        self.state.read().await.buffer.session_id().to_string()
    }

    /// Messages of the active session as currently visible
    pub async fn messages(&self) -> Vec<SessionMessage> {
        self.state.read().await.buffer.messages().to_vec()
    }

    /// Switch mode; the selection resets to the mode's default model
    pub async fn set_mode(&self, mode: Mode) -> ModelId {
        self.state.write().await.router.set_mode(mode)
    }

    pub async fn set_model(&self, model: ModelId) -> Result<(), RouterError> {
        self.state.write().await.router.set_model(model)
    }

    /// Send one user message and append the assistant turn
    ///
    /// Backend failures never surface as errors: they become an assistant
    /// turn carrying the connection notice. Only the prompt and the router
    /// can fail the call, and in that case nothing is appended.
    pub async fn submit(&self, text: &str) -> Result<SubmitOutcome, ChatError> {
        let message = text.trim();
        if message.is_empty() {
            return Err(ChatError::EmptyInput);
        }
        let _busy = BusyGuard::acquire(&self.busy).ok_or(ChatError::Busy)?;

        let (session_id, pending, history, endpoint) = {
            let mut state = self.state.write().await;
            let endpoint = state.router.current_endpoint()?;
            tracing::info!(
                "Submitting to {} ({} mode)",
                endpoint.model,
                state.router.mode()
            );
            state.buffer.finish_reveal();
            // Context is what came before this prompt
            let history = state.buffer.windowed_history(self.history_window);
            state.buffer.append_user(message);
            let pending = state.buffer.reserve_reply(endpoint.model);
            self.persist(&state.buffer);
            (
                state.buffer.session_id().to_string(),
                pending,
                history,
                endpoint,
            )
        };

        let result = self.backend.send(message, &history, &endpoint).await;

        let mut state = self.state.write().await;
        let claimed = if state.buffer.session_id() == session_id {
            state.buffer.take_reply(pending.message_id)
        } else {
            None
        };
        let Some(reservation) = claimed else {
            tracing::debug!("Dropping stale reply {}", pending.message_id);
            return Ok(SubmitOutcome::Stale {
                message_id: pending.message_id,
            });
        };

        let (text, kind, model_used) = match result {
            Ok(reply) => {
                if let Some(tag) = reported_model_mismatch(&reply, endpoint.model) {
                    tracing::debug!("Backend answered with {} (routed {})", tag, endpoint.model);
                }
                let kind = if reply.fallback {
                    ReplyKind::Fallback
                } else {
                    ReplyKind::Answer
                };
                (reply.text, kind, Some(endpoint.model))
            }
            Err(e) => {
                log_backend_failure(&e);
                (CONNECTION_NOTICE.to_string(), ReplyKind::ConnectionError, None)
            }
        };

        let message_id = state
            .buffer
            .complete_reply(reservation, text.clone(), model_used)
            .id;
        let revealing = self.reveal.is_some();
        if revealing {
            state.buffer.reveal(message_id, text.clone())?;
        }
        self.persist(&state.buffer);

        Ok(SubmitOutcome::Replied(Reply {
            message_id,
            text,
            model: endpoint.model,
            kind,
            revealing,
        }))
    }

    /// Reveal a reply character by character
    ///
    /// `on_char` sees every newly visible character. Returns `Finished` once
    /// the full text is visible, or `Superseded` when another submission or
    /// a session change took over first.
    pub async fn drive_reveal<F>(&self, message_id: u64, mut on_char: F) -> RevealStep
    where
        F: FnMut(char) + Send,
    {
        let schedule = self.reveal.unwrap_or_else(RevealSchedule::instant);
        loop {
            let step = self.state.write().await.buffer.advance_reveal(message_id);
            match step {
                RevealStep::Revealed(ch) => {
                    on_char(ch);
                    let delay = schedule.delay_after(ch);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                RevealStep::Finished => {
                    let state = self.state.read().await;
                    self.persist(&state.buffer);
                    return step;
                }
                RevealStep::Superseded => return step,
            }
        }
    }

    /// Jump any in-flight reveal to its full text
    pub async fn finish_reveal(&self) -> Option<u64> {
        self.state.write().await.buffer.finish_reveal()
    }

    // ---- Sessions ----

    /// Start a fresh session; the old one stays in the store
    pub async fn new_session(&self) -> String {
        let mut state = self.state.write().await;
        self.leave_session(&mut state.buffer);
        state.buffer = ConversationBuffer::new();
        tracing::info!("Started session {}", state.buffer.session_id());
        state.buffer.session_id().to_string()
    }

    /// Make a stored session the active one
    pub async fn switch_session(&self, id: &str) -> Result<SessionMeta, ChatError> {
        let mut state = self.state.write().await;
        if state.buffer.session_id() == id {
            return Ok(SessionMeta::from(&state.buffer.snapshot()));
        }
        let session = self.store.get(id)?;
        self.leave_session(&mut state.buffer);
        let meta = SessionMeta::from(&session);
        state.buffer = ConversationBuffer::from_session(session);
        tracing::info!("Switched to session {}", id);
        Ok(meta)
    }

    /// Stored sessions, most recently active first
    pub fn list_sessions(&self) -> Vec<SessionMeta> {
        self.store.load().iter().map(SessionMeta::from).collect()
    }

    /// Export the active session
    pub async fn export_current(&self) -> ExportDocument {
        self.state.read().await.buffer.snapshot().export()
    }

    /// Export a stored session
    pub fn export(&self, id: &str) -> Result<ExportDocument, SessionError> {
        Ok(self.store.get(id)?.export())
    }

    /// Delete one stored session
    ///
    /// Deleting the active session starts a fresh one in its place.
    pub async fn delete_session(&self, id: &str) -> Result<(), SessionError> {
        let mut state = self.state.write().await;
        self.store.delete(id)?;
        if state.buffer.session_id() == id {
            state.buffer.cancel_pending();
            state.buffer = ConversationBuffer::new();
        }
        tracing::info!("Deleted session {}", id);
        Ok(())
    }

    /// Delete every stored session and start over
    pub async fn clear_sessions(&self) -> Result<(), SessionError> {
        let mut state = self.state.write().await;
        state.buffer.cancel_pending();
        state.buffer = ConversationBuffer::new();
        self.store.clear()?;
        Ok(())
    }

    // ---- Backend status ----

    pub async fn health(&self) -> Result<HealthReport, BackendError> {
        self.backend.health().await
    }

    pub async fn models(&self) -> Result<ModelsReport, BackendError> {
        self.backend.models().await
    }

    // ---- Quiz ----

    pub async fn random_question(&self) -> Result<QuizQuestion, BackendError> {
        self.backend.random_question().await
    }

    /// Grade an answer; `answer` is a choice letter or free text
    pub async fn check_answer(
        &self,
        question: &QuizQuestion,
        answer: &str,
    ) -> Result<AnswerVerdict, BackendError> {
        let answer = question
            .parse_choice(answer)
            .unwrap_or_else(|| answer.trim().to_string());
        self.backend.check_answer(question, &answer).await
    }

    pub async fn topics(&self) -> Result<Vec<String>, BackendError> {
        self.backend.topics().await
    }

    // Private helper methods

    /// Settle the outgoing session before another one becomes active
    fn leave_session(&self, buffer: &mut ConversationBuffer) {
        buffer.cancel_pending();
        buffer.finish_reveal();
        self.persist(buffer);
    }

    /// Write the active session; storage failures are logged, not raised
    fn persist(&self, buffer: &ConversationBuffer) {
        if buffer.is_empty() {
            return;
        }
        if let Err(e) = self.store.upsert(&buffer.snapshot()) {
            tracing::error!("Failed to save session {}: {:#}", buffer.session_id(), e);
        }
    }
}

fn log_backend_failure(err: &BackendError) {
    match err.status() {
        Some(status) => tracing::warn!("Backend answered with HTTP {}", status),
        None if err.is_connection_error() => tracing::warn!("Backend unreachable: {}", err),
        None => tracing::warn!("Backend request failed: {}", err),
    }
}

/// Model tag the backend reported, when it is not the one we routed to
fn reported_model_mismatch(reply: &BackendReply, routed: ModelId) -> Option<&str> {
    reply
        .model_used
        .as_deref()
        .filter(|tag| *tag != routed.tag())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::Endpoint;
    use crate::core::types::Role;
    use crate::llm::{HistoryTurn, FALLBACK_REPLY};
    use std::collections::BTreeMap;
    use crate::storage::JsonSessionStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records every call and answers with a canned result
    struct ScriptedBackend {
        calls: Mutex<Vec<(String, Vec<HistoryTurn>, Endpoint)>>,
        answers: Mutex<Vec<String>>,
        answer: Result<&'static str, u16>,
    }

    impl ScriptedBackend {
        fn answering(text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                answers: Mutex::new(Vec::new()),
                answer: Ok(text),
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                answers: Mutex::new(Vec::new()),
                answer: Err(status),
            })
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(
            &self,
            message: &str,
            history: &[HistoryTurn],
            endpoint: &Endpoint,
        ) -> Result<BackendReply, BackendError> {
            self.calls.lock().unwrap().push((
                message.to_string(),
                history.to_vec(),
                endpoint.clone(),
            ));
            match self.answer {
                Ok("") => Ok(BackendReply::from_body("{}")),
                Ok(text) => Ok(BackendReply {
                    text: text.to_string(),
                    model_used: None,
                    fallback: false,
                }),
                Err(status) => Err(BackendError::Status {
                    status,
                    body: "boom".to_string(),
                }),
            }
        }

        async fn health(&self) -> Result<HealthReport, BackendError> {
            Ok(HealthReport::default())
        }

        async fn models(&self) -> Result<ModelsReport, BackendError> {
            Ok(ModelsReport::default())
        }

        async fn random_question(&self) -> Result<QuizQuestion, BackendError> {
            let choices = BTreeMap::from([
                ("A".to_string(), "8".to_string()),
                ("B".to_string(), "16".to_string()),
            ]);
            Ok(QuizQuestion {
                question: "How many bits in an IPv4 octet?".to_string(),
                choices,
                topic: None,
                extra: serde_json::Map::new(),
            })
        }

        async fn check_answer(
            &self,
            _question: &QuizQuestion,
            answer: &str,
        ) -> Result<AnswerVerdict, BackendError> {
            self.answers.lock().unwrap().push(answer.to_string());
            Ok(AnswerVerdict {
                correct: answer == "A",
                correct_answer: "A".to_string(),
                explanation: String::new(),
            })
        }

        async fn topics(&self) -> Result<Vec<String>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn service_with(
        backend: Arc<ScriptedBackend>,
        mode: Mode,
    ) -> (TempDir, Arc<JsonSessionStore>, ChatService) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(JsonSessionStore::new(temp.path()).unwrap());
        let service = ChatService::new(
            store.clone(),
            backend,
            ModelRouter::default(),
            ChatOptions {
                mode,
                history_window: 10,
                reveal: None,
            },
        );
        (temp, store, service)
    }

    #[tokio::test]
    async fn test_practice_submission_uses_qwen2() {
        let backend = ScriptedBackend::answering("A subnet mask divides...");
        let (_temp, store, service) = service_with(backend.clone(), Mode::Practice);

        let outcome = service.submit("  What is VLSM?  ").await.unwrap();
        let SubmitOutcome::Replied(reply) = outcome else {
            panic!("expected a reply");
        };
        assert_eq!(reply.kind, ReplyKind::Answer);
        assert_eq!(reply.model, ModelId::Qwen2);

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].0, "What is VLSM?");
        assert!(calls[0].1.is_empty());
        assert_eq!(calls[0].2.path, "/chat-qwen2");

        let messages = service.messages().await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "A subnet mask divides...");
        assert_eq!(messages[1].model_used, Some(ModelId::Qwen2));

        let stored = store.load();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_input_appends_nothing() {
        let backend = ScriptedBackend::answering("unused");
        let (_temp, store, service) = service_with(backend.clone(), Mode::Concepts);

        assert!(matches!(
            service.submit("   \n").await,
            Err(ChatError::EmptyInput)
        ));
        assert!(service.messages().await.is_empty());
        assert!(backend.calls.lock().unwrap().is_empty());
        assert!(store.load().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_one_notice() {
        let backend = ScriptedBackend::failing(500);
        let (_temp, _store, service) = service_with(backend, Mode::Concepts);

        let SubmitOutcome::Replied(reply) = service.submit("hello").await.unwrap() else {
            panic!("expected a reply");
        };
        assert_eq!(reply.kind, ReplyKind::ConnectionError);

        let messages = service.messages().await;
        let notices: Vec<_> = messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].content, CONNECTION_NOTICE);
        assert_eq!(notices[0].model_used, None);
        assert!(!service.is_busy());
    }

    #[tokio::test]
    async fn test_empty_answer_is_fallback() {
        let backend = ScriptedBackend::answering("");
        let (_temp, _store, service) = service_with(backend, Mode::Configuration);

        let SubmitOutcome::Replied(reply) = service.submit("show ip route?").await.unwrap() else {
            panic!("expected a reply");
        };
        assert_eq!(reply.kind, ReplyKind::Fallback);
        assert_eq!(reply.text, FALLBACK_REPLY);
        assert_eq!(reply.model, ModelId::Gemini);
    }

    #[tokio::test]
    async fn test_history_excludes_new_prompt() {
        let backend = ScriptedBackend::answering("ok");
        let (_temp, _store, service) = service_with(backend.clone(), Mode::Concepts);

        service.submit("first").await.unwrap();
        service.submit("second").await.unwrap();

        let calls = backend.calls.lock().unwrap();
        let history = &calls[1].1;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "ok");
    }

    #[tokio::test]
    async fn test_mode_switch_resets_model() {
        let backend = ScriptedBackend::answering("ok");
        let (_temp, _store, service) = service_with(backend, Mode::Concepts);

        service.set_model(ModelId::Phi3).await.unwrap();
        assert_eq!(service.selected_model().await, ModelId::Phi3);
        assert_eq!(service.set_mode(Mode::Practice).await, ModelId::Qwen2);
        assert!(matches!(
            service.set_model(ModelId::Gemini).await,
            Err(RouterError::InvalidModelSelection { .. })
        ));
        assert_eq!(service.selected_model().await, ModelId::Qwen2);
    }

    #[tokio::test]
    async fn test_switch_session_round_trip() {
        let backend = ScriptedBackend::answering("ok");
        let (_temp, _store, service) = service_with(backend, Mode::Concepts);

        service.submit("first session").await.unwrap();
        let first = service.session_id().await;
        let second = service.new_session().await;
        assert_ne!(first, second);
        assert!(service.messages().await.is_empty());

        let meta = service.switch_session(&first).await.unwrap();
        assert_eq!(meta.title, "first session");
        assert_eq!(service.messages().await.len(), 2);

        assert!(matches!(
            service.switch_session("session_missing").await,
            Err(ChatError::Session(SessionError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_clear_sessions() {
        let backend = ScriptedBackend::answering("ok");
        let (_temp, store, service) = service_with(backend, Mode::Concepts);

        service.submit("hello").await.unwrap();
        service.clear_sessions().await.unwrap();
        assert!(store.load().is_empty());
        assert!(service.list_sessions().is_empty());
        assert!(service.messages().await.is_empty());
    }

    #[test]
    fn test_reported_model_mismatch() {
        let reply = BackendReply::from_body(r#"{"response": "ok", "model_used": "qwen2:0.5b"}"#);
        assert_eq!(reported_model_mismatch(&reply, ModelId::Qwen2), None);
        assert_eq!(
            reported_model_mismatch(&reply, ModelId::Llama),
            Some("qwen2:0.5b")
        );
        let silent = BackendReply::from_body(r#"{"response": "ok"}"#);
        assert_eq!(reported_model_mismatch(&silent, ModelId::Llama), None);
    }

    #[tokio::test]
    async fn test_delete_active_session_starts_fresh() {
        let backend = ScriptedBackend::answering("ok");
        let (_temp, store, service) = service_with(backend, Mode::Concepts);

        service.submit("keep me").await.unwrap();
        let kept = service.session_id().await;
        service.new_session().await;
        service.submit("drop me").await.unwrap();
        let dropped = service.session_id().await;

        service.delete_session(&dropped).await.unwrap();
        assert_ne!(service.session_id().await, dropped);
        assert!(service.messages().await.is_empty());
        let ids: Vec<String> = store.load().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![kept.clone()]);

        assert!(matches!(
            service.delete_session(&dropped).await,
            Err(SessionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_check_answer_normalises_choice_letter() {
        let backend = ScriptedBackend::answering("ok");
        let (_temp, _store, service) = service_with(backend.clone(), Mode::Practice);

        let question = service.random_question().await.unwrap();
        let verdict = service.check_answer(&question, " a ").await.unwrap();
        assert!(verdict.correct);
        let verdict = service.check_answer(&question, "sixteen").await.unwrap();
        assert!(!verdict.correct);
        assert_eq!(*backend.answers.lock().unwrap(), vec!["A", "sixteen"]);
    }

    #[tokio::test]
    async fn test_reveal_runs_to_completion() {
        let backend = ScriptedBackend::answering("Hi.");
        let temp = TempDir::new().unwrap();
        let store = Arc::new(JsonSessionStore::new(temp.path()).unwrap());
        let service = ChatService::new(
            store.clone(),
            backend,
            ModelRouter::default(),
            ChatOptions {
                reveal: Some(RevealSchedule::instant()),
                ..ChatOptions::default()
            },
        );

        let SubmitOutcome::Replied(reply) = service.submit("hey").await.unwrap() else {
            panic!("expected a reply");
        };
        assert!(reply.revealing);
        assert_eq!(service.messages().await[1].content, "");
        // Storage already holds the full text
        assert_eq!(store.load()[0].messages[1].content, "Hi.");

        let mut seen = String::new();
        let step = service
            .drive_reveal(reply.message_id, |ch| seen.push(ch))
            .await;
        assert_eq!(step, RevealStep::Finished);
        assert_eq!(seen, "Hi.");
        assert_eq!(service.messages().await[1].content, "Hi.");
    }
}
