//! CLI commands: interactive chat and one-shot subcommands

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::core::router::{self, ModelRouter};
use crate::core::types::{Mode, ModelId, Role};
use crate::core::RevealStep;
use crate::llm::{InferenceBackend, QuizQuestion, TutorApiBackend};
use crate::services::{ChatOptions, ChatService, Reply, ReplyKind, SubmitOutcome};
use crate::storage::{ExportDocument, JsonSessionStore, SessionMessage, SessionMeta};

/// Options of `tutor chat`
#[derive(Debug, Clone, Default)]
pub struct ChatArgs {
    pub mode: Option<Mode>,
    pub model: Option<ModelId>,
    pub session: Option<String>,
    pub no_reveal: bool,
}

/// Slash commands understood inside the chat loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// `/mode [name]`; without a name lists the modes
    Mode(Option<Mode>),
    /// `/model [id]`; without an id lists the eligible models
    Model(Option<ModelId>),
    New,
    Switch(String),
    Sessions,
    Export(Option<PathBuf>),
    Help,
    Quit,
}

impl ChatCommand {
    /// Parse a line of input; `None` means it is a prompt, not a command
    pub fn parse(line: &str) -> Option<Result<Self, String>> {
        let line = line.trim();
        let rest = line.strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or("").to_lowercase();
        let arg = parts.next();

        let command = match (name.as_str(), arg) {
            ("mode", None) => Ok(ChatCommand::Mode(None)),
            ("mode", Some(m)) => m
                .parse::<Mode>()
                .map(|m| ChatCommand::Mode(Some(m)))
                .map_err(|e| e.to_string()),
            ("model", None) => Ok(ChatCommand::Model(None)),
            ("model", Some(m)) => m
                .parse::<ModelId>()
                .map(|m| ChatCommand::Model(Some(m)))
                .map_err(|e| e.to_string()),
            ("new", _) => Ok(ChatCommand::New),
            ("switch", Some(id)) => Ok(ChatCommand::Switch(id.to_string())),
            ("switch", None) => Err("Usage: /switch <session-id>".to_string()),
            ("sessions", _) => Ok(ChatCommand::Sessions),
            ("export", path) => Ok(ChatCommand::Export(path.map(PathBuf::from))),
            ("help", _) | ("?", _) => Ok(ChatCommand::Help),
            ("quit", _) | ("exit", _) | ("q", _) => Ok(ChatCommand::Quit),
            _ => Err(format!("Unknown command: /{}. Type /help for commands.", name)),
        };
        Some(command)
    }
}

/// Reply being revealed in the background while the prompt stays live
pub struct ActiveReveal {
    handle: JoinHandle<RevealStep>,
    text: String,
    shown: Arc<AtomicUsize>,
}

impl ActiveReveal {
    /// Drive the reveal of `reply` on a task, feeding each character to `on_char`
    pub fn spawn<F>(service: Arc<ChatService>, reply: &Reply, mut on_char: F) -> Self
    where
        F: FnMut(char) + Send + 'static,
    {
        let shown = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&shown);
        let message_id = reply.message_id;
        let handle = tokio::spawn(async move {
            service
                .drive_reveal(message_id, move |ch| {
                    on_char(ch);
                    counter.fetch_add(1, Ordering::AcqRel);
                })
                .await
        });
        Self {
            handle,
            text: reply.text.clone(),
            shown,
        }
    }

    /// Wait for the reveal to end on its own
    pub async fn wait(&mut self) -> RevealStep {
        (&mut self.handle).await.unwrap_or(RevealStep::Superseded)
    }

    /// Jump to the full text; returns the part the reveal had not shown yet
    pub async fn skip(self, service: &ChatService) -> String {
        service.finish_reveal().await;
        if let Err(e) = self.handle.await {
            tracing::warn!("Reveal task failed: {}", e);
        }
        let shown = self.shown.load(Ordering::Acquire);
        self.text.chars().skip(shown).collect()
    }
}

/// What woke the chat loop
enum LoopEvent {
    Line(std::io::Result<Option<String>>),
    RevealDone,
    Interrupt,
}

/// Build the chat service from configuration
pub fn build_service(config: &Config, reveal: bool) -> Result<ChatService> {
    let store = Arc::new(JsonSessionStore::new(config.data_dir())?);
    let api = TutorApiBackend::from_config(&config.backend)?;
    tracing::debug!(
        "Using backend {} at {}, data dir {}",
        api.name(),
        api.base_url(),
        config.data_dir().display()
    );
    let backend: Arc<dyn InferenceBackend> = Arc::new(api);
    let router =
        ModelRouter::with_endpoints(config.chat.default_mode, config.backend.endpoint_table());
    let mut options = ChatOptions::from_config(config);
    if !reveal {
        options.reveal = None;
    }
    Ok(ChatService::new(store, backend, router, options))
}

/// Run the interactive chat loop
///
/// While a reply is being revealed the loop keeps reading input: Enter or
/// Ctrl+C shows the rest at once, and any other line is handled after the
/// reveal is skipped.
pub async fn run_chat(config: &Config, args: ChatArgs) -> Result<()> {
    let service = Arc::new(build_service(config, !args.no_reveal)?);

    if let Some(id) = &args.session {
        let meta = service.switch_session(id).await?;
        println!("{} {}", "Resumed:".bold(), meta.title);
        for message in service.messages().await {
            print_message(&message);
        }
    }
    if let Some(mode) = args.mode {
        service.set_mode(mode).await;
    }
    if let Some(model) = args.model {
        service.set_model(model).await?;
    }

    println!("{}", "=== CCNA Tutor ===".bold().cyan());
    println!("Backend: {}", config.backend.base_url);
    print_selection(&service).await;
    println!("Type /help for commands, /quit to exit\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut active: Option<ActiveReveal> = None;
    loop {
        if active.is_none() {
            print!(
                "{} ",
                format!("[{}:{}]>", service.mode().await, service.selected_model().await)
                    .green()
            );
            std::io::stdout().flush()?;
        }

        let event = match active.as_mut() {
            Some(reveal) => tokio::select! {
                _ = reveal.wait() => LoopEvent::RevealDone,
                line = lines.next_line() => LoopEvent::Line(line),
                _ = tokio::signal::ctrl_c() => LoopEvent::Interrupt,
            },
            None => tokio::select! {
                line = lines.next_line() => LoopEvent::Line(line),
                _ = tokio::signal::ctrl_c() => LoopEvent::Interrupt,
            },
        };

        let line = match event {
            LoopEvent::RevealDone => {
                active = None;
                println!("\n");
                continue;
            }
            LoopEvent::Interrupt => match active.take() {
                Some(reveal) => {
                    println!("{}\n", reveal.skip(&service).await);
                    continue;
                }
                None => {
                    println!("\nGoodbye!");
                    break;
                }
            },
            LoopEvent::Line(line) => line?,
        };

        if let Some(reveal) = active.take() {
            println!("{}\n", reveal.skip(&service).await);
            // A bare Enter only skips the reveal
            if line.as_deref().is_some_and(|l| l.trim().is_empty()) {
                continue;
            }
        }
        let Some(line) = line else {
            println!();
            break;
        };

        match ChatCommand::parse(&line) {
            Some(Ok(ChatCommand::Quit)) => {
                println!("Goodbye!");
                break;
            }
            Some(Ok(command)) => {
                if let Err(e) = handle_command(&service, command).await {
                    eprintln!("{} {}\n", "Error:".red(), e);
                }
            }
            Some(Err(message)) => eprintln!("{}\n", message.yellow()),
            None => active = send_and_render(&service, &line).await,
        }
    }

    if let Some(reveal) = active {
        println!("{}", reveal.skip(&service).await);
    }
    service.finish_reveal().await;
    Ok(())
}

/// Send one question and print the answer
pub async fn run_ask(
    config: &Config,
    message: &str,
    mode: Option<Mode>,
    model: Option<ModelId>,
    infer_mode: bool,
) -> Result<()> {
    let service = build_service(config, false)?;
    let mode = match (mode, infer_mode) {
        (Some(mode), _) => Some(mode),
        (None, true) => {
            let inferred = Mode::infer(message);
            tracing::info!("Inferred {} mode", inferred);
            Some(inferred)
        }
        (None, false) => None,
    };
    if let Some(mode) = mode {
        service.set_mode(mode).await;
    }
    if let Some(model) = model {
        service.set_model(model).await?;
    }

    match service.submit(message).await? {
        SubmitOutcome::Replied(reply) => {
            println!("{}", reply.text);
            if reply.kind == ReplyKind::ConnectionError {
                anyhow::bail!("Backend request to {} failed", reply.model);
            }
        }
        SubmitOutcome::Stale { .. } => {}
    }
    Ok(())
}

/// List stored sessions
pub async fn run_sessions(config: &Config) -> Result<()> {
    let service = build_service(config, false)?;
    print_sessions(&service.list_sessions());
    Ok(())
}

/// Export a stored session as JSON to a file or stdout
pub async fn run_export(config: &Config, id: &str, output: Option<&Path>) -> Result<()> {
    let service = build_service(config, false)?;
    let document = service.export(id)?;
    write_export(&document, output)
}

/// Delete one stored session
pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let service = build_service(config, false)?;
    service.delete_session(id).await?;
    println!("Deleted {}", id);
    Ok(())
}

/// Delete every stored session
pub async fn run_clear(config: &Config) -> Result<()> {
    let service = build_service(config, false)?;
    let count = service.list_sessions().len();
    service.clear_sessions().await?;
    println!("Deleted {} session(s)", count);
    Ok(())
}

/// Multiple-choice practice against the backend's question bank
///
/// Answers are read from stdin, one line per question. An empty line skips
/// the question and end of input stops the quiz.
pub async fn run_quiz(config: &Config, count: usize, show_topics: bool) -> Result<()> {
    let service = build_service(config, false)?;

    if show_topics {
        let topics = service
            .topics()
            .await
            .with_context(|| format!("Could not fetch topics from {}", config.backend.base_url))?;
        println!("{}", "=== TOPICS ===".bold().cyan());
        for topic in &topics {
            println!("  {}", topic);
        }
        println!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut answered = 0;
    let mut score = 0;
    for round in 1..=count {
        let question = service
            .random_question()
            .await
            .context("Could not fetch a quiz question")?;
        print_question(round, &question);
        print!("{} ", "Answer:".bold());
        std::io::stdout().flush()?;

        let Some(answer) = lines.next_line().await? else {
            println!();
            break;
        };
        if answer.trim().is_empty() {
            println!("Skipped\n");
            continue;
        }

        let verdict = service.check_answer(&question, &answer).await?;
        answered += 1;
        if verdict.correct {
            score += 1;
            println!("{}", "Correct!".green().bold());
        } else {
            println!(
                "{} The answer is {}",
                "Incorrect.".red().bold(),
                verdict.correct_answer.bold()
            );
        }
        if !verdict.explanation.is_empty() {
            println!("{}", verdict.explanation);
        }
        println!();
    }

    println!("Score: {}/{}", score, answered);
    Ok(())
}

/// Show the mode table and what the backend reports as loaded
pub async fn run_models(config: &Config) -> Result<()> {
    println!("{}", "=== MODES ===".bold().cyan());
    for mode in Mode::ALL {
        let profile = router::profile(mode);
        let alternates: Vec<&str> = profile.alternates.iter().map(|m| m.as_str()).collect();
        println!(
            "  {:<16} default {:<7} alternates {}",
            mode.to_string().green(),
            profile.default.as_str(),
            alternates.join(", ")
        );
    }
    println!();

    let service = build_service(config, false)?;
    match service.models().await {
        Ok(report) => {
            println!("{}", "=== BACKEND MODELS ===".bold().cyan());
            for model in report.available_models {
                println!(
                    "  {:<8} {:<24} {}",
                    model.id.green(),
                    model.model,
                    model.endpoint.dimmed()
                );
            }
        }
        Err(e) => eprintln!("{} {}", "Backend unavailable:".yellow(), e),
    }
    Ok(())
}

/// Query backend health
pub async fn run_health(config: &Config) -> Result<()> {
    let service = build_service(config, false)?;
    let report = service
        .health()
        .await
        .with_context(|| format!("Backend at {} is not reachable", config.backend.base_url))?;

    let status = if report.is_healthy() {
        report.status.green()
    } else {
        report.status.yellow()
    };
    println!("Status: {}", status);
    if let Some(version) = &report.api_version {
        println!("API version: {}", version);
    }
    for model in &report.models_available {
        println!("  {:<10} {}", model.name, model.endpoint.dimmed());
    }
    if !report.is_healthy() {
        anyhow::bail!("Backend reported status '{}'", report.status);
    }
    Ok(())
}

// ---- Chat loop helpers ----

async fn handle_command(service: &ChatService, command: ChatCommand) -> Result<()> {
    match command {
        ChatCommand::Mode(None) => {
            let current = service.mode().await;
            for mode in Mode::ALL {
                let marker = if mode == current { "*" } else { " " };
                println!("{} {:<16} {}", marker, mode.to_string(), mode.description());
            }
            println!();
        }
        ChatCommand::Mode(Some(mode)) => {
            let model = service.set_mode(mode).await;
            println!("Mode: {} (model {})\n", mode.label().bold(), model);
        }
        ChatCommand::Model(None) => {
            let selected = service.selected_model().await;
            for model in service.eligible_models().await {
                let marker = if model == selected { "*" } else { " " };
                println!("{} {:<7} {}", marker, model.as_str(), model.display_name());
            }
            println!();
        }
        ChatCommand::Model(Some(model)) => {
            service.set_model(model).await?;
            println!("Model: {}\n", model.display_name().bold());
        }
        ChatCommand::New => {
            let id = service.new_session().await;
            println!("Started {}\n", id.dimmed());
        }
        ChatCommand::Switch(id) => {
            let meta = service.switch_session(&id).await?;
            println!("{} {}\n", "Switched to".bold(), meta.title);
            for message in service.messages().await {
                print_message(&message);
            }
        }
        ChatCommand::Sessions => print_sessions(&service.list_sessions()),
        ChatCommand::Export(path) => {
            let document = service.export_current().await;
            let path =
                path.unwrap_or_else(|| PathBuf::from(format!("{}.json", document.session_id)));
            write_export(&document, Some(&path))?;
        }
        ChatCommand::Help => print_help(),
        ChatCommand::Quit => {}
    }
    Ok(())
}

async fn send_and_render(service: &Arc<ChatService>, line: &str) -> Option<ActiveReveal> {
    match service.submit(line).await {
        Ok(SubmitOutcome::Replied(reply)) => render_reply(service, &reply),
        Ok(SubmitOutcome::Stale { .. }) => None,
        Err(e) if e.is_silent() => None,
        Err(e) => {
            eprintln!("{} {}\n", "Error:".red(), e);
            None
        }
    }
}

fn render_reply(service: &Arc<ChatService>, reply: &Reply) -> Option<ActiveReveal> {
    println!(
        "{}",
        format!("tutor ({})", reply.model.display_name()).cyan().bold()
    );
    if reply.kind == ReplyKind::ConnectionError {
        println!("{}\n", reply.text.yellow());
        return None;
    }
    if !reply.revealing {
        println!("{}\n", reply.text);
        return None;
    }
    Some(ActiveReveal::spawn(Arc::clone(service), reply, |ch| {
        print!("{}", ch);
        let _ = std::io::stdout().flush();
    }))
}

fn print_question(round: usize, question: &QuizQuestion) {
    println!("{} {}", format!("Q{}.", round).bold(), question.question);
    if let Some(topic) = &question.topic {
        println!("   {}", topic.dimmed());
    }
    for (letter, text) in &question.choices {
        println!("   {}) {}", letter.green(), text);
    }
}

async fn print_selection(service: &ChatService) {
    let mode = service.mode().await;
    println!("Mode: {} - {}", mode.label().bold(), mode.description());
    println!(
        "Model: {}",
        service.selected_model().await.display_name().bold()
    );
}

fn print_message(message: &SessionMessage) {
    match message.role {
        Role::User => println!("{} {}", ">".green(), message.content),
        Role::Assistant => println!("{}\n", message.content),
    }
}

fn print_sessions(sessions: &[SessionMeta]) {
    if sessions.is_empty() {
        println!("No saved sessions");
        return;
    }
    for meta in sessions {
        println!(
            "{}  {:<52} {:>3} msgs  {}",
            meta.id.dimmed(),
            meta.title,
            meta.message_count,
            meta.last_activity.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  /mode [name]     Show or switch mode (concepts, configuration, troubleshooting, practice)");
    println!("  /model [id]      Show or switch model within the mode");
    println!("  /new             Start a new session");
    println!("  /switch <id>     Resume a saved session");
    println!("  /sessions        List saved sessions");
    println!("  /export [file]   Export the current session as JSON");
    println!("  Enter or Ctrl+C  Show the rest of a reply being revealed");
    println!("  /help            Show this help");
    println!("  /quit            Exit");
    println!();
}

fn write_export(document: &ExportDocument, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(document)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Exported {} message(s) to {}",
                document.messages.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert!(ChatCommand::parse("What is OSPF?").is_none());
        assert!(ChatCommand::parse("  hello /mode").is_none());
    }

    #[test]
    fn test_parse_mode_and_model() {
        assert_eq!(
            ChatCommand::parse("/mode practice"),
            Some(Ok(ChatCommand::Mode(Some(Mode::Practice))))
        );
        assert_eq!(ChatCommand::parse("/mode"), Some(Ok(ChatCommand::Mode(None))));
        assert_eq!(
            ChatCommand::parse("/model phi3:mini"),
            Some(Ok(ChatCommand::Model(Some(ModelId::Phi3))))
        );
        assert!(matches!(ChatCommand::parse("/mode quiz"), Some(Err(_))));
        assert!(matches!(ChatCommand::parse("/model gpt4"), Some(Err(_))));
    }

    #[test]
    fn test_parse_session_commands() {
        assert_eq!(
            ChatCommand::parse("/switch session_abc"),
            Some(Ok(ChatCommand::Switch("session_abc".to_string())))
        );
        assert!(matches!(ChatCommand::parse("/switch"), Some(Err(_))));
        assert_eq!(
            ChatCommand::parse("/export out.json"),
            Some(Ok(ChatCommand::Export(Some(PathBuf::from("out.json")))))
        );
        assert_eq!(ChatCommand::parse("/QUIT"), Some(Ok(ChatCommand::Quit)));
        assert!(matches!(ChatCommand::parse("/frobnicate"), Some(Err(_))));
    }

    #[test]
    fn test_write_export_to_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("export.json");
        let mut session = crate::storage::ChatSession::new();
        session
            .messages
            .push(SessionMessage::new(1, Role::User, "What is VLSM?"));
        write_export(&session.export(), Some(&path)).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["sessionId"], session.id);
        assert_eq!(value["messages"][0]["role"], "user");
    }
}
