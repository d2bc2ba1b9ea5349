use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tutor_cli::config::Config;
use tutor_cli::core::{Mode, ModelId};
use tutor_cli::transport::{cli, ChatArgs};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("TUTOR_GIT_HASH"),
    ")"
);

#[derive(Parser)]
#[command(name = "tutor")]
#[command(author, version, long_version = LONG_VERSION)]
#[command(about = "Tutor - CCNA study chat client with mode-aware model routing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding sessions.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Base URL of the tutor backend
    #[arg(long, global = true)]
    backend_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat session
    Chat {
        /// Mode to start in (concepts, configuration, troubleshooting, practice)
        #[arg(long)]
        mode: Option<Mode>,

        /// Model to use, must be eligible in the mode (llama, phi3, gemini, qwen2)
        #[arg(long)]
        model: Option<ModelId>,

        /// Resume a saved session
        #[arg(long)]
        session: Option<String>,

        /// Print replies at once instead of revealing them progressively
        #[arg(long)]
        no_reveal: bool,
    },

    /// Ask a single question and print the answer
    Ask {
        /// The question
        message: String,

        #[arg(long)]
        mode: Option<Mode>,

        #[arg(long)]
        model: Option<ModelId>,

        /// Pick the mode from the wording of the question
        #[arg(long, conflicts_with = "mode")]
        infer_mode: bool,
    },

    /// List saved sessions
    Sessions,

    /// Export a saved session as JSON
    Export {
        /// Session ID
        id: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a saved session
    Delete {
        /// Session ID
        id: String,
    },

    /// Delete all saved sessions
    Clear,

    /// Answer multiple-choice practice questions from the backend
    Quiz {
        /// Number of questions to ask
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,

        /// List the question topics first
        #[arg(long)]
        topics: bool,
    },

    /// Show the mode table and the models the backend has loaded
    Models,

    /// Check backend health
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "tutor_cli=debug"
    } else {
        "tutor_cli=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env_overrides();
            config
        }
        None => Config::load()?,
    };
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = Some(dir);
    }
    if let Some(url) = cli.backend_url {
        config.backend.base_url = url;
    }

    match cli.command {
        Commands::Chat {
            mode,
            model,
            session,
            no_reveal,
        } => {
            tracing::info!("Starting chat against {}", config.backend.base_url);
            let args = ChatArgs {
                mode,
                model,
                session,
                no_reveal,
            };
            cli::run_chat(&config, args).await?;
        }
        Commands::Ask {
            message,
            mode,
            model,
            infer_mode,
        } => {
            cli::run_ask(&config, &message, mode, model, infer_mode).await?;
        }
        Commands::Sessions => {
            cli::run_sessions(&config).await?;
        }
        Commands::Export { id, output } => {
            cli::run_export(&config, &id, output.as_deref()).await?;
        }
        Commands::Delete { id } => {
            cli::run_delete(&config, &id).await?;
        }
        Commands::Clear => {
            cli::run_clear(&config).await?;
        }
        Commands::Quiz { count, topics } => {
            cli::run_quiz(&config, count, topics).await?;
        }
        Commands::Models => {
            cli::run_models(&config).await?;
        }
        Commands::Health => {
            cli::run_health(&config).await?;
        }
    }

    Ok(())
}
