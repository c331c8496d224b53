//! coachflow - plan training by chatting about it
//!
//! Usage:
//!   coachflow chat --user alice      → chat in the terminal
//!   coachflow --dump-config          → print the effective config as TOML
//!   coachflow gc                     → drop expired checkpoints
//!   coachflow version                → show version

use clap::{Parser, Subcommand};
use coachflow_agents::{CheckpointBackend, CoachConfig, CoachRuntime, MemoryStore, Reply};
use coachflow_graph::{CheckpointStore, FileCheckpointStore};
use coachflow_llm::AnthropicExtractor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[derive(Parser)]
#[command(
    name = "coachflow",
    about = "Conversational fitness planning: plans, blocks, weeks and workouts",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the config file (TOML)
    #[arg(long, global = true, default_value = "coachflow.toml")]
    config: PathBuf,

    /// Print the effective config and exit
    #[arg(long, default_value_t = false)]
    dump_config: bool,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the coach in the terminal
    Chat {
        /// Whose plans to work on
        #[arg(short, long, default_value = "local")]
        user: String,
    },
    /// Remove expired checkpoints
    Gc,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;
    let config = CoachConfig::load(&cli.config);

    if cli.dump_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    match cli.command {
        Some(Commands::Chat { user }) => chat(&config, &user).await?,
        Some(Commands::Gc) => gc(&config).await?,
        Some(Commands::Version) => println!("coachflow v{}", env!("CARGO_PKG_VERSION")),
        None => {
            println!("Nothing to do. Try `coachflow chat --user <name>` or `coachflow --help`.");
        }
    }
    Ok(())
}

fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "coachflow=info".into())
    };
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(stderr).init();
        return Ok(None);
    };

    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("--log-file needs a file name: {}", path.display()))?;
    std::fs::create_dir_all(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    let file = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_filter(filter());

    tracing_subscriber::registry().with(stderr).with(file).init();
    Ok(Some(guard))
}

async fn chat(config: &CoachConfig, user: &str) -> anyhow::Result<()> {
    let api_key = CoachConfig::api_key()
        .ok_or_else(|| anyhow::anyhow!("{} not set", coachflow_agents::config::API_KEY_ENV))?;
    let mut extractor = AnthropicExtractor::new(api_key)
        .with_model(config.extractor.model.clone())
        .with_max_tokens(config.extractor.max_tokens);
    if let Some(url) = &config.extractor.base_url {
        extractor = extractor.with_base_url(url.clone());
    }

    let runtime = CoachRuntime::open(config, Arc::new(extractor), Arc::new(MemoryStore::new())).await?;
    tracing::info!(user, "chat started");

    println!("coachflow v{} - talking to {}", env!("CARGO_PKG_VERSION"), user);
    println!("Type a request. `/new <text>` drops an open question, `/quit` exits.");
    if let Some(pending) = runtime.pending(user).await? {
        println!("\n(waiting on your answer)\n{}", pending.task.render());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"\n> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        let result = if let Some(text) = line.strip_prefix("/new ") {
            runtime.start(user, text).await
        } else if runtime.has_pending(user).await? {
            runtime.resume(user, line).await
        } else {
            runtime.start(user, line).await
        };

        match result {
            Ok(Reply::Prompt(interrupt)) => println!("{}", interrupt.task.render()),
            Ok(Reply::Completed { message, .. }) => println!("{}", message),
            Err(e) if e.is_retryable() => {
                tracing::warn!(error = %e, "retryable failure");
                if runtime.has_pending(user).await? {
                    println!("Something went wrong understanding that ({}). Please try again.", e);
                } else {
                    println!(
                        "Something went wrong ({}). Anything saved above stays saved; send what is left as a new request.",
                        e
                    );
                }
            }
            Err(e) => println!("{}", e),
        }
    }
    Ok(())
}

async fn gc(config: &CoachConfig) -> anyhow::Result<()> {
    if config.checkpoints.backend != CheckpointBackend::File {
        println!("In-memory checkpoints do not outlive the process; nothing to collect.");
        return Ok(());
    }
    let store = FileCheckpointStore::open(config.checkpoints.dir.clone())
        .await?
        .with_ttl(config.checkpoints.ttl());
    let removed = store.gc().await?;
    println!("Removed {} expired checkpoint(s) from {}", removed, store.dir().display());
    Ok(())
}
