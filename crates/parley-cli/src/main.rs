//! parley - chat-driven research assistant

mod config;
mod console;
mod tools;
mod utils;

use anyhow::Context as _;
use clap::Parser;
use parley_agent::{
    Agent, AgentEvent, ConversationStore, Dispatcher, JsonFilePersistence, ProviderTransport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::console::ConsoleChannel;

/// parley - chat-driven research assistant
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (default: $PARLEY_CONFIG_PATH or the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Model to use (default: claude-haiku-4-5-20251001)
    #[arg(short, long)]
    model: Option<String>,

    /// Conversation state file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Identity the console speaks as
    #[arg(short, long, default_value = "console")]
    identity: String,

    /// Handle a single message and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("parley=debug,parley_agent=debug,parley_ai=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config_path = args.config.clone().unwrap_or_else(Config::config_path);

    if args.init_config {
        let path = Config::init(&config_path)
            .with_context(|| format!("creating config at {}", config_path.display()))?;
        println!("Config file created at: {}", path.display());
        println!("\nExample config:\n{}", config::example_config());
        return Ok(());
    }

    let cfg = Config::load_from(&config_path);

    let api_key = cfg.anthropic_api_key().with_context(|| {
        format!(
            "no Anthropic API key found; set ANTHROPIC_API_KEY or add [api_keys] anthropic to {}",
            config_path.display()
        )
    })?;
    let transport = Arc::new(ProviderTransport::with_api_key(api_key));

    let state_file = args.state_file.clone().unwrap_or_else(|| cfg.state_file());
    let persistence = Arc::new(JsonFilePersistence::new(&state_file));
    let store = Arc::new(ConversationStore::load(cfg.store_config(), persistence));

    let agent_config = cfg.agent_config(args.model.as_deref());
    tracing::info!(
        model = %agent_config.model.id,
        state_file = %state_file.display(),
        workspace = %cfg.workspace_dir().display(),
        "starting parley"
    );
    let agent = Arc::new(Agent::new(agent_config, tools::build_registry(&cfg), transport));

    let outbox = state_file
        .parent()
        .map(|p| p.join("outbox"))
        .unwrap_or_else(|| config::data_dir().join("outbox"));
    let channel = Arc::new(ConsoleChannel::new(outbox));

    let dispatcher = Dispatcher::new(store, agent, channel, cfg.dispatch_config());
    let progress = spawn_progress_printer(&dispatcher);

    let result = match args.command {
        Some(command) => {
            dispatcher.handle(&args.identity, &command).await;
            Ok(())
        }
        None => run_interactive(&dispatcher, &args.identity).await,
    };

    progress.abort();
    result
}

/// Show tool and compaction activity on stderr while a turn runs
fn spawn_progress_printer(dispatcher: &Dispatcher) -> tokio::task::JoinHandle<()> {
    let mut receiver = dispatcher.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            match event {
                AgentEvent::ToolExecutionStart { tool_name, .. } => {
                    eprintln!("[Running {}...]", tool_name);
                }
                AgentEvent::ToolExecutionEnd {
                    tool_name,
                    result,
                    is_error: true,
                    ..
                } => {
                    eprintln!("[{} failed: {}]", tool_name, utils::truncate_with(&result, 200, "..."));
                }
                AgentEvent::CompactionStart { reason, .. } => {
                    eprintln!("[Compacting context ({})]", utils::compaction_reason_str(reason));
                }
                AgentEvent::CompactionEnd {
                    chars_before,
                    chars_after,
                    ..
                } => {
                    eprintln!("[Compacted: {} -> {} chars]", chars_before, chars_after);
                }
                AgentEvent::AgentEnd { total_usage, .. } => {
                    eprintln!("[Tokens: {} in, {} out]", total_usage.input, total_usage.output);
                }
                _ => {}
            }
        }
    })
}

async fn run_interactive(dispatcher: &Dispatcher, identity: &str) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("parley as {} (Ctrl-D to quit, /reset, /compact)", identity);
        eprintln!();
    }

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        if line.trim().is_empty() {
            continue;
        }
        dispatcher.handle(identity, &line).await;
    }

    Ok(())
}
