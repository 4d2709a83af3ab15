mod prompt;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use jarvis_core::config::LoggingConfig;
use jarvis_core::{AppContext, ChatMessage, Config, resolve_config_path};
use jarvis_gate::{Category, ConfirmationHandler};
use jarvis_resilience::{Reply, ReplySource};
use jarvis_tools::ActionRequest;

use crate::prompt::CliConfirmation;

#[derive(Parser, Debug)]
#[command(
    name = "jarvis",
    version,
    about = "Safety-gated actions and degraded-mode handling for the Jarvis assistant"
)]
struct Cli {
    /// Config file (defaults to `JARVIS_CONFIG`, then `config/default.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Never prompt; anything not whitelisted is refused.
    #[arg(long, global = true)]
    headless: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe every configured service and report degraded mode.
    Check,

    /// Run an action given as JSON, e.g. `{"kind":"fetch_web_page","url":"https://example.com"}`.
    Exec { request: String },

    /// Run an LLM tool call by name with JSON arguments.
    Tool { name: String, arguments: String },

    /// Ask the LLM, falling back to cached or canned replies when it is unavailable.
    Ask {
        prompt: String,

        /// Record the exchange in this session.
        #[arg(long, conflicts_with = "resume")]
        session: Option<String>,

        /// Continue the most recently saved session.
        #[arg(long)]
        resume: bool,
    },

    /// Inspect or edit remembered approvals.
    #[command(subcommand)]
    Whitelist(WhitelistCommand),

    /// Inspect stored conversations.
    #[command(subcommand)]
    Sessions(SessionsCommand),
}

#[derive(Subcommand, Debug)]
enum WhitelistCommand {
    List { category: Option<String> },
    Add { category: String, key: String },
    Remove { category: String, key: String },
}

#[derive(Subcommand, Debug)]
enum SessionsCommand {
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    Show { id: String },
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = load_config(&config_path, startup_filter(), std::io::stderr)?;
    init_subscriber(&config.logging);
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    let headless = cli.headless || !std::io::stdin().is_terminal();
    let handler: Option<Arc<dyn ConfirmationHandler>> = if headless {
        None
    } else {
        Some(Arc::new(CliConfirmation))
    };
    let ctx = AppContext::build(config, handler).await?;

    match cli.command {
        Command::Check => run_check(&ctx).await.map(|()| ExitCode::SUCCESS),
        Command::Exec { request } => {
            let request: ActionRequest =
                serde_json::from_str(&request).context("invalid action request JSON")?;
            let result = ctx.executor().execute(&request).await;
            println!("{result}");
            Ok(exit_code(result.is_success()))
        }
        Command::Tool { name, arguments } => {
            let arguments: serde_json::Value =
                serde_json::from_str(&arguments).context("tool arguments must be JSON")?;
            let result = ctx.executor().execute_tool_call(&name, &arguments).await;
            println!("{result}");
            Ok(exit_code(result.is_success()))
        }
        Command::Ask {
            prompt,
            session,
            resume,
        } => run_ask(&ctx, &prompt, session, resume)
            .await
            .map(|()| ExitCode::SUCCESS),
        Command::Whitelist(command) => run_whitelist(&ctx, command).map(|()| ExitCode::SUCCESS),
        Command::Sessions(command) => run_sessions(&ctx, command)
            .await
            .map(|()| ExitCode::SUCCESS),
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run_check(ctx: &AppContext) -> anyhow::Result<()> {
    let report = ctx.startup_sweep().await;
    if report.results.is_empty() {
        println!("health checks disabled");
    } else {
        println!("{report}");
    }
    println!("{}", ctx.state().snapshot());
    Ok(())
}

async fn run_ask(
    ctx: &AppContext,
    prompt: &str,
    session: Option<String>,
    resume: bool,
) -> anyhow::Result<()> {
    let session = if resume {
        let last = ctx.sessions().last_session_id().await?;
        if last.is_none() {
            bail!("no saved session to resume");
        }
        last
    } else {
        session
    };

    let reply = match session {
        Some(id) => ctx.ask_in_session(&id, prompt).await?,
        None => ctx.ask(&[ChatMessage::new("user", prompt)]).await,
    };
    print_reply(&reply);
    Ok(())
}

fn print_reply(reply: &Reply) {
    println!("{}", reply.text);
    if reply.source == ReplySource::Cache {
        println!("(cached reply, LLM unavailable)");
    }
    if reply.has_tool_calls {
        tracing::info!("reply requested tool calls, use `jarvis tool` to run them");
    }
}

fn run_whitelist(ctx: &AppContext, command: WhitelistCommand) -> anyhow::Result<()> {
    let store = ctx.whitelist();
    match command {
        WhitelistCommand::List { category } => {
            let categories = match category {
                Some(name) => vec![Category::from(name)],
                None => store.categories(),
            };
            if categories.is_empty() {
                println!("whitelist is empty");
            }
            for category in categories {
                println!("{category}:");
                for key in store.all(&category) {
                    println!("  {key}");
                }
            }
        }
        WhitelistCommand::Add { category, key } => {
            store
                .add(&Category::from(category), &key)
                .context("failed to update whitelist")?;
            println!("added {key}");
        }
        WhitelistCommand::Remove { category, key } => {
            let removed = store
                .remove(&Category::from(category), &key)
                .context("failed to update whitelist")?;
            if removed {
                println!("removed {key}");
            } else {
                println!("{key} was not whitelisted");
            }
        }
    }
    Ok(())
}

async fn run_sessions(ctx: &AppContext, command: SessionsCommand) -> anyhow::Result<()> {
    let sessions = ctx.sessions();
    let default_limit = ctx.config().memory.list_limit;
    match command {
        SessionsCommand::List { limit } => {
            let summaries = sessions
                .list_sessions(limit.unwrap_or(default_limit))
                .await?;
            if summaries.is_empty() {
                println!("no sessions");
            }
            for summary in summaries {
                println!("{summary}");
            }
        }
        SessionsCommand::Search { query, limit } => {
            let summaries = sessions
                .search_sessions(&query, limit.unwrap_or(default_limit))
                .await?;
            if summaries.is_empty() {
                println!("no sessions mention {query:?}");
            }
            for summary in summaries {
                println!("{summary}");
            }
        }
        SessionsCommand::Show { id } => {
            let Some(session) = sessions.load_session(&id).await? else {
                bail!("session {id} not found");
            };
            println!("{}", session.summary());
            for message in &session.messages {
                println!("[{}] {}", message.role, message.content);
            }
        }
        SessionsCommand::Delete { id } => {
            if sessions.delete_session(&id).await? {
                println!("deleted {id}");
            } else {
                bail!("session {id} not found");
            }
        }
    }
    Ok(())
}

/// `RUST_LOG` if set, `info` otherwise. The configured level is not known yet.
fn startup_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Load the config under a provisional subscriber so events raised while
/// loading (missing file, bad env overrides) are not dropped.
fn load_config<W>(
    path: &Path,
    filter: tracing_subscriber::EnvFilter,
    writer: W,
) -> anyhow::Result<Config>
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(subscriber, || Config::load(path))
}

fn init_subscriber(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_layer = config.file.as_ref().and_then(|path| {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                eprintln!("cannot open log file {}: {e}", path.display());
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .init();
}
