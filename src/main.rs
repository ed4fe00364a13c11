//! # TaskerBot CLI
//!
//! Talk to a TaskerBot (plan, act, validate) or a plain tool-calling ChatBot
//! from the terminal, backed by OpenAI, DeepSeek, Gemini or Bedrock.
//!
//! ## Quick Start
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! cargo run -- "Email ana@example.com that the invoice is ready"
//! cargo run -- --mode chat --stream        # interactive session
//! ```

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Configuration management
mod config;

/// Bot construction and history files
mod agent;

/// Tool registry assembly
mod tools;

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rig_taskerbot::mcp::{load_mcp_tools, load_servers, McpToolSet};

use crate::agent::{load_history_file, save_history_file, Assistant, Mode};
use crate::config::Config;

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "taskerbot",
    version,
    about = "Chat with a tool-using TaskerBot or ChatBot",
    long_about = r#"
TaskerBot - a conversational agent that can act.

In tasker mode every request goes through a planner, a tool executor and a
validator; rejected results are re-planned up to TASKER_MAX_ITERATIONS times.
In chat mode a single agent calls tools until it can answer.

Without a QUERY an interactive session starts. Type /clear to forget the
conversation, /history to print it, /file PATH to index a file (chat mode)
and /exit to quit.

PROVIDERS (LLM_PROVIDER):
  openai     OPENAI_API_KEY
  deepseek   DEEPSEEK_API_KEY
  gemini     GOOGLE_API_KEY or GEMINI_API_KEY
  bedrock    AWS_BEARER_TOKEN_BEDROCK and AWS_REGION

EXAMPLES:
  taskerbot "Save Ana Ruiz, ana@example.com, as a contact"
  taskerbot --provider gemini --mode chat
  taskerbot --history chat.json --stream
  taskerbot --mode chat -d refunds.md "How long do refunds take?"
  taskerbot --mcp-config mcp.json "List the files in /tmp"
"#
)]
struct Args {
    /// One-shot question; starts an interactive session when omitted
    #[arg(value_name = "QUERY")]
    query: Option<String>,

    /// Which bot answers
    #[arg(long, value_enum, default_value = "tasker")]
    mode: Mode,

    /// LLM provider (overrides LLM_PROVIDER)
    #[arg(short = 'p', long, env = "LLM_PROVIDER")]
    provider: Option<String>,

    /// Model name (overrides LLM_MODEL)
    #[arg(short = 'm', long, env = "LLM_MODEL")]
    model: Option<String>,

    /// JSON history file to resume from and save to
    #[arg(long, value_name = "FILE", env = "TASKERBOT_HISTORY_FILE")]
    history: Option<PathBuf>,

    /// File to index as context (chat mode, repeatable)
    #[arg(short = 'd', long = "document", value_name = "FILE")]
    documents: Vec<PathBuf>,

    /// JSON map of MCP servers whose tools the bot may use
    #[arg(long, value_name = "FILE", env = "MCP_CONFIG")]
    mcp_config: Option<PathBuf>,

    /// Print the answer as it is generated
    #[arg(short = 's', long)]
    stream: bool,

    /// Verbose output (debug logging and turn logs)
    #[arg(short = 'v', long)]
    verbose: bool,
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    let mut config = Config::from_env()?;

    if let Some(provider) = &args.provider {
        config.bot.provider = provider.parse()?;
    }
    if let Some(model) = &args.model {
        info!(model = %model, "Using model from command line");
        config.bot.model = Some(model.clone());
    }
    if let Some(path) = &args.history {
        config.history_file = Some(path.clone());
    }
    if let Some(path) = &args.mcp_config {
        config.mcp_config = Some(path.clone());
    }
    config.documents.extend(args.documents.iter().cloned());

    config.validate()?;

    info!(
        provider = %config.bot.provider,
        model = %config.bot.model_name(),
        mode = ?args.mode,
        "Configuration loaded"
    );

    let mcp = match &config.mcp_config {
        Some(path) => load_mcp_tools(&load_servers(path)?).await,
        None => McpToolSet::default(),
    };

    let result = run(&mcp, &args, &config).await;
    mcp.shutdown().await;

    // the returned error is printed once by the runtime
    if let Err(e) = &result {
        error!(error = %e, "TaskerBot failed");
    }
    result
}

async fn run(mcp: &McpToolSet, args: &Args, config: &Config) -> Result<()> {
    let mut assistant = Assistant::from_config(args.mode, config, mcp.tools.clone())?;

    for path in &config.documents {
        assistant.process_file(path).await?;
    }

    if let Some(path) = &config.history_file {
        assistant.load_history(&load_history_file(path)?);
    }

    match &args.query {
        Some(query) => run_turn(&mut assistant, query, args, config).await,
        None => repl(&mut assistant, args, config).await,
    }
}

// =============================================================================
// TURNS
// =============================================================================
async fn run_turn(assistant: &mut Assistant, query: &str, args: &Args, config: &Config) -> Result<()> {
    if args.stream {
        let mut stdout = std::io::stdout();
        assistant.ask_stream(query, &mut stdout).await?;
    } else {
        let response = assistant.ask(query).await?;
        println!("{}", response.content);

        if args.verbose {
            for record in &response.tool_calls_used {
                eprintln!("  tool {} [{:?}]: {}", record.tool_name, record.status, record.output);
            }
            for line in &response.logs {
                eprintln!("  {line}");
            }
            eprintln!("  tokens: {}", response.token_usage.total_tokens);
        }
    }

    if let Some(path) = &config.history_file {
        save_history_file(path, assistant.history())?;
    }
    Ok(())
}

async fn repl(assistant: &mut Assistant, args: &Args, config: &Config) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("TaskerBot ready. /exit to quit.");

    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim();

        match line {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                assistant.clear();
                eprintln!("History cleared.");
            }
            _ if line.starts_with("/file ") => {
                let path = PathBuf::from(line["/file ".len()..].trim());
                match assistant.process_file(&path).await {
                    Ok(chunks) => eprintln!("Indexed {} ({chunks} chunks).", path.display()),
                    Err(e) => eprintln!("Error: {e:#}"),
                }
            }
            "/history" => {
                for record in agent::to_records(assistant.history()) {
                    let who = if record.is_bot { "bot" } else { "you" };
                    println!("{who}: {}", record.content);
                }
            }
            query => {
                // a failed turn leaves history untouched, so keep going
                if let Err(e) = run_turn(assistant, query, args, config).await {
                    error!(error = %e, "Turn failed");
                    eprintln!("Error: {e}");
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Logs go to stderr so answers on stdout stay clean.
/// `RUST_LOG` wins over `--verbose` when set.
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
