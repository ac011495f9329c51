//! Header override agent CLI entry point.
//!
//! Reads host events as JSON lines on stdin and writes one JSON reply per
//! event on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use cors_override_agent::{AgentConfig, FileStore, HeaderAgent, HostEvent, HostReply};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cors-override-agent")]
#[command(
    author,
    version,
    about = "Response header override agent with origin correlation"
)]
struct Args {
    /// Configuration file path (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Settings store file (overrides settings.store_path)
    #[arg(long, env = "HEADER_AGENT_STORE")]
    store: Option<PathBuf>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print example configuration and exit.
    #[arg(long)]
    example_config: bool,

    /// Validate configuration and settings, print the bindings and exit.
    #[arg(long)]
    validate: bool,
}

fn print_example_config() {
    let example = r#"# Header Override Agent Configuration Example
version: "1"

settings:
  # JSON file holding the stored site rules ("corsSites") and the
  # badge flag ("displayInterceptCount")
  store_path: "/var/lib/header-agent/settings.json"
  # Lifetime of a recorded request origin (ms)
  correlation_ttl_ms: 10000
  # Drop events whose URL is outside the registered filters. A filter is
  # the rule's URL pattern matched against the whole URL, so a pattern
  # without '*' ("http://www.foo.com") only admits that exact URL; use
  # "http://www.foo.com/*" to cover its pages
  apply_url_filter: true
  # Enable debug headers (X-Header-Rule)
  debug_headers: false
"#;
    println!("{}", example);
}

fn load_config(args: &Args) -> Result<AgentConfig> {
    let mut config = if let Some(config_path) = &args.config {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        if config_path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml")
        {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        }
    } else {
        AgentConfig::default()
    };

    if let Some(store) = &args.store {
        config.settings.store_path = store.to_string_lossy().to_string();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr, stdout carries replies
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    if args.example_config {
        print_example_config();
        return Ok(());
    }

    let config = load_config(&args)?;
    let store = Arc::new(FileStore::new(&config.settings.store_path));
    let agent = HeaderAgent::new(config, store).context("Failed to create agent")?;

    if args.validate {
        let bindings = serde_json::to_string_pretty(&agent.bindings())?;
        println!("{}", bindings);
        info!("Configuration is valid");
        return Ok(());
    }

    info!(
        config = ?args.config,
        store = %agent.settings().store_path,
        "Header override agent ready, reading host events from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<HostEvent>(&line) {
            Ok(event) => agent.handle_event(event),
            Err(e) => {
                warn!(error = %e, "Malformed host event");
                HostReply::Error {
                    message: e.to_string(),
                }
            }
        };

        let mut out = serde_json::to_vec(&reply)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    debug!(stats = ?agent.stats(), "Input closed");
    info!("Header override agent stopped");

    Ok(())
}
