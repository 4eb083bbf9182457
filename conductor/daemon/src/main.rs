//! Narrator Daemon - Terminal Host for the Narrator Engine
//!
//! Runs the narrator against a content directory, reads events as JSON lines
//! on stdin and types the narrator's lines on stdout.
//!
//! # Usage
//!
//! ```bash
//! # Start with the content directory from the config file
//! narrator-daemon
//!
//! # Explicit content and a fixed seed
//! narrator-daemon --content-dir ./content --seed 42
//!
//! # Feed events
//! echo '{"type": "button_hesitation", "button": "reset"}' | narrator-daemon -C ./content
//!
//! # Machine-readable output
//! narrator-daemon --json
//!
//! # Verbose logging (stderr)
//! RUST_LOG=narrator_core=debug narrator-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl+C): Graceful shutdown, prints session metrics to the log

mod render;

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use narrator_core::content::{load_dir, ContentLibrary};
use narrator_core::{
    default_config_path, load_config_from_path, ConfigOverrides, Narrator, NarratorEvent,
    NarratorRuntime, RuntimeConfig,
};

use render::{OutputMode, Renderer};

/// Narrator Daemon - companion narrator in your terminal
#[derive(Parser, Debug)]
#[command(name = "narrator-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "NARRATOR_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory of content JSON files
    #[arg(short = 'C', long, value_name = "DIR")]
    content_dir: Option<PathBuf>,

    /// Seed for reproducible sessions
    #[arg(long, value_name = "N")]
    seed: Option<u64>,

    /// Disable admission control for reactive events
    #[arg(long)]
    no_rate_limit: bool,

    /// Skip the welcome line
    #[arg(long)]
    no_welcome: bool,

    /// Emit messages as JSON lines instead of typing them
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "NARRATOR_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    /// CLI values that override the loaded configuration
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref dir) = self.content_dir {
            overrides = overrides.with_content_dir(dir.clone());
        }
        if let Some(seed) = self.seed {
            overrides = overrides.with_seed(seed);
        }
        if self.no_rate_limit {
            overrides = overrides.with_rate_limit_enabled(false);
        }
        if self.no_welcome {
            overrides = overrides.with_welcome_enabled(false);
        }
        overrides
    }

    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Typewriter
        }
    }
}

/// Initialize logging to stderr
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "narrator_daemon={level},narrator_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}

/// Load the content library, or an empty one when no directory is set
fn load_library(dir: Option<&Path>) -> Result<ContentLibrary> {
    match dir {
        Some(dir) => load_dir(dir)
            .with_context(|| format!("Failed to load content from {}", dir.display())),
        None => {
            warn!("No content directory configured, the narrator will stay quiet");
            Ok(ContentLibrary::new())
        }
    }
}

/// Parse one stdin line; blank lines yield `None`
fn parse_event_line(line: &str) -> Option<Result<NarratorEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Forward JSON-line events from stdin until EOF
async fn forward_stdin(events: mpsc::Sender<NarratorEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_event_line(&line) {
                Some(Ok(event)) => {
                    if events.send(event).await.is_err() {
                        warn!("Narrator stopped, no longer reading input");
                        break;
                    }
                }
                Some(Err(e)) => warn!(error = %e, line = %line, "Ignoring malformed event"),
                None => {}
            },
            Ok(None) => {
                info!("Input closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read input");
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging first
    init_logging(&args.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "Narrator daemon starting");

    let config_path = args.config.clone().or_else(default_config_path);
    let mut config =
        load_config_from_path(config_path).context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    info!(
        source = %config.source(),
        config_file = ?config.config_file_path,
        content_dir = ?config.content.dir,
        "Configuration loaded"
    );

    let library = load_library(config.content.dir.as_deref())?;
    let narrator = Narrator::new(&config, library, tokio::time::Instant::now().into_std());
    let (events, mut messages, task) = NarratorRuntime::spawn(narrator, RuntimeConfig::default());

    events
        .send(NarratorEvent::PageLoaded)
        .await
        .context("Narrator stopped before it started")?;
    let input = tokio::spawn(forward_stdin(events.clone()));

    let mut renderer = Renderer::new(io::stdout(), args.output_mode());
    loop {
        tokio::select! {
            message = messages.recv() => match message {
                Some(message) => renderer.render(&message)?,
                None => break,
            },
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    // Dropping every sender stops the runtime
    input.abort();
    drop(events);
    while let Some(message) = messages.recv().await {
        renderer.render(&message)?;
    }
    renderer.finish()?;

    let narrator = task
        .await
        .context("Narrator task panicked")?
        .context("Narrator stopped with an error")?;
    info!(metrics = ?narrator.metrics().snapshot(), "Narrator daemon stopped");
    Ok(())
}
