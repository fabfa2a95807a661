//! costchat - Terminal client for the cost-reporting chat server
//!
//! Reads questions and `/commands` from stdin, prints answers as they stream.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (http://localhost:8000/api)
//! costchat
//!
//! # Another server, a specific account
//! costchat --server-url https://costs.example.com/api --account acc-7
//!
//! # Verbose logging (to stderr)
//! RUST_LOG=debug costchat
//! ```
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl+C): cancel the running request, or quit when idle

mod command;
mod render;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use costchat_core::{
    load_config_from_path, Conductor, ConfigOverrides, HttpBackend, SessionEvent, SessionMessage,
};

use command::Input;

/// costchat - Ask questions about your cloud costs
#[derive(Parser, Debug)]
#[command(name = "costchat")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Chat server base URL
    #[arg(short = 's', long, env = "COSTCHAT_SERVER_URL", value_name = "URL")]
    server_url: Option<String>,

    /// Model for new questions
    #[arg(short = 'm', long, env = "COSTCHAT_MODEL")]
    model: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "COSTCHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Per-question timeout in seconds
    #[arg(short = 't', long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Use the non-streaming chat endpoint
    #[arg(long)]
    no_stream: bool,

    /// Account to activate after startup
    #[arg(short = 'a', long, value_name = "ID")]
    account: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "COSTCHAT_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(url) = &self.server_url {
            overrides = overrides.with_base_url(url.clone());
        }
        if let Some(model) = &self.model {
            overrides = overrides.with_default_model(model.clone());
        }
        if let Some(secs) = self.timeout_secs {
            overrides = overrides.with_request_timeout_secs(secs);
        }
        if self.no_stream {
            overrides = overrides.with_streaming(false);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("costchat={level},costchat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);
    debug!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config_from_path(args.config.clone())
        .await
        .context("Failed to load configuration")?;
    args.overrides()
        .apply(&mut config)
        .context("Invalid command-line option")?;
    info!(
        server = %config.backend.base_url,
        source = %config.source(),
        "Configuration loaded"
    );

    let backend = HttpBackend::new(&config.backend).context("Failed to create HTTP client")?;

    let (msg_tx, msg_rx) = mpsc::channel::<SessionMessage>(config.channel_capacity);
    let (local_tx, local_rx) = mpsc::channel::<String>(16);
    let printer = tokio::spawn(render::run(msg_rx, local_rx));

    let mut conductor = Conductor::new(backend, config, msg_tx);
    conductor.start().await;
    if let Some(account_id) = args.account {
        conductor
            .handle_event(SessionEvent::SwitchAccount { account_id })
            .await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !conductor.is_quitting() {
        let pending = conductor.has_pending_work();
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => handle_line(&mut conductor, &local_tx, &line).await,
                    None => conductor.handle_event(SessionEvent::Quit).await,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let event = if conductor.is_busy() {
                    SessionEvent::Cancel
                } else {
                    SessionEvent::Quit
                };
                conductor.handle_event(event).await;
            }
            _ = conductor.next_update(), if pending => {}
        }
    }

    // Let an in-flight save land before exiting
    conductor.run_until_idle().await;
    drop(conductor);
    drop(local_tx);
    printer.await.context("Printer task failed")?;
    Ok(())
}

async fn handle_line(
    conductor: &mut Conductor<HttpBackend>,
    local: &mpsc::Sender<String>,
    line: &str,
) {
    let output = match command::parse_line(line) {
        Ok(Input::Event(event)) => {
            conductor.handle_event(event).await;
            return;
        }
        Ok(Input::Help) => format!("{}\n", command::HELP),
        Ok(Input::Empty) => return,
        Err(e) => format!("{e}\n"),
    };
    if local.send(output).await.is_err() {
        debug!("Printer closed, dropping local output");
    }
}
