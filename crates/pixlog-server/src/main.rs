//! pixlog viewer server entry point.
//!
//! Binds the listening socket (probing upward from the base port), reports
//! the bound port on stdout for a launching parent, and runs the dispatcher
//! loop until a stop condition arrives over the protocol.
//!
//! ```text
//! pixlog-server [OPTIONS]
//!
//! Options:
//!   --port      <PORT>   First port to try binding [default: 42007]
//!   --interface <ADDR>   Address to bind [default: 127.0.0.1]
//!   --require-server     Exit non-zero when no port can be bound instead of
//!                        falling back to a viewer-only mode
//!   --config    <PATH>   Optional TOML config file (CLI flags win)
//! ```
//!
//! stdout is reserved for the single `PIXLOG_PORT=<port>` back-channel line;
//! all log output goes to stderr. Exit code is 0 after a normal shutdown
//! (`Close`/`StopProcess` driven) and non-zero when `--require-server` is set
//! and the port probe window is exhausted.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pixlog_core::LogMessage;
use pixlog_server::config::ServerConfig;
use pixlog_server::dispatcher::{Dispatcher, DispatcherConfig};
use pixlog_server::listener;
use pixlog_server::viewer::HeadlessViewerFactory;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// pixlog viewer server.
///
/// Receives framed image streams from producer processes and hosts one
/// viewer per group.
#[derive(Debug, Parser)]
#[command(
    name = "pixlog-server",
    about = "Viewer-hosting server for pixlog image streams",
    version
)]
struct Cli {
    /// First port to try binding; probing continues upward from here.
    #[arg(long, env = "PIXLOG_PORT")]
    port: Option<u16>,

    /// Address to bind the listening socket to.
    #[arg(long, env = "PIXLOG_INTERFACE")]
    interface: Option<String>,

    /// Fail fast when no port can be bound, instead of continuing in a
    /// viewer-only mode without a listening socket.
    #[arg(long)]
    require_server: bool,

    /// Optional TOML config file. CLI flags override its values.
    #[arg(long, env = "PIXLOG_CONFIG")]
    config: Option<PathBuf>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ServerConfig::default(),
    };

    // Log to stderr: stdout carries only the one-line port back-channel.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with_writer(std::io::stderr)
        .init();

    let base_port = cli.port.unwrap_or(config.port);
    let interface = cli
        .interface
        .clone()
        .unwrap_or_else(|| config.interface.clone());

    info!("pixlog server starting on {interface}, base port {base_port}");

    let (tx, mut rx) = mpsc::channel::<LogMessage>(64);

    match listener::bind_with_probe(&interface, base_port).await {
        Ok(socket) => {
            let bound_port = socket
                .local_addr()
                .context("reading bound listener address")?
                .port();
            // The one-shot back-channel to a launching parent.
            println!("PIXLOG_PORT={bound_port}");
            std::io::stdout().flush().context("flushing port report")?;
            tokio::spawn(listener::run_listener(socket, tx.clone()));
        }
        Err(e) if cli.require_server => {
            return Err(e).context("cannot start server");
        }
        Err(e) => {
            warn!("{e}; continuing in viewer-only mode");
        }
    }

    // Ctrl-C folds into the same message-driven shutdown path as a
    // StopProcess frame.
    let ctrl_c_tx = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = ctrl_c_tx.send(LogMessage::StopProcess).await;
        }
    });
    drop(tx);

    // A GUI build swaps in its windowed ViewerFactory and FigureSink here.
    let mut dispatcher = Dispatcher::new(
        Box::new(HeadlessViewerFactory),
        None,
        DispatcherConfig {
            tick_rate_hz: config.tick_rate_hz,
        },
    );
    dispatcher.run(&mut rx).await;

    info!("pixlog server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
