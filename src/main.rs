//! Hostbridge
//!
//! Remote host access over HTTP and WebSocket: browse and edit files, open
//! interactive shells in PTYs and supervise long-running console programs.
//! Meant to be reached over loopback or a private overlay network.

mod config;
mod files;
mod process;
mod pty;
mod server;
mod shell;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::{Settings, SettingsLayer};
use server::{AppState, HttpServer};

/// Hostbridge server
///
/// File explorer, terminal and process supervisor for a remote host
#[derive(Parser, Debug)]
#[command(name = "hostbridge")]
#[command(version, about, long_about = None)]
struct Args {
    /// Bind address [default: 0.0.0.0]
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// Port to listen on [default: 5000]
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Token callers must present (Bearer header or `token` query parameter)
    #[arg(long, env = "SERVER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shell launched for terminal sessions
    #[arg(long)]
    shell: Option<String>,

    /// Default working directory for terminal sessions
    #[arg(long)]
    shell_cwd: Option<PathBuf>,

    /// Confine filesystem access to this directory
    #[arg(long)]
    root: Option<PathBuf>,

    /// Where managed process definitions are stored [default: processes.json]
    #[arg(long)]
    processes_file: Option<PathBuf>,

    /// Accept connections from public addresses
    #[arg(long)]
    allow_public_peers: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Settings given on the command line or through the environment
    fn layer(&self) -> SettingsLayer {
        SettingsLayer {
            host: self.host.clone(),
            port: self.port,
            token: self.token.clone(),
            shell: self.shell.clone(),
            shell_args: None,
            shell_cwd: self.shell_cwd.clone(),
            root: self.root.clone(),
            processes_file: self.processes_file.clone(),
            allow_public_peers: self.allow_public_peers.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the level
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Hostbridge v{}", env!("CARGO_PKG_VERSION"));

    let file_layer = match &args.config {
        Some(path) => SettingsLayer::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SettingsLayer::default(),
    };
    let settings = Settings::resolve(file_layer.merge(args.layer()))?;

    info!(
        host = %settings.host,
        port = settings.port,
        token_enabled = settings.token.is_some(),
        "Starting server"
    );
    if settings.binds_all_interfaces() && settings.token.is_none() {
        warn!("Listening on all interfaces without a token; restrict access to a private network");
    }

    let server = Arc::new(HttpServer::new(AppState::new(settings).await));
    server.state().processes.autostart().await;

    let server_handle = Arc::clone(&server);

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Initiating graceful shutdown...");
        server_handle.shutdown();
    });

    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
