//! askhuman server entry point
//!
//! Serves MCP over stdio. Logging goes to a file, never to stdout/stderr,
//! because stdio carries the protocol.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tokio::io::BufReader;
use tracing::info;

use askhuman::cli::{Cli, Command};
use askhuman::config::Config;
use askhuman::engine::AskHumanEngine;
use askhuman::mcp::McpServer;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("askhuman")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to a log file, not stdout/stderr - stdio carries MCP traffic
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("askhuman.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        artifact = %config.artifact.file.display(),
        timeout_secs = config.wait.timeout_secs,
        "askhuman starting"
    );

    match cli.command {
        Some(Command::Init) => cmd_init(&config),
        Some(Command::Serve) | None => cmd_serve(config).await,
    }
}

/// Create the ask file and print its location
fn cmd_init(config: &Config) -> Result<()> {
    let store = askhuman::artifact::ArtifactStore::new(&config.artifact.file);
    store.init_file()?;
    println!("Ask file ready: {}", config.artifact.file.display());
    Ok(())
}

/// Serve MCP over stdio until stdin closes or a signal arrives
async fn cmd_serve(config: Config) -> Result<()> {
    let engine = Arc::new(AskHumanEngine::new(config)?);

    // SIGINT/SIGTERM raise the engine's shutdown signal; the server loop
    // observes it, drains in-flight calls, and exits
    spawn_signal_handler(Arc::clone(&engine));

    let shutdown = engine.shutdown_signal();
    let server = McpServer::new(engine);

    server
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown)
        .await
}

fn spawn_signal_handler(engine: Arc<AskHumanEngine>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    engine.shutdown();
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("Received SIGINT");
        }

        engine.shutdown();
    });
}
