//! drova-desktop daemon
//!
//! Brokers a rented desktop machine: relays the renter's streaming
//! connection, provisions the machine for desktop sessions and reverts it
//! afterwards.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drova_core::config::{self, DrovaConfig};
use drova_orchestrator::validate::validate_credentials;
use drova_orchestrator::{HttpSessionDirectory, PollDriver, SessionWorkflow, SocketDriver};
use drova_remote::RemoteMachine;

#[derive(Parser)]
#[command(name = "drova-desktop")]
#[command(about = "Session broker for a rented drova desktop machine")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Remote machine host (overrides config)
    #[arg(long, env = "WINDOWS_HOST", global = true)]
    windows_host: Option<String>,

    /// Remote machine login (overrides config)
    #[arg(long, env = "WINDOWS_LOGIN", global = true)]
    windows_login: Option<String>,

    /// Remote machine password (overrides config)
    #[arg(long, env = "WINDOWS_PASSWORD", hide_env_values = true, global = true)]
    windows_password: Option<String>,

    /// Shadow Defender password (overrides config)
    #[arg(long, env = "SHADOW_DEFENDER_PASSWORD", hide_env_values = true, global = true)]
    shadow_defender_password: Option<String>,

    /// Drive letters to freeze, e.g. "CD" (overrides config)
    #[arg(long, env = "SHADOW_DEFENDER_DRIVES", global = true)]
    shadow_defender_drives: Option<String>,

    /// Run in foreground with verbose output
    #[arg(short, long, global = true)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Relay inbound streaming connections and provision on handshake
    Socket {
        /// Listen address or bare port (overrides config)
        #[arg(short, long, env = "DROVA_SOCKET_LISTEN")]
        listen: Option<String>,
    },

    /// Provision for every desktop session without relaying
    Poll,

    /// Check SSH, Shadow Defender and SFTP access, then exit
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&args)?;
    config.validate().context("Incomplete configuration")?;

    let machine = Arc::new(RemoteMachine::new(config.remote.clone()));

    if let Command::Validate = args.command {
        let result = validate_credentials(machine.as_ref(), &config.shadow_defender).await;
        machine.disconnect().await;
        result.context("Validation failed")?;
        tracing::info!("Remote machine {} is ready", config.remote.host);
        return Ok(());
    }

    let directory = Arc::new(
        HttpSessionDirectory::new(&config.directory)
            .context("Failed to create session directory client")?,
    );
    let workflow = SessionWorkflow::new(machine.clone(), directory, &config);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    tracing::info!("drova-desktop starting for {}", config.remote.host);
    match args.command {
        Command::Socket { listen } => {
            let listen_address = listen
                .map(|value| listen_address(&value))
                .unwrap_or_else(|| config.socket.listen_address.clone());
            SocketDriver::new(workflow, config.backend_address(), cancel)
                .run(&listen_address)
                .await?;
        }
        Command::Poll => PollDriver::new(workflow, cancel).run().await?,
        Command::Validate => {}
    }

    machine.disconnect().await;
    tracing::info!("drova-desktop shutdown complete");
    Ok(())
}

/// Load the config file and apply command-line / environment overrides
fn load_config(args: &Args) -> Result<DrovaConfig> {
    let mut config = if let Some(config_path) = &args.config {
        config::load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        let default_path = config::default_config_path();
        if default_path.exists() {
            config::load_config(&default_path)
                .with_context(|| format!("Failed to load config from {:?}", default_path))?
        } else {
            tracing::info!("No config file, using defaults and environment");
            DrovaConfig::default()
        }
    };

    if let Some(host) = &args.windows_host {
        config.remote.host = host.clone();
    }
    if let Some(login) = &args.windows_login {
        config.remote.username = login.clone();
    }
    if let Some(password) = &args.windows_password {
        config.remote.password = Some(password.clone());
    }
    if let Some(password) = &args.shadow_defender_password {
        config.shadow_defender.password = password.clone();
    }
    if let Some(drives) = &args.shadow_defender_drives {
        config.shadow_defender.drives = drives.clone();
    }

    Ok(config)
}

/// A bare port listens on all interfaces
fn listen_address(value: &str) -> String {
    match value.parse::<u16>() {
        Ok(port) => format!("0.0.0.0:{}", port),
        Err(_) => value.to_string(),
    }
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel.cancel();
    });
}
