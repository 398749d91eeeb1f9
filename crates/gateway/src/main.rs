use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tg_executor::ServiceRegistry;
use tg_gateway::cli::{Cli, Command, ConfigCommand};
use tg_gateway::Gateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to run when no subcommand is given.
        None | Some(Command::Run) => {
            init_tracing();
            let config = tg_gateway::cli::load_config(&cli.config)?;
            run(config).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = tg_gateway::cli::load_config(&cli.config)?;
            if !tg_gateway::cli::validate(&config, &cli.config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = tg_gateway::cli::load_config(&cli.config)?;
            tg_gateway::cli::show(&config);
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tg_gateway=debug")),
        )
        .init();
}

async fn run(config: tg_domain::config::Config) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "toolgate starting");

    for issue in config.validate() {
        tracing::warn!("config: {issue}");
    }

    let manager = Arc::new(ServiceRegistry::new());
    let gateway = Gateway::new(config, manager)?;
    gateway.connect_all().await;

    shutdown_signal().await;

    gateway.shutdown().await;
    let status = gateway.status();
    tracing::info!(
        endpoints = status.endpoints.len(),
        "toolgate stopped"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}
