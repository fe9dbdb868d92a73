mod config;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use parley_gateway::RelayState;
use parley_gateway::operator::{self, HELP};
use parley_proto::{FileStore, spawn_stdin_lines};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parley_server=info,parley_gateway=info,parley_proto=info".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    let store = FileStore::new(&config.download_dir).await?;
    let shutdown = CancellationToken::new();
    let state = RelayState::new(config.relay.clone(), store, shutdown.clone());

    let listener = TcpListener::bind(config.bind_addr()).await?;
    info!(
        mode = %config.relay.mode,
        "Server listening on {}",
        listener.local_addr()?
    );

    let relay = tokio::spawn(state.clone().run(listener));

    println!("{}", HELP);
    tokio::spawn(operator::run_console(state.clone(), spawn_stdin_lines()));

    tokio::select! {
        _ = shutdown_signal() => shutdown.cancel(),
        _ = shutdown.cancelled() => {}
    }

    if let Err(e) = relay.await {
        warn!("Relay task ended abnormally: {}", e);
    }
    info!("Server shutdown.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate());
        match sigterm {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                warn!("Cannot install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
