//! FlareKV server entry point.
//!
//! Startup order matters: configuration, then snapshot restore (a corrupt
//! file aborts startup rather than silently serving partial data), then
//! the background workers, then the accept loop. Shutdown reverses it:
//! stop accepting, stop the workers, write the final snapshot.

use anyhow::Context;
use flarekv::commands::CommandHandler;
use flarekv::config::Config;
use flarekv::connection::{handle_connection, ConnectionStats};
use flarekv::snapshot::Snapshotter;
use flarekv::storage::{ExpirySweeper, Keyspace};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let config = Config::from_env();
    info!(
        address = %config.bind_address(),
        max_connections = config.max_connections,
        snapshots = config.snapshot.enabled,
        "Starting FlareKV v{}",
        flarekv::VERSION
    );

    let keyspace = Arc::new(Keyspace::new());

    // Snapshot restore happens before anything can mutate the keyspace.
    let snapshotter = if config.snapshot.enabled {
        let snapshotter = Arc::new(Snapshotter::new(
            config.snapshot.file_path.clone(),
            Arc::clone(&keyspace),
        ));
        snapshotter
            .load()
            .await
            .context("failed to restore snapshot; refusing to start with partial data")?;
        Some(snapshotter)
    } else {
        info!("Snapshots disabled");
        None
    };

    let sweeper = ExpirySweeper::start(Arc::clone(&keyspace), config.expiry_check_interval);
    let ticker = snapshotter
        .as_ref()
        .map(|s| s.start_ticker(config.snapshot.save_interval));

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Listening for connections");

    let stats = Arc::new(ConnectionStats::new());
    let permits = Arc::new(Semaphore::new(config.max_connections));

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&keyspace), snapshotter.clone(), stats, permits) => {}
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        }
    }

    // Stop background work before the final save so nothing races it.
    drop(sweeper);
    drop(ticker);
    if let Some(snapshotter) = snapshotter {
        snapshotter.shutdown(config.snapshot.save_on_exit).await;
    }

    info!("Server stopped");
    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    keyspace: Arc<Keyspace>,
    snapshotter: Option<Arc<Snapshotter>>,
    stats: Arc<ConnectionStats>,
    permits: Arc<Semaphore>,
) {
    loop {
        // The permit enforces the connection cap: accepts pause once every
        // permit is held by a live connection.
        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        match listener.accept().await {
            Ok((stream, addr)) => {
                let commands = CommandHandler::new(Arc::clone(&keyspace), snapshotter.clone());
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    handle_connection(stream, addr, commands, stats).await;
                    drop(permit);
                });
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                drop(permit);
            }
        }
    }
}
