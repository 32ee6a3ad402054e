//! Background Expiry Sweeper
//!
//! Lazy expiry only reclaims a key when somebody touches it; a key that
//! expires and is never accessed again would otherwise sit in memory
//! forever. The sweeper closes that gap: a background task wakes on a
//! fixed, configurable interval and evicts every expired key it finds.
//!
//! Evictions run in bounded batches (see [`Keyspace::sweep_expired`]) so
//! the keyspace write lock is never held for a full scan of a large
//! keyspace, and each sweep's removals are added to the change counter so
//! the snapshot scheduler sees them.

use crate::storage::Keyspace;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Maximum number of evictions per write-lock acquisition.
const SWEEP_BATCH: usize = 128;

/// Handle to the running sweeper task.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper with the given tick interval.
    pub fn start(keyspace: Arc<Keyspace>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(sweeper_loop(keyspace, interval, shutdown_rx));
        info!(interval_ms = interval.as_millis() as u64, "Expiry sweeper started");
        Self { shutdown_tx }
    }

    /// Stops the sweeper task. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    keyspace: Arc<Keyspace>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper shutting down");
                    return;
                }
            }
        }

        let evicted = keyspace.sweep_expired(SWEEP_BATCH);
        if evicted > 0 {
            debug!(
                evicted = evicted,
                keys_remaining = keyspace.len(),
                "Swept expired keys"
            );
        }
    }
}

/// Starts the sweeper with the default one-second interval.
pub fn start_expiry_sweeper(keyspace: Arc<Keyspace>) -> ExpirySweeper {
    ExpirySweeper::start(keyspace, Duration::from_secs(1))
}
