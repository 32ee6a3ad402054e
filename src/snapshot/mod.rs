//! Snapshot Persistence Engine
//!
//! Writes point-in-time copies of the keyspace to disk and restores them at
//! startup, so a crash loses at most the changes since the last save.
//!
//! ## Save protocol
//!
//! ```text
//! 1. Single-flight guard: refuse if a save is already running
//! 2. Capture: deep-copy live records under the keyspace read lock
//! 3. Encode (bincode) and write to <path>.tmp, fsync
//! 4. Atomic rename <path>.tmp -> <path>
//! 5. Update stats, reset the keyspace change counter
//! ```
//!
//! The keyspace lock is only held during step 2; disk IO happens on the
//! blocking thread pool with no keyspace lock held. A failure at any step
//! deletes the temp file and leaves the previous snapshot file intact.
//!
//! Foreground (`SAVE`) and background (`BGSAVE`) saves share the same
//! guard: at most one save of either kind runs at a time. A periodic
//! ticker issues background saves until shutdown, and shutdown runs one
//! final foreground save when configured to.

use crate::storage::{Keyspace, KeyspaceSnapshot, SNAPSHOT_VERSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Identifies a FlareKV snapshot file.
const SNAPSHOT_MAGIC: [u8; 4] = *b"FKV1";

/// Errors from saving or restoring snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// A foreground or background save is already running.
    #[error("a save operation is already in progress")]
    SaveInProgress,

    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    /// The file on disk is not a snapshot this build can read.
    #[error("snapshot file has an unrecognized header")]
    BadHeader,

    #[error("snapshot file version {0} is not supported (expected {SNAPSHOT_VERSION})")]
    UnsupportedVersion(u32),

    #[error("snapshot worker task failed: {0}")]
    TaskFailed(String),
}

/// The on-disk container: header plus the captured keyspace.
#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    magic: [u8; 4],
    version: u32,
    snapshot: KeyspaceSnapshot,
}

/// Point-in-time persistence stats, surfaced through `INFO persistence`.
#[derive(Debug, Clone)]
pub struct SnapshotStats {
    pub changes_since_save: u64,
    pub save_in_progress: bool,
    /// Unix seconds of the last successful save; zero if none yet.
    pub last_save_unix: i64,
    pub last_status: String,
    pub total_saves: u64,
    pub file_path: String,
}

/// The snapshot engine. Shared behind an `Arc` between the command handler
/// (SAVE/BGSAVE/LASTSAVE/INFO), the periodic ticker, and shutdown.
pub struct Snapshotter {
    path: PathBuf,
    keyspace: Arc<Keyspace>,
    in_progress: AtomicBool,
    shutting_down: AtomicBool,
    last_save_unix: AtomicI64,
    total_saves: AtomicU64,
    last_status: Mutex<String>,
}

impl Snapshotter {
    pub fn new(path: impl Into<PathBuf>, keyspace: Arc<Keyspace>) -> Self {
        Self {
            path: path.into(),
            keyspace,
            in_progress: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            last_save_unix: AtomicI64::new(0),
            total_saves: AtomicU64::new(0),
            last_status: Mutex::new("ok".to_string()),
        }
    }

    /// Restores the keyspace from the snapshot file, if one exists.
    ///
    /// Returns the number of restored keys, or `None` when no file was
    /// found (a fresh start, not an error). Decode and IO failures bubble
    /// up: startup must not silently continue with partial data.
    pub async fn load(&self) -> Result<Option<usize>, SnapshotError> {
        let path = self.path.clone();
        if !path.exists() {
            info!(path = %path.display(), "No snapshot file, starting empty");
            return Ok(None);
        }

        let raw = tokio::task::spawn_blocking(move || std::fs::read(&path))
            .await
            .map_err(|e| SnapshotError::TaskFailed(e.to_string()))??;

        let file: SnapshotFile = bincode::deserialize(&raw)?;
        if file.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadHeader);
        }
        if file.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(file.version));
        }

        let restored = self.keyspace.restore_snapshot(file.snapshot);
        info!(
            keys = restored,
            path = %self.path.display(),
            "Keyspace restored from snapshot"
        );
        Ok(Some(restored))
    }

    /// Foreground save (`SAVE`): runs the full protocol and waits for the
    /// rename to complete.
    pub async fn save(&self) -> Result<usize, SnapshotError> {
        self.begin()?;
        let result = self.perform_save().await;
        self.finish(&result);
        result
    }

    /// Background save (`BGSAVE`): claims the single-flight guard, then
    /// hands the work to a spawned task. Returns as soon as the save is
    /// scheduled.
    pub fn spawn_background_save(self: &Arc<Self>) -> Result<(), SnapshotError> {
        self.begin()?;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let result = this.perform_save().await;
            match &result {
                Ok(keys) => debug!(keys = keys, "Background save finished"),
                Err(e) => error!(error = %e, "Background save failed"),
            }
            this.finish(&result);
        });
        Ok(())
    }

    /// Claims the single-flight guard.
    fn begin(&self) -> Result<(), SnapshotError> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SnapshotError::SaveInProgress);
        }
        Ok(())
    }

    /// Records the outcome and releases the guard.
    fn finish(&self, result: &Result<usize, SnapshotError>) {
        match result {
            Ok(_) => {
                self.last_save_unix
                    .store(unix_now_secs(), Ordering::Relaxed);
                self.total_saves.fetch_add(1, Ordering::Relaxed);
                self.keyspace.reset_changes();
                *self.last_status.lock().unwrap() = "ok".to_string();
            }
            Err(_) => {
                *self.last_status.lock().unwrap() = "error".to_string();
            }
        }
        self.in_progress.store(false, Ordering::Release);
    }

    /// Capture, encode, write-temp, fsync, rename. Caller holds the guard.
    async fn perform_save(&self) -> Result<usize, SnapshotError> {
        let started = std::time::Instant::now();
        let snapshot = self.keyspace.create_snapshot();
        let keys = snapshot.records.len();

        let file = SnapshotFile {
            magic: SNAPSHOT_MAGIC,
            version: SNAPSHOT_VERSION,
            snapshot,
        };
        let encoded = bincode::serialize(&file)?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &encoded))
            .await
            .map_err(|e| SnapshotError::TaskFailed(e.to_string()))??;

        info!(
            keys = keys,
            elapsed_ms = started.elapsed().as_millis() as u64,
            path = %self.path.display(),
            "Snapshot saved"
        );
        Ok(keys)
    }

    /// Spawns the periodic background-save ticker.
    pub fn start_ticker(self: &Arc<Self>, interval: Duration) -> SnapshotTicker {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let this = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    result = shutdown_rx.changed() => {
                        if result.is_err() || *shutdown_rx.borrow() {
                            debug!("Snapshot ticker shutting down");
                            return;
                        }
                    }
                }

                if this.shutting_down.load(Ordering::Relaxed) {
                    return;
                }
                match this.spawn_background_save() {
                    Ok(()) => {}
                    Err(SnapshotError::SaveInProgress) => {
                        debug!("Skipping periodic save, one is already running")
                    }
                    Err(e) => warn!(error = %e, "Periodic save could not be scheduled"),
                }
            }
        });

        info!(
            interval_secs = interval.as_secs(),
            "Periodic snapshot ticker started"
        );
        SnapshotTicker { shutdown_tx }
    }

    /// Marks shutdown (stopping future periodic saves) and runs the final
    /// foreground save when requested.
    pub async fn shutdown(&self, save_on_exit: bool) {
        self.shutting_down.store(true, Ordering::Relaxed);
        if !save_on_exit {
            return;
        }
        match self.save().await {
            Ok(keys) => info!(keys = keys, "Final snapshot written"),
            Err(SnapshotError::SaveInProgress) => {
                warn!("Final save skipped, another save was still running")
            }
            Err(e) => error!(error = %e, "Final snapshot failed"),
        }
    }

    /// Unix seconds of the last successful save (`LASTSAVE`).
    pub fn last_save_unix(&self) -> i64 {
        self.last_save_unix.load(Ordering::Relaxed)
    }

    /// Stats block for `INFO persistence`.
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            changes_since_save: self.keyspace.changes_since_save(),
            save_in_progress: self.in_progress.load(Ordering::Relaxed),
            last_save_unix: self.last_save_unix(),
            last_status: self.last_status.lock().unwrap().clone(),
            total_saves: self.total_saves.load(Ordering::Relaxed),
            file_path: self.path.display().to_string(),
        }
    }
}

/// Handle to the periodic ticker task; dropping it stops the ticker.
#[derive(Debug)]
pub struct SnapshotTicker {
    shutdown_tx: watch::Sender<bool>,
}

impl SnapshotTicker {
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for SnapshotTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Writes `data` to `<path>.tmp`, fsyncs, and renames over `path`. The
/// temp file is removed on any failure so retries start clean.
fn write_atomically(path: &Path, data: &[u8]) -> Result<(), SnapshotError> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let outcome = (|| -> Result<(), SnapshotError> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, path)?;
        Ok(())
    })();

    if outcome.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    outcome
}

fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
