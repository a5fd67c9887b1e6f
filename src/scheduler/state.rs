//! Scheduling state: last-call timestamps and pending retries,
//! mirrored to JSON documents in a per-provider state directory.
//!
//! Both documents map topic to epoch seconds. Writes go to a temp
//! file, sync, then rename over the target, so a crash mid-write
//! leaves the previous snapshot intact. Mutations persist the changed
//! document before updating the in-memory map, keeping memory and
//! disk at the same snapshot when a write fails.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{Error, Result};

const LAST_CALL_FILE: &str = "last_call_timestamps.json";
const RETRY_FILE: &str = "retry_calls.json";
const LOCK_FILE: &str = "poller.lock";

/// Scheduling state for one provider.
#[derive(Debug)]
pub struct ScheduleState {
    dir: PathBuf,
    last_calls: BTreeMap<String, i64>,
    retries: BTreeMap<String, i64>,
}

impl ScheduleState {
    /// Load state from a directory, creating it if needed. Absent or
    /// unreadable documents become empty maps, never errors: losing
    /// scheduling state only means polling restarts eagerly.
    pub async fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        let last_calls = load_map(&dir.join(LAST_CALL_FILE)).await;
        let retries = load_map(&dir.join(RETRY_FILE)).await;
        Ok(Self {
            dir,
            last_calls,
            retries,
        })
    }

    /// Epoch seconds of the last fetch attempt for a topic.
    pub fn last_call(&self, topic: &str) -> Option<i64> {
        self.last_calls.get(topic).copied()
    }

    /// Epoch seconds at which a pending retry becomes due.
    pub fn retry_at(&self, topic: &str) -> Option<i64> {
        self.retries.get(topic).copied()
    }

    /// Topics whose pending retry is due at `now`.
    pub fn due_retries(&self, now: i64) -> Vec<String> {
        self.retries
            .iter()
            .filter(|&(_, &at)| now >= at)
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Record a fetch attempt. Called after every attempt, successful
    /// or not, so the minimum interval holds regardless of outcome.
    pub async fn record_attempt(&mut self, topic: &str, at: i64) -> Result<()> {
        let mut next = self.last_calls.clone();
        next.insert(topic.to_string(), at);
        self.persist(LAST_CALL_FILE, &next).await?;
        self.last_calls = next;
        Ok(())
    }

    /// Schedule a retry for a topic. Overwrites any pending retry.
    pub async fn schedule_retry(&mut self, topic: &str, at: i64) -> Result<()> {
        let mut next = self.retries.clone();
        next.insert(topic.to_string(), at);
        self.persist(RETRY_FILE, &next).await?;
        self.retries = next;
        Ok(())
    }

    /// Remove a topic's pending retry, if any.
    pub async fn clear_retry(&mut self, topic: &str) -> Result<()> {
        if !self.retries.contains_key(topic) {
            return Ok(());
        }
        let mut next = self.retries.clone();
        next.remove(topic);
        self.persist(RETRY_FILE, &next).await?;
        self.retries = next;
        Ok(())
    }

    async fn persist(&self, file_name: &str, map: &BTreeMap<String, i64>) -> Result<()> {
        let path = self.dir.join(file_name);
        let bytes = serde_json::to_vec_pretty(map)?;
        write_atomic(&path, &bytes)
            .await
            .map_err(|source| Error::StateWrite { path, source })
    }
}

async fn load_map(path: &Path) -> BTreeMap<String, i64> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable state file, starting empty");
            return BTreeMap::new();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(map) => map,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt state file, starting empty");
            BTreeMap::new()
        }
    }
}

/// Write bytes atomically (write to temp, sync, then rename).
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await
}

/// Single-writer guard for a state directory. Held for the lifetime
/// of a poll daemon and removed on drop.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
}

impl StateLock {
    /// Acquire the lock, failing if another live poller holds it. A
    /// lock left behind by a dead process is taken over.
    pub fn acquire(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);

        match try_create(&path) {
            Ok(()) => return Ok(Self { path }),
            Err(e) if e.kind() != std::io::ErrorKind::AlreadyExists => return Err(e.into()),
            Err(_) => {}
        }

        let holder = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok());
        if let Some(pid) = holder {
            if process_alive(pid) {
                return Err(Error::StateLocked { path, pid });
            }
        }

        info!(path = %path.display(), "taking over stale poller lock");
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match try_create(&path) {
            Ok(()) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Lost the takeover race to another poller.
                let pid = std::fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| s.trim().parse::<u32>().ok())
                    .unwrap_or_default();
                Err(Error::StateLocked { path, pid })
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn try_create(path: &Path) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    write!(file, "{}", std::process::id())
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    // No cheap liveness check; assume the holder is alive and let the
    // operator remove the lock by hand.
    true
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove poller lock");
        }
    }
}
