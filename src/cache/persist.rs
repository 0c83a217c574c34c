//! On-disk cache snapshots.
//!
//! A snapshot is written once on shutdown and consumed once on the next
//! start. Loading marks the file used and drops its lines, so a crash
//! loop cannot replay the same history twice.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ring::RingBuffer;
use crate::error::PersistError;

/// Serialized form of a [`MessageCache`](super::MessageCache).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    /// Unix seconds at save time.
    pub timestamp: i64,
    #[serde(default)]
    pub has_been_used: bool,
    #[serde(default)]
    pub cursors: BTreeMap<String, usize>,
    #[serde(default)]
    pub buffers: BTreeMap<String, Vec<Option<String>>>,
}

impl CacheSnapshot {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            has_been_used: false,
            cursors: BTreeMap::new(),
            buffers: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, key: &str, ring: &RingBuffer) {
        self.cursors.insert(key.to_string(), ring.cursor());
        self.buffers.insert(key.to_string(), ring.slots().to_vec());
    }

    /// `(key, slots, cursor)` per buffer. A missing cursor reads as zero.
    pub(crate) fn into_buffers(self) -> impl Iterator<Item = (String, Vec<Option<String>>, usize)> {
        let cursors = self.cursors;
        self.buffers.into_iter().map(move |(key, slots)| {
            let cursor = cursors.get(&key).copied().unwrap_or(0);
            (key, slots, cursor)
        })
    }

    /// Lines held across all buffers.
    pub fn line_count(&self) -> usize {
        self.buffers.values().flatten().filter(|s| s.is_some()).count()
    }
}

/// Write a snapshot, replacing any previous file atomically.
pub fn save_snapshot(path: &Path, snapshot: &CacheSnapshot) -> Result<(), PersistError> {
    let json = serde_json::to_vec(snapshot)?;
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    info!(
        path = %path.display(),
        lines = snapshot.line_count(),
        "cache snapshot saved"
    );
    Ok(())
}

/// Read a snapshot and invalidate the file.
///
/// Fails when the file is malformed, already used, or older than
/// `max_age_secs` relative to `now`. The file is marked used in every
/// case where it could be parsed.
pub fn load_snapshot(path: &Path, now: i64, max_age_secs: u64) -> Result<CacheSnapshot, PersistError> {
    let data = fs::read(path)?;
    let snapshot: CacheSnapshot = serde_json::from_slice(&data)?;
    if snapshot.has_been_used {
        return Err(PersistError::AlreadyUsed);
    }

    let mut spent = CacheSnapshot::new(snapshot.timestamp);
    spent.has_been_used = true;
    fs::write(path, serde_json::to_vec(&spent)?)?;
    debug!(path = %path.display(), "cache snapshot invalidated");

    let age = now.saturating_sub(snapshot.timestamp);
    if age < 0 {
        return Err(PersistError::Inconsistent(format!(
            "timestamp {} is in the future",
            snapshot.timestamp
        )));
    }
    if age as u64 > max_age_secs {
        return Err(PersistError::Expired {
            age: age as u64,
            limit: max_age_secs,
        });
    }
    for key in snapshot.buffers.keys() {
        if let Some(&cursor) = snapshot.cursors.get(key) {
            let len = snapshot.buffers[key].len();
            if len > 0 && cursor >= len {
                return Err(PersistError::Inconsistent(format!(
                    "cursor {} out of range for buffer {:?} of {}",
                    cursor, key, len
                )));
            }
        }
    }
    Ok(snapshot)
}

/// Load the snapshot at `path` for startup.
///
/// A missing file yields `Ok(None)`. Any other failure is logged and
/// returned so the caller can report it before starting with an empty
/// cache.
pub fn restore_on_startup(
    path: &Path,
    max_age_secs: u64,
) -> Result<Option<CacheSnapshot>, PersistError> {
    if !path.exists() {
        debug!(path = %path.display(), "no cache snapshot to restore");
        return Ok(None);
    }
    match load_snapshot(path, chrono::Utc::now().timestamp(), max_age_secs) {
        Ok(snapshot) => {
            info!(
                path = %path.display(),
                lines = snapshot.line_count(),
                "restoring cached history"
            );
            Ok(Some(snapshot))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "starting with an empty cache");
            Err(e)
        }
    }
}
