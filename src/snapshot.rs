//! Saved mapping progress, so an interrupted session can pick up where it left off.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::AppError;
use crate::model::Assignment;
use crate::persist::{read_json, write_json, PersistError};
use crate::phase::MappingPhase;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Snapshots older than this are ignored on resume.
pub const SNAPSHOT_MAX_AGE_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionSnapshot {
    pub version: u32,
    /// Unix seconds.
    #[ts(type = "number")]
    pub saved_at: u64,
    pub sequence_label: String,
    pub phase: MappingPhase,
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub skipped: Vec<String>,
    #[serde(default)]
    pub overrides: Vec<String>,
    #[serde(default)]
    pub dismissed_families: Vec<String>,
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

impl SessionSnapshot {
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.saved_at)
    }

    /// A snapshot from the future (clock skew) counts as fresh.
    pub fn is_fresh(&self, now: u64) -> bool {
        self.age_secs(now) <= SNAPSHOT_MAX_AGE_SECS
    }
}

pub fn save_snapshot(path: &Path, snapshot: &SessionSnapshot) -> Result<(), AppError> {
    write_json(path, snapshot).map_err(|e| AppError::SnapshotError { message: e.to_string() })?;
    tracing::info!(
        path = %path.display(),
        assignments = snapshot.assignments.len(),
        skipped = snapshot.skipped.len(),
        "session snapshot saved"
    );
    Ok(())
}

/// Load a snapshot that is still fresh at `now`.
pub fn load_snapshot(path: &Path, now: u64) -> Result<SessionSnapshot, AppError> {
    let snapshot: SessionSnapshot = match read_json(path) {
        Ok(s) => s,
        Err(PersistError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound {
                what: format!("Session snapshot {}", path.display()),
            });
        }
        Err(e) => return Err(AppError::SnapshotError { message: e.to_string() }),
    };
    if snapshot.version > SNAPSHOT_VERSION {
        return Err(AppError::SnapshotError {
            message: format!("unsupported snapshot version {}", snapshot.version),
        });
    }
    if !snapshot.is_fresh(now) {
        tracing::info!(age_secs = snapshot.age_secs(now), "discarding stale session snapshot");
        return Err(AppError::SnapshotError {
            message: format!("snapshot is older than {} hours", SNAPSHOT_MAX_AGE_SECS / 3600),
        });
    }
    Ok(snapshot)
}

/// Remove a saved snapshot. Missing files are fine.
pub fn clear_snapshot(path: &Path) -> Result<(), AppError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
