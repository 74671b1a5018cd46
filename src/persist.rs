//! Crash-safe JSON files for settings and session snapshots.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug)]
pub enum PersistError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Invalid(String),
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistError::Io(e) => write!(f, "I/O error: {e}"),
            PersistError::Json(e) => write!(f, "JSON error: {e}"),
            PersistError::Invalid(msg) => write!(f, "Invalid file: {msg}"),
        }
    }
}

impl std::error::Error for PersistError {}

impl From<std::io::Error> for PersistError {
    fn from(e: std::io::Error) -> Self {
        PersistError::Io(e)
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        PersistError::Json(e)
    }
}

/// One lock per target path so concurrent writers cannot race on the `.tmp` file.
static WRITE_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.file_name().unwrap_or_default());
    name.push(suffix);
    path.with_file_name(name)
}

/// Write bytes via a fsynced `.tmp` sibling and a rename. The previous file,
/// if any, is kept as `.bak`. A failed write leaves no `.tmp` behind.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), PersistError> {
    let lock = Arc::clone(
        WRITE_LOCKS
            .lock()
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(()))),
    );
    let result = {
        let _guard = lock.lock();
        write_locked(path, data)
    };
    release_lock(path, &lock);
    result
}

fn write_locked(path: &Path, data: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = sibling(path, ".tmp");
    let written = write_tmp(&tmp_path, data).and_then(|()| {
        if path.exists() {
            // Best-effort backup; losing it must not block the write.
            let _ = fs::rename(path, sibling(path, ".bak"));
        }
        fs::rename(&tmp_path, path)
    });
    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written.map_err(PersistError::from)
}

fn write_tmp(tmp_path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp_path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Forget the path's lock once no other writer holds or waits on it.
fn release_lock(path: &Path, lock: &Arc<Mutex<()>>) {
    let mut locks = WRITE_LOCKS.lock();
    // One reference in the map, one held by the caller.
    if Arc::strong_count(lock) == 2 {
        locks.remove(path);
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(value)?;
    atomic_write(path, json.as_bytes())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}
