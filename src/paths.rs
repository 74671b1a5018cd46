//! Leaf filenames and path builders for everything the mapper writes.
//!
//! Functions take the directory explicitly so library hosts and the CLI agree.

use std::path::{Path, PathBuf};

pub const APP_ID: &str = "com.vibelights.mapper";

pub const SETTINGS_FILE: &str = "settings.json";
pub const SNAPSHOT_FILE: &str = "mapping-session.json";
pub const XMAP_EXTENSION: &str = "xmap";

pub fn settings_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SETTINGS_FILE)
}

pub fn snapshot_path(app_config_dir: &Path) -> PathBuf {
    app_config_dir.join(SNAPSHOT_FILE)
}

/// Default export path next to the sequence: `<dir>/<label>.xmap`.
pub fn xmap_path(dir: &Path, label: &str) -> PathBuf {
    dir.join(format!("{}.{XMAP_EXTENSION}", crate::util::slugify(label)))
}

/// `<config_dir>/com.vibelights.mapper`, following each platform's convention.
pub fn default_config_dir() -> PathBuf {
    let home = || {
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_or_else(|_| PathBuf::from("."), PathBuf::from)
    };
    let base = if cfg!(target_os = "windows") {
        std::env::var("APPDATA").map_or_else(|_| home().join("AppData").join("Roaming"), PathBuf::from)
    } else if cfg!(target_os = "macos") {
        home().join("Library/Application Support")
    } else {
        std::env::var("XDG_CONFIG_HOME").map_or_else(|_| home().join(".config"), PathBuf::from)
    };
    base.join(APP_ID)
}
