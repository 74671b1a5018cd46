use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::AppError;
use crate::persist::{read_json, write_json, PersistError};

pub const SETTINGS_VERSION: u32 = 1;

fn default_version() -> u32 {
    SETTINGS_VERSION
}
fn default_auto_accept() -> f64 {
    0.70
}
fn default_strong_match() -> f64 {
    0.75
}
fn default_explain_floor() -> f64 {
    0.10
}
fn default_suggestion_limit() -> usize {
    5
}

/// Mapper tuning stored in the app config directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct MapperSettings {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Minimum score the auto-matcher accepts. Also the floor for sacrifice reports.
    #[serde(default = "default_auto_accept")]
    pub auto_accept_threshold: f64,
    /// Suggestions at or above this score are flagged strong.
    #[serde(default = "default_strong_match")]
    pub strong_match_threshold: f64,
    /// Pairs scoring below this get no breakdown.
    #[serde(default = "default_explain_floor")]
    pub explain_floor: f64,
    #[serde(default = "default_suggestion_limit")]
    #[ts(type = "number")]
    pub suggestion_limit: usize,
}

impl Default for MapperSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            auto_accept_threshold: default_auto_accept(),
            strong_match_threshold: default_strong_match(),
            explain_floor: default_explain_floor(),
            suggestion_limit: default_suggestion_limit(),
        }
    }
}

impl MapperSettings {
    fn thresholds(&self) -> [(&'static str, f64); 3] {
        [
            ("auto_accept_threshold", self.auto_accept_threshold),
            ("strong_match_threshold", self.strong_match_threshold),
            ("explain_floor", self.explain_floor),
        ]
    }

    /// Reject thresholds outside [0, 1] and a zero suggestion limit.
    pub fn validate(&self) -> Result<(), AppError> {
        for (field, value) in self.thresholds() {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::SettingsError {
                    message: format!("{field} must be between 0 and 1, got {value}"),
                });
            }
        }
        if self.suggestion_limit == 0 {
            return Err(AppError::SettingsError {
                message: "suggestion_limit must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Pull every value back into range. Used for files edited by hand.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        let clamp = |v: f64, default: f64| if v.is_nan() { default } else { v.clamp(0.0, 1.0) };
        self.auto_accept_threshold = clamp(self.auto_accept_threshold, default_auto_accept());
        self.strong_match_threshold = clamp(self.strong_match_threshold, default_strong_match());
        self.explain_floor = clamp(self.explain_floor, default_explain_floor());
        self.suggestion_limit = self.suggestion_limit.max(1);
        self.version = SETTINGS_VERSION;
        self
    }
}

/// Load settings from the app config directory. Returns None if no settings
/// file exists or it cannot be parsed.
pub fn load_settings(app_config_dir: &Path) -> Option<MapperSettings> {
    let path = crate::paths::settings_path(app_config_dir);
    if !path.exists() {
        return None;
    }
    match read_json::<MapperSettings>(&path) {
        Ok(settings) => Some(settings.clamped()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable settings");
            None
        }
    }
}

/// Validate, then save settings to the app config directory.
pub fn save_settings(app_config_dir: &Path, settings: &MapperSettings) -> Result<(), AppError> {
    settings.validate()?;
    write_json(&crate::paths::settings_path(app_config_dir), settings)
        .map_err(|e: PersistError| AppError::SettingsError { message: e.to_string() })?;
    tracing::debug!(dir = %app_config_dir.display(), "settings saved");
    Ok(())
}

/// JSON schema of [`MapperSettings`] for settings editors.
pub fn settings_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(MapperSettings)).unwrap_or(serde_json::Value::Null)
}
