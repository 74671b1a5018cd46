use std::path::PathBuf;

use parking_lot::Mutex;

use crate::error::AppError;
use crate::session::MappingSession;
use crate::settings::{self, MapperSettings};

// ── Shared State ────────────────────────────────────────────────────

/// State shared across host threads. One session at a time; every command
/// runs under the session lock, so commands apply one after another.
pub struct SharedSession {
    session: Mutex<Option<MappingSession>>,
    settings: Mutex<MapperSettings>,
    pub app_config_dir: PathBuf,
}

impl SharedSession {
    /// Load settings from `app_config_dir`, falling back to defaults.
    pub fn new(app_config_dir: PathBuf) -> Self {
        let settings = settings::load_settings(&app_config_dir).unwrap_or_default();
        Self {
            session: Mutex::new(None),
            settings: Mutex::new(settings),
            app_config_dir,
        }
    }

    /// Make `session` the active one, returning the session it replaced.
    pub fn install(&self, session: MappingSession) -> Option<MappingSession> {
        tracing::debug!(label = session.label(), "session installed");
        self.session.lock().replace(session)
    }

    pub fn take(&self) -> Option<MappingSession> {
        self.session.lock().take()
    }

    pub fn is_active(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Read-only access to the active session. Locks the mutex for the duration of `f`.
    pub fn with_session<F, R>(&self, f: F) -> Result<R, AppError>
    where
        F: FnOnce(&MappingSession) -> R,
    {
        let guard = self.session.lock();
        guard.as_ref().map(f).ok_or_else(no_session)
    }

    /// Mutating access to the active session. Locks the mutex for the duration of `f`.
    pub fn with_session_mut<F, R>(&self, f: F) -> Result<R, AppError>
    where
        F: FnOnce(&mut MappingSession) -> R,
    {
        let mut guard = self.session.lock();
        guard.as_mut().map(f).ok_or_else(no_session)
    }

    pub fn settings(&self) -> MapperSettings {
        self.settings.lock().clone()
    }

    /// Validate, persist and apply new settings, including to the active session.
    pub fn update_settings(&self, new: MapperSettings) -> Result<(), AppError> {
        settings::save_settings(&self.app_config_dir, &new)?;
        if let Some(session) = self.session.lock().as_mut() {
            session.set_settings(new.clone());
        }
        *self.settings.lock() = new;
        Ok(())
    }
}

fn no_session() -> AppError {
    AppError::NotFound {
        what: "Mapping session".into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::Entity;

    fn shared(name: &str) -> SharedSession {
        let dir = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&dir);
        SharedSession::new(dir)
    }

    #[test]
    fn access_without_session_is_not_found() {
        let shared = shared("vibemapper_test_state_empty");
        assert!(!shared.is_active());
        let err = shared.with_session(|s| s.label().to_string()).unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    #[test]
    fn commands_apply_through_the_lock() {
        let shared = shared("vibemapper_test_state_cmds");
        let sources = vec![Entity::model("Arch 1", 50), Entity::model("Arch 2", 50)];
        let dests = vec![Entity::model("Left Arch", 50), Entity::model("Right Arch", 50)];
        let session = MappingSession::new("Show", sources, dests, shared.settings());
        assert!(shared.install(session).is_none());

        shared
            .with_session_mut(|s| s.assign("Arch 1", "Right Arch"))
            .unwrap();
        let dest = shared
            .with_session(|s| s.state().dest_of("Arch 1").map(ToString::to_string))
            .unwrap();
        assert_eq!(dest.as_deref(), Some("Right Arch"));
        assert!(shared.take().is_some());
        assert!(!shared.is_active());
    }

    #[test]
    fn settings_update_reaches_session_and_disk() {
        let shared = shared("vibemapper_test_state_settings");
        let session = MappingSession::new("Show", Vec::new(), Vec::new(), shared.settings());
        shared.install(session);

        let new = MapperSettings {
            suggestion_limit: 9,
            ..MapperSettings::default()
        };
        shared.update_settings(new.clone()).unwrap();
        assert_eq!(shared.with_session(|s| s.settings().suggestion_limit).unwrap(), 9);
        assert_eq!(settings::load_settings(&shared.app_config_dir), Some(new));

        let bad = MapperSettings {
            auto_accept_threshold: -1.0,
            ..MapperSettings::default()
        };
        assert!(shared.update_settings(bad).is_err());
        assert_eq!(shared.settings().suggestion_limit, 9);

        let _ = std::fs::remove_dir_all(&shared.app_config_dir);
    }
}
