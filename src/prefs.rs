//! Preferences store: the single owner of [`Preferences`].
//!
//! [`PreferencesStore::update`] is the only mutation path. Every update is
//! persisted through the configured [`PreferencePersistence`] and broadcast
//! as a snapshot. Persistence failures are logged and the in-memory value is
//! kept, so a read-only config directory never stops reminders.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::config::Preferences;
use crate::error::{CoreError, Result};
use crate::notify::Notifier;

/// Storage backend for preferences.
pub trait PreferencePersistence: Send {
    /// Load stored preferences. `Ok(None)` means nothing has been saved yet.
    fn load(&mut self) -> Result<Option<Preferences>>;
    fn save(&mut self, prefs: &Preferences) -> Result<()>;
}

/// TOML file persistence (`config.toml`).
#[derive(Debug, Clone)]
pub struct TomlPersistence {
    path: PathBuf,
}

impl TomlPersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Persistence at [`Preferences::default_config_path`].
    #[must_use]
    pub fn at_default_path() -> Self {
        Self::new(Preferences::default_config_path())
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl PreferencePersistence for TomlPersistence {
    fn load(&mut self) -> Result<Option<Preferences>> {
        if !self.path.exists() {
            return Ok(None);
        }
        Preferences::from_file(&self.path).map(Some)
    }

    fn save(&mut self, prefs: &Preferences) -> Result<()> {
        prefs.save_to_file(&self.path)
    }
}

/// In-memory persistence. Clones share storage so tests can inspect saves.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersistence {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    stored: Option<Preferences>,
    saves: usize,
    fail_saves: bool,
}

impl MemoryPersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Persistence pre-seeded with stored preferences.
    #[must_use]
    pub fn with_stored(prefs: Preferences) -> Self {
        let this = Self::default();
        this.with_state(|s| s.stored = Some(prefs));
        this
    }

    /// Make every subsequent save fail.
    pub fn fail_saves(&self, fail: bool) {
        self.with_state(|s| s.fail_saves = fail);
    }

    #[must_use]
    pub fn saves(&self) -> usize {
        self.with_state(|s| s.saves)
    }

    #[must_use]
    pub fn stored(&self) -> Option<Preferences> {
        self.with_state(|s| s.stored.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

impl PreferencePersistence for MemoryPersistence {
    fn load(&mut self) -> Result<Option<Preferences>> {
        Ok(self.stored())
    }

    fn save(&mut self, prefs: &Preferences) -> Result<()> {
        self.with_state(|s| {
            if s.fail_saves {
                return Err(CoreError::Config("persistence unavailable".into()));
            }
            s.stored = Some(prefs.clone());
            s.saves += 1;
            Ok(())
        })
    }
}

/// Owner of the live [`Preferences`] value.
pub struct PreferencesStore {
    current: Preferences,
    persistence: Box<dyn PreferencePersistence>,
    notifier: Notifier,
}

impl std::fmt::Debug for PreferencesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferencesStore")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl PreferencesStore {
    /// Load from `persistence`, falling back to defaults when nothing is
    /// stored or the stored file is unreadable.
    pub fn load(mut persistence: Box<dyn PreferencePersistence>, notifier: Notifier) -> Self {
        let current = match persistence.load() {
            Ok(Some(prefs)) => prefs,
            Ok(None) => {
                debug!("no stored preferences, using defaults");
                Preferences::default()
            }
            Err(e) => {
                warn!("failed to load preferences, using defaults: {e}");
                Preferences::default()
            }
        };
        Self {
            current,
            persistence,
            notifier,
        }
    }

    #[must_use]
    pub fn get(&self) -> &Preferences {
        &self.current
    }

    /// Apply `mutate`, then persist and broadcast the new snapshot.
    ///
    /// Returns `false` (and does nothing else) when the mutation left the
    /// preferences unchanged.
    pub fn update(&mut self, mutate: impl FnOnce(&mut Preferences)) -> bool {
        let mut next = self.current.clone();
        mutate(&mut next);
        if next == self.current {
            return false;
        }
        self.current = next;
        self.commit();
        true
    }

    /// Restore every preference to its default.
    pub fn reset(&mut self) {
        self.current = Preferences::default();
        self.commit();
    }

    /// Broadcast the current snapshot without changing anything.
    pub fn publish(&self) {
        self.notifier.preferences(&self.current);
    }

    fn commit(&mut self) {
        if let Err(e) = self.persistence.save(&self.current) {
            warn!("failed to persist preferences: {e}");
        }
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::notify::Notification;

    fn store_with(persistence: MemoryPersistence) -> (PreferencesStore, Notifier) {
        let (notifier, _rx) = Notifier::new(16);
        let store = PreferencesStore::load(Box::new(persistence), notifier.clone());
        (store, notifier)
    }

    #[test]
    fn loads_stored_value() {
        let mut stored = Preferences::default();
        stored.reminder.interval_ms = 9_000;
        let (store, _) = store_with(MemoryPersistence::with_stored(stored));
        assert_eq!(store.get().reminder.interval_ms, 9_000);
    }

    #[test]
    fn update_persists_and_notifies() {
        let persistence = MemoryPersistence::new();
        let (mut store, notifier) = store_with(persistence.clone());
        let mut rx = notifier.subscribe();

        assert!(store.update(|p| p.reminder.camera_enabled = true));
        assert_eq!(persistence.saves(), 1);
        assert!(persistence.stored().unwrap().reminder.camera_enabled);
        match rx.try_recv().unwrap() {
            Notification::Preferences { prefs } => assert!(prefs.reminder.camera_enabled),
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn unchanged_update_is_skipped() {
        let persistence = MemoryPersistence::new();
        let (mut store, notifier) = store_with(persistence.clone());
        let mut rx = notifier.subscribe();
        assert!(!store.update(|p| p.reminder.interval_ms = 5_000));
        assert_eq!(persistence.saves(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn failed_save_keeps_in_memory_value() {
        let persistence = MemoryPersistence::new();
        persistence.fail_saves(true);
        let (mut store, _) = store_with(persistence.clone());
        assert!(store.update(|p| p.ui.dark_mode = true));
        assert!(store.get().ui.dark_mode);
        assert!(persistence.stored().is_none());
    }

    #[test]
    fn reset_restores_defaults() {
        let mut stored = Preferences::default();
        stored.popup.message = "Look away".into();
        let (mut store, _) = store_with(MemoryPersistence::with_stored(stored));
        store.reset();
        assert_eq!(store.get(), &Preferences::default());
    }

    #[test]
    fn toml_persistence_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut persistence = TomlPersistence::new(dir.path().join("config.toml"));
        assert!(persistence.load().unwrap().is_none());

        let mut prefs = Preferences::default();
        prefs.exercise.enabled = true;
        persistence.save(&prefs).unwrap();
        assert_eq!(persistence.load().unwrap(), Some(prefs));
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[reminder\ninterval_ms = ").unwrap();
        let (notifier, _rx) = Notifier::new(4);
        let store = PreferencesStore::load(Box::new(TomlPersistence::new(path)), notifier);
        assert_eq!(store.get(), &Preferences::default());
    }
}
