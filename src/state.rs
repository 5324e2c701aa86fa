use chrono::NaiveDate;

use crate::models::{Settings, SettingsFile};
use crate::store::TaskStore;

const SCHEMA_VERSION: u32 = 1;

/// Everything a running session owns: the task store, the date the user is
/// looking at, and whether the last save reached disk.
#[derive(Debug)]
pub struct AppState {
    store: TaskStore,
    settings: Settings,
    selected: Option<NaiveDate>,
    dirty: bool,
    backup_pending: bool,
}

impl AppState {
    pub fn new(store: TaskStore, settings: Settings) -> Self {
        Self {
            store,
            settings,
            selected: None,
            dirty: false,
            backup_pending: false,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Mutable access marks the state as unsaved until [`AppState::mark_saved`].
    pub fn store_mut(&mut self) -> &mut TaskStore {
        self.dirty = true;
        &mut self.store
    }

    /// Runs a fallible store mutation; only a successful one marks the state unsaved.
    pub fn try_update<R, E>(
        &mut self,
        update: impl FnOnce(&mut TaskStore) -> Result<R, E>,
    ) -> Result<R, E> {
        let out = update(&mut self.store)?;
        self.dirty = true;
        Ok(out)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_file(&self) -> SettingsFile {
        SettingsFile {
            schema_version: SCHEMA_VERSION,
            settings: self.settings.clone(),
        }
    }

    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.selected
    }

    pub fn select_date(&mut self, date: Option<NaiveDate>) {
        self.selected = date;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// The file on disk must be copied aside before it is first overwritten.
    pub fn backup_pending(&self) -> bool {
        self.backup_pending
    }

    pub fn set_backup_pending(&mut self, pending: bool) {
        self.backup_pending = pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_clean_and_unselected() {
        let state = AppState::new(TaskStore::new(), Settings::default());
        assert!(!state.is_dirty());
        assert!(!state.backup_pending());
        assert_eq!(state.selected_date(), None);
        assert_eq!(state.settings_file().schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn store_mut_marks_dirty_until_saved() {
        let mut state = AppState::new(TaskStore::new(), Settings::default());
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        state.store_mut().add_task("a", day, false, 0);
        assert!(state.is_dirty());
        assert_eq!(state.store().len(), 1);

        state.mark_saved();
        assert!(!state.is_dirty());
    }

    #[test]
    fn failed_updates_leave_the_state_clean() {
        let mut state = AppState::new(TaskStore::new(), Settings::default());
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        assert!(state.try_update(|store| store.remove_task(day, 0)).is_err());
        assert!(!state.is_dirty());

        let priority = state
            .try_update(|store| {
                let id = store.add_task("a", day, false, 0);
                store.promote_by_id(id, 2)
            })
            .unwrap();
        assert_eq!(priority, 2);
        assert!(state.is_dirty());
    }

    #[test]
    fn selection_and_settings_are_replaceable() {
        let mut state = AppState::new(TaskStore::new(), Settings::default());
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        state.select_date(Some(day));
        assert_eq!(state.selected_date(), Some(day));
        state.select_date(None);
        assert_eq!(state.selected_date(), None);

        let mut next = Settings::default();
        next.promote_step = 5;
        state.update_settings(next);
        assert_eq!(state.settings().promote_step, 5);
    }
}
