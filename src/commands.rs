use std::path::PathBuf;

use chrono::NaiveDate;

use crate::events::{TaskRef, UiEvent, ViewPayload};
use crate::models::{Settings, TaskId};
use crate::projection::{project_dates, project_tasks, resolve_row};
use crate::state::AppState;
use crate::storage::{is_valid_data_file, LoadedTasks, Storage, StorageError, SETTINGS_FILE};
use crate::store::{StoreError, TaskStore};

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// What a front end provides to the command layer.
pub trait CommandCtx {
    fn data_dir(&self) -> Result<PathBuf, StorageError>;
    fn today(&self) -> NaiveDate;
    fn emit_view_updated(&self, payload: &ViewPayload);
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
    }
}

fn rejected<T>(message: &str) -> CommandResult<T> {
    log::warn!("command rejected: {message}");
    err(message)
}

fn storage_for(ctx: &impl CommandCtx, settings: &Settings) -> Result<Storage, StorageError> {
    let root = ctx.data_dir()?;
    Ok(Storage::new(
        root,
        settings.data_file.clone(),
        settings.backup_limit,
    ))
}

fn load_settings(ctx: &impl CommandCtx) -> Settings {
    let storage = match storage_for(ctx, &Settings::default()) {
        Ok(storage) => storage,
        Err(error) => {
            log::warn!("data dir unavailable, using default settings: {error}");
            return Settings::default();
        }
    };
    match storage.load_settings() {
        Ok(file) if !is_valid_data_file(&file.settings.data_file) => {
            log::warn!(
                "settings.json names an unusable data_file {:?}, using the default",
                file.settings.data_file
            );
            Settings {
                data_file: Settings::default().data_file,
                ..file.settings
            }
        }
        Ok(file) => file.settings,
        Err(StorageError::Io(io)) if io.kind() == std::io::ErrorKind::NotFound => {
            Settings::default()
        }
        Err(error) => {
            log::warn!("settings.json unreadable, using defaults: {error}");
            Settings::default()
        }
    }
}

/// Builds the session state from disk. Never fails: anything unreadable
/// yields an empty store and a pending backup of the file that is there.
pub fn load_state_impl(ctx: &impl CommandCtx) -> AppState {
    let settings = load_settings(ctx);
    let mut backup_pending = false;

    let store = match storage_for(ctx, &settings) {
        Err(error) => {
            log::error!("data dir unavailable, starting with an empty list: {error}");
            TaskStore::new()
        }
        Ok(storage) => {
            let path = storage.tasks_path();
            match storage.load_tasks() {
                LoadedTasks::Missing => {
                    log::info!("no task file at {}, starting empty", path.display());
                    TaskStore::new()
                }
                LoadedTasks::Loaded(store, report) => {
                    if !report.is_clean() {
                        log::warn!(
                            "loaded {} with repairs: skipped_keys={:?} skipped_records={} legacy_keys={}",
                            path.display(),
                            report.skipped_keys,
                            report.skipped_records,
                            report.legacy_keys
                        );
                        backup_pending = true;
                    }
                    log::info!(
                        "loaded {} tasks across {} dates from {}",
                        store.len(),
                        store.all_dates().len(),
                        path.display()
                    );
                    store
                }
                LoadedTasks::Unreadable(error) => {
                    log::error!(
                        "failed to load {}, starting with an empty list: {error}",
                        path.display()
                    );
                    backup_pending = true;
                    TaskStore::new()
                }
            }
        }
    };

    let mut state = AppState::new(store, settings);
    state.set_backup_pending(backup_pending);
    state.select_date(Some(ctx.today()));
    state
}

fn persist(ctx: &impl CommandCtx, state: &mut AppState) -> Result<(), StorageError> {
    let storage = storage_for(ctx, state.settings())?;
    if state.backup_pending() && storage.tasks_path().exists() {
        match storage.create_backup() {
            Ok(backup) => log::info!(
                "copied {} to {} before rewriting it",
                storage.tasks_path().display(),
                backup.display()
            ),
            Err(error) => log::warn!(
                "backup of {} failed, overwriting anyway: {error}",
                storage.tasks_path().display()
            ),
        }
    }
    state.set_backup_pending(false);
    storage.save_tasks(state.store())?;
    state.mark_saved();
    log::debug!(
        "saved {} tasks to {}",
        state.store().len(),
        storage.tasks_path().display()
    );
    Ok(())
}

fn build_view(ctx: &impl CommandCtx, state: &AppState) -> ViewPayload {
    let selected = state.selected_date();
    ViewPayload {
        selected,
        dates: project_dates(
            state.store(),
            ctx.today(),
            selected,
            state.settings().always_show_today,
        ),
        tasks: project_tasks(state.store(), selected),
    }
}

fn refresh(ctx: &impl CommandCtx, state: &AppState) -> ViewPayload {
    let payload = build_view(ctx, state);
    ctx.emit_view_updated(&payload);
    payload
}

/// Saves after a mutation and pushes the new view. A failed save keeps the
/// change in memory; the next mutation or shutdown retries it.
fn commit(ctx: &impl CommandCtx, state: &mut AppState) -> CommandResult<ViewPayload> {
    let saved = persist(ctx, state);
    let payload = refresh(ctx, state);
    match saved {
        Ok(()) => ok(payload),
        Err(error) => {
            log::error!("saving tasks failed, keeping changes in memory: {error}");
            CommandResult {
                ok: false,
                data: Some(payload),
                error: Some(format!("storage error: {error}")),
            }
        }
    }
}

fn resolve(state: &AppState, date: NaiveDate, task: &TaskRef) -> Result<TaskId, String> {
    let store = state.store();
    let found = match task {
        TaskRef::Row(row) => resolve_row(store, date, *row),
        TaskRef::Index(index) => store.get(date, *index).map(|t| t.id),
        TaskRef::Id(id) => store
            .tasks_for(date)
            .into_iter()
            .find(|t| t.id == *id)
            .map(|t| t.id),
        TaskRef::Text(text) => store.find_by_text(date, text).map(|t| t.id),
    };
    found.ok_or_else(|| match task {
        TaskRef::Row(row) => format!("no task at row {row} on {date}"),
        TaskRef::Index(index) => format!("no task at index {index} on {date}"),
        TaskRef::Id(id) => format!("task {id} not found on {date}"),
        TaskRef::Text(text) => format!("no task named {text:?} on {date}"),
    })
}

fn store_outcome<T>(
    ctx: &impl CommandCtx,
    state: &mut AppState,
    outcome: Result<T, StoreError>,
) -> CommandResult<ViewPayload> {
    match outcome {
        Ok(_) => commit(ctx, state),
        Err(error) => rejected(&error.to_string()),
    }
}

pub fn refresh_impl(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<ViewPayload> {
    ok(refresh(ctx, state))
}

pub fn select_date_impl(
    ctx: &impl CommandCtx,
    state: &mut AppState,
    date: Option<NaiveDate>,
) -> CommandResult<ViewPayload> {
    state.select_date(date);
    log::debug!("selected date {date:?}");
    ok(refresh(ctx, state))
}

pub fn add_task_impl(
    ctx: &impl CommandCtx,
    state: &mut AppState,
    text: &str,
    date: NaiveDate,
) -> CommandResult<ViewPayload> {
    let text = text.trim();
    if text.is_empty() {
        return rejected("task text must not be empty");
    }
    let id = state.store_mut().add_task(text, date, false, 0);
    log::info!("added task {id} on {date}");
    commit(ctx, state)
}

/// Adds a task to a day that has not passed yet and switches to that day.
pub fn plan_task_impl(
    ctx: &impl CommandCtx,
    state: &mut AppState,
    text: &str,
    date: NaiveDate,
) -> CommandResult<ViewPayload> {
    if date < ctx.today() {
        return rejected(&format!("cannot plan a task for a past date ({date})"));
    }
    let text = text.trim();
    if text.is_empty() {
        return rejected("task text must not be empty");
    }
    state.select_date(Some(date));
    add_task_impl(ctx, state, text, date)
}

pub fn remove_task_impl(
    ctx: &impl CommandCtx,
    state: &mut AppState,
    date: NaiveDate,
    task: &TaskRef,
) -> CommandResult<ViewPayload> {
    let outcome = match task {
        TaskRef::Index(index) => state.try_update(|store| store.remove_task(date, *index)),
        other => match resolve(state, date, other) {
            Ok(id) => state.try_update(|store| store.remove_by_id(id)),
            Err(message) => return rejected(&message),
        },
    };
    if let Ok(removed) = &outcome {
        log::info!("removed task {} from {date}", removed.id);
    }
    store_outcome(ctx, state, outcome)
}

pub fn set_completed_impl(
    ctx: &impl CommandCtx,
    state: &mut AppState,
    date: NaiveDate,
    task: &TaskRef,
    completed: bool,
) -> CommandResult<ViewPayload> {
    let outcome = match task {
        TaskRef::Index(index) => state
            .try_update(|store| store.set_completed(date, *index, completed))
            .map_err(|error| error.to_string()),
        TaskRef::Text(text) => state.try_update(|store| {
            if store.set_completed_by_text(date, text, completed) {
                Ok(())
            } else {
                Err(format!("no task named {text:?} on {date}"))
            }
        }),
        other => resolve(state, date, other).and_then(|id| {
            state
                .try_update(|store| store.set_completed_by_id(id, completed))
                .map_err(|error| error.to_string())
        }),
    };
    if let Err(message) = outcome {
        return rejected(&message);
    }
    log::info!("marked task {task:?} on {date} completed={completed}");
    commit(ctx, state)
}

pub fn toggle_complete_impl(
    ctx: &impl CommandCtx,
    state: &mut AppState,
    date: NaiveDate,
    task: &TaskRef,
) -> CommandResult<ViewPayload> {
    let id = match resolve(state, date, task) {
        Ok(id) => id,
        Err(message) => return rejected(&message),
    };
    let outcome = state.try_update(|store| store.toggle_completed_by_id(id));
    if let Ok(completed) = &outcome {
        log::info!("toggled task {id} on {date} completed={completed}");
    }
    store_outcome(ctx, state, outcome)
}

pub fn promote_task_impl(
    ctx: &impl CommandCtx,
    state: &mut AppState,
    date: NaiveDate,
    task: &TaskRef,
) -> CommandResult<ViewPayload> {
    let delta = state.settings().promote_step;
    let outcome = match task {
        TaskRef::Index(index) => {
            state.try_update(|store| store.promote_priority(date, *index, delta))
        }
        other => match resolve(state, date, other) {
            Ok(id) => state.try_update(|store| store.promote_by_id(id, delta)),
            Err(message) => return rejected(&message),
        },
    };
    if let Ok(priority) = &outcome {
        log::info!("promoted task {task:?} on {date} to priority {priority}");
    }
    store_outcome(ctx, state, outcome)
}

/// Routes one UI event to its command.
pub fn dispatch(
    ctx: &impl CommandCtx,
    state: &mut AppState,
    event: UiEvent,
) -> CommandResult<ViewPayload> {
    match event {
        UiEvent::SelectDate(date) => select_date_impl(ctx, state, Some(date)),
        UiEvent::ClearSelection => select_date_impl(ctx, state, None),
        UiEvent::AddTask { text, date } => add_task_impl(ctx, state, &text, date),
        UiEvent::PlanTask { text, date } => plan_task_impl(ctx, state, &text, date),
        UiEvent::RemoveTask { date, task } => remove_task_impl(ctx, state, date, &task),
        UiEvent::ToggleComplete { date, task } => toggle_complete_impl(ctx, state, date, &task),
        UiEvent::SetCompleted {
            date,
            task,
            completed,
        } => set_completed_impl(ctx, state, date, &task, completed),
        UiEvent::Promote { date, task } => promote_task_impl(ctx, state, date, &task),
    }
}

/// Final write at the end of a session. Only runs when changes never reached disk.
pub fn shutdown_impl(ctx: &impl CommandCtx, state: &mut AppState) -> CommandResult<bool> {
    if !state.is_dirty() {
        return ok(false);
    }
    match persist(ctx, state) {
        Ok(()) => {
            log::info!("saved pending changes on shutdown");
            ok(true)
        }
        Err(error) => {
            log::error!("final save failed, unsaved changes are lost: {error}");
            err(&format!("storage error: {error}"))
        }
    }
}

pub fn update_settings_impl(
    ctx: &impl CommandCtx,
    state: &mut AppState,
    mut settings: Settings,
) -> CommandResult<Settings> {
    settings.data_file = settings.data_file.trim().to_string();
    if !is_valid_data_file(&settings.data_file) {
        return rejected(&format!(
            "data_file must be a plain file name other than {SETTINGS_FILE} (got {:?})",
            settings.data_file
        ));
    }
    if settings.promote_step < 1 {
        return rejected("promote_step must be at least 1");
    }
    if settings.backup_limit < 1 {
        return rejected("backup_limit must be at least 1");
    }

    let previous = state.settings().clone();
    state.update_settings(settings.clone());
    let saved = storage_for(ctx, state.settings())
        .and_then(|storage| storage.save_settings(&state.settings_file()));
    if let Err(error) = saved {
        // Roll back in-memory settings to keep the running session consistent.
        state.update_settings(previous);
        log::error!("saving settings failed: {error}");
        return err(&format!("storage error: {error}"));
    }
    log::info!("settings updated: {settings:?}");
    ok(settings)
}

#[derive(Debug, serde::Serialize)]
pub struct BackupEntry {
    pub name: String,
    pub modified_at: i64,
}

pub fn list_backups_impl(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<Vec<BackupEntry>> {
    let storage = match storage_for(ctx, state.settings()) {
        Ok(storage) => storage,
        Err(e) => return err(&format!("data dir error: {e}")),
    };

    // No backup directory yet means no backups.
    let list = match storage.list_backups() {
        Ok(list) => list,
        Err(StorageError::Io(io)) if io.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(error) => return err(&format!("storage error: {error}")),
    };

    ok(list
        .into_iter()
        .map(|(name, modified_at)| BackupEntry { name, modified_at })
        .collect())
}
