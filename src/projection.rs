//! Display-ready views derived from a [`TaskStore`].
//!
//! Nothing here mutates the store; every call rebuilds its view from scratch.

use chrono::NaiveDate;
use serde::Serialize;

use crate::dates::format_date_key;
use crate::models::TaskId;
use crate::store::TaskStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DisplayTask {
    /// 1-based position in the sorted list.
    pub row: usize,
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
    pub priority: i64,
    pub due_date: NaiveDate,
    pub strikethrough: bool,
    pub dimmed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DisplayDate {
    pub date: NaiveDate,
    pub label: String,
    pub task_count: usize,
    pub is_today: bool,
    pub selected: bool,
}

pub fn project_tasks(store: &TaskStore, date: Option<NaiveDate>) -> Vec<DisplayTask> {
    let Some(date) = date else {
        return Vec::new();
    };
    store
        .tasks_for(date)
        .into_iter()
        .enumerate()
        .map(|(position, task)| DisplayTask {
            row: position + 1,
            id: task.id,
            text: task.text.clone(),
            completed: task.completed,
            priority: task.priority,
            due_date: task.due_date,
            strikethrough: task.completed,
            dimmed: task.completed,
        })
        .collect()
}

/// Ascending date list. `today` is flagged, and listed even without tasks when
/// `include_today` is set. The selected date is always listed.
pub fn project_dates(
    store: &TaskStore,
    today: NaiveDate,
    selected: Option<NaiveDate>,
    include_today: bool,
) -> Vec<DisplayDate> {
    let mut dates = store.all_dates();
    if include_today {
        dates.push(today);
    }
    dates.extend(selected);
    dates.sort();
    dates.dedup();

    dates
        .into_iter()
        .map(|date| DisplayDate {
            date,
            label: format_date_key(date),
            task_count: store.task_count(date),
            is_today: date == today,
            selected: Some(date) == selected,
        })
        .collect()
}

/// Maps a 1-based display row on `date` to the id of the task shown there.
pub fn resolve_row(store: &TaskStore, date: NaiveDate, row: usize) -> Option<TaskId> {
    let position = row.checked_sub(1)?;
    store.tasks_for(date).get(position).map(|task| task.id)
}
