use chrono::NaiveDate;

use crate::models::TaskId;
use crate::projection::{DisplayDate, DisplayTask};

/// How a UI event points at a task on a given date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRef {
    /// 1-based row of the sorted task list as currently displayed.
    Row(usize),
    /// 0-based position in storage (insertion) order.
    Index(usize),
    Id(TaskId),
    /// First task whose text matches exactly.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    SelectDate(NaiveDate),
    ClearSelection,
    AddTask { text: String, date: NaiveDate },
    PlanTask { text: String, date: NaiveDate },
    RemoveTask { date: NaiveDate, task: TaskRef },
    ToggleComplete { date: NaiveDate, task: TaskRef },
    SetCompleted {
        date: NaiveDate,
        task: TaskRef,
        completed: bool,
    },
    Promote { date: NaiveDate, task: TaskRef },
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ViewPayload {
    pub selected: Option<NaiveDate>,
    pub dates: Vec<DisplayDate>,
    pub tasks: Vec<DisplayTask>,
}
