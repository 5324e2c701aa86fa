use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub type TaskId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
    pub priority: i64,
    pub due_date: NaiveDate,
}

impl Task {
    pub fn new(text: impl Into<String>, due_date: NaiveDate, completed: bool, priority: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            completed,
            priority,
            due_date,
        }
    }
}

/// On-disk shape of one task inside `tasks.json`.
///
/// Every field is optional on read. `id` and `dueDate` stay untyped so a bad
/// value costs only that field, not the record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(rename = "dueDate", default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default = "default_data_file")]
    pub data_file: String,
    #[serde(default = "default_promote_step")]
    pub promote_step: i64,
    #[serde(default = "default_always_show_today")]
    pub always_show_today: bool,
    #[serde(default = "default_backup_limit")]
    pub backup_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            promote_step: default_promote_step(),
            always_show_today: default_always_show_today(),
            backup_limit: default_backup_limit(),
        }
    }
}

fn default_data_file() -> String {
    "tasks.json".to_string()
}

fn default_promote_step() -> i64 {
    2
}

fn default_always_show_today() -> bool {
    true
}

fn default_backup_limit() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettingsFile {
    pub schema_version: u32,
    pub settings: Settings,
}
