use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde_json::Value;
use uuid::Uuid;

use crate::dates::{format_date_key, parse_date_key, parse_due_date, KeyFormat};
use crate::models::{Task, TaskId, TaskRecord};
use crate::storage::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    IndexOutOfRange {
        date: NaiveDate,
        index: usize,
        len: usize,
    },
    TaskNotFound(TaskId),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::IndexOutOfRange { date, index, len } => {
                write!(f, "index {index} out of range for {date} ({len} tasks)")
            }
            StoreError::TaskNotFound(id) => write!(f, "task {id} not found"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub skipped_keys: Vec<String>,
    pub skipped_records: usize,
    pub legacy_keys: usize,
    pub regenerated_ids: usize,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.skipped_keys.is_empty() && self.skipped_records == 0 && self.legacy_keys == 0
    }
}

/// Index-based operations address insertion order; only [`TaskStore::tasks_for`] sorts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStore {
    tasks: BTreeMap<NaiveDate, Vec<Task>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(
        &mut self,
        text: impl Into<String>,
        date: NaiveDate,
        completed: bool,
        priority: i64,
    ) -> TaskId {
        let task = Task::new(text, date, completed, priority);
        let id = task.id;
        self.tasks.entry(date).or_default().push(task);
        id
    }

    pub fn remove_task(&mut self, date: NaiveDate, index: usize) -> Result<Task, StoreError> {
        let tasks = self.slot_mut(date, index)?;
        Ok(tasks.remove(index))
    }

    pub fn set_completed(
        &mut self,
        date: NaiveDate,
        index: usize,
        completed: bool,
    ) -> Result<(), StoreError> {
        let tasks = self.slot_mut(date, index)?;
        tasks[index].completed = completed;
        Ok(())
    }

    /// First match in storage order wins.
    pub fn set_completed_by_text(&mut self, date: NaiveDate, text: &str, completed: bool) -> bool {
        let Some(task) = self
            .tasks
            .get_mut(&date)
            .and_then(|tasks| tasks.iter_mut().find(|task| task.text == text))
        else {
            return false;
        };
        task.completed = completed;
        true
    }

    pub fn promote_priority(
        &mut self,
        date: NaiveDate,
        index: usize,
        delta: i64,
    ) -> Result<i64, StoreError> {
        let tasks = self.slot_mut(date, index)?;
        let task = &mut tasks[index];
        task.priority = task.priority.saturating_add(delta);
        Ok(task.priority)
    }

    /// Tasks of `date` by descending priority; equal priorities keep storage order.
    pub fn tasks_for(&self, date: NaiveDate) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .get(&date)
            .map(|tasks| tasks.iter().collect())
            .unwrap_or_default();
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority));
        tasks
    }

    pub fn all_dates(&self) -> Vec<NaiveDate> {
        self.tasks
            .iter()
            .filter(|(_, tasks)| !tasks.is_empty())
            .map(|(date, _)| *date)
            .collect()
    }

    pub fn find(&self, id: TaskId) -> Option<&Task> {
        self.tasks.values().flatten().find(|task| task.id == id)
    }

    pub fn get(&self, date: NaiveDate, index: usize) -> Option<&Task> {
        self.tasks.get(&date)?.get(index)
    }

    pub fn find_by_text(&self, date: NaiveDate, text: &str) -> Option<&Task> {
        self.tasks.get(&date)?.iter().find(|task| task.text == text)
    }

    pub fn remove_by_id(&mut self, id: TaskId) -> Result<Task, StoreError> {
        for tasks in self.tasks.values_mut() {
            if let Some(position) = tasks.iter().position(|task| task.id == id) {
                return Ok(tasks.remove(position));
            }
        }
        Err(StoreError::TaskNotFound(id))
    }

    pub fn set_completed_by_id(&mut self, id: TaskId, completed: bool) -> Result<(), StoreError> {
        self.find_mut(id)?.completed = completed;
        Ok(())
    }

    pub fn toggle_completed_by_id(&mut self, id: TaskId) -> Result<bool, StoreError> {
        let task = self.find_mut(id)?;
        task.completed = !task.completed;
        Ok(task.completed)
    }

    pub fn promote_by_id(&mut self, id: TaskId, delta: i64) -> Result<i64, StoreError> {
        let task = self.find_mut(id)?;
        task.priority = task.priority.saturating_add(delta);
        Ok(task.priority)
    }

    pub fn task_count(&self, date: NaiveDate) -> usize {
        self.tasks.get(&date).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn serialize(&self) -> Result<Vec<u8>, StorageError> {
        let root: BTreeMap<String, Vec<TaskRecord>> = self
            .tasks
            .iter()
            .filter(|(_, tasks)| !tasks.is_empty())
            .map(|(date, tasks)| {
                let records = tasks.iter().map(record_from_task).collect();
                (format_date_key(*date), records)
            })
            .collect();
        Ok(serde_json::to_vec_pretty(&root)?)
    }

    /// Only a document that is not a JSON object fails as a whole.
    pub fn deserialize(bytes: &[u8]) -> Result<(Self, LoadReport), StorageError> {
        let root: serde_json::Map<String, Value> = serde_json::from_slice(bytes)?;
        let mut store = Self::new();
        let mut report = LoadReport::default();
        let mut seen_ids = HashSet::new();

        for (key, value) in root {
            let Some((date, format)) = parse_date_key(&key) else {
                log::warn!("skipping tasks under unparseable date key {key:?}");
                report.skipped_keys.push(key);
                continue;
            };
            if format == KeyFormat::Legacy {
                report.legacy_keys += 1;
            }
            let Value::Array(items) = value else {
                log::warn!("skipping date key {key:?}: value is not an array");
                report.skipped_keys.push(key);
                continue;
            };

            let tasks = store.tasks.entry(date).or_default();
            for (position, item) in items.into_iter().enumerate() {
                let record = match serde_json::from_value::<TaskRecord>(item) {
                    Ok(record) => record,
                    Err(error) => {
                        log::warn!("skipping task #{position} under {key:?}: {error}");
                        report.skipped_records += 1;
                        continue;
                    }
                };
                let mut task = task_from_record(record, date);
                if !seen_ids.insert(task.id) {
                    task.id = Uuid::new_v4();
                    seen_ids.insert(task.id);
                    report.regenerated_ids += 1;
                }
                tasks.push(task);
            }
        }

        Ok((store, report))
    }

    fn find_mut(&mut self, id: TaskId) -> Result<&mut Task, StoreError> {
        self.tasks
            .values_mut()
            .flatten()
            .find(|task| task.id == id)
            .ok_or(StoreError::TaskNotFound(id))
    }

    fn slot_mut(&mut self, date: NaiveDate, index: usize) -> Result<&mut Vec<Task>, StoreError> {
        match self.tasks.get_mut(&date) {
            Some(tasks) if index < tasks.len() => Ok(tasks),
            other => Err(StoreError::IndexOutOfRange {
                date,
                index,
                len: other.map_or(0, |tasks| tasks.len()),
            }),
        }
    }
}

fn record_from_task(task: &Task) -> TaskRecord {
    TaskRecord {
        id: Some(Value::String(task.id.to_string())),
        text: task.text.clone(),
        completed: task.completed,
        priority: task.priority,
        due_date: Some(Value::String(format_date_key(task.due_date))),
    }
}

fn task_from_record(record: TaskRecord, key_date: NaiveDate) -> Task {
    let id = record
        .id
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .unwrap_or_else(Uuid::new_v4);
    let due_date = record
        .due_date
        .as_ref()
        .and_then(Value::as_str)
        .and_then(parse_due_date)
        .unwrap_or(key_date);
    Task {
        id,
        text: record.text,
        completed: record.completed,
        priority: record.priority,
        due_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn texts(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|task| task.text.clone()).collect()
    }

    #[test]
    fn tasks_for_orders_by_descending_priority() {
        let day = date(2024, 6, 1);
        let mut store = TaskStore::new();
        store.add_task("Buy milk", day, false, 0);
        store.add_task("Call dentist", day, false, 5);

        assert_eq!(texts(&store.tasks_for(day)), vec!["Call dentist", "Buy milk"]);
    }

    #[test]
    fn tasks_for_keeps_insertion_order_for_equal_priorities() {
        let day = date(2024, 6, 1);
        let mut store = TaskStore::new();
        store.add_task("a", day, false, 1);
        store.add_task("b", day, false, 3);
        store.add_task("c", day, false, 1);
        store.add_task("d", day, false, 3);
        store.add_task("e", day, false, 1);

        assert_eq!(texts(&store.tasks_for(day)), vec!["b", "d", "a", "c", "e"]);
        assert!(store.tasks_for(date(2024, 6, 2)).is_empty());
    }

    #[test]
    fn add_creates_the_date_key_and_allows_duplicates() {
        let day = date(2024, 6, 1);
        let mut store = TaskStore::new();
        assert!(store.all_dates().is_empty());

        let first = store.add_task("same", day, false, 0);
        let second = store.add_task("same", day, false, 0);
        assert_ne!(first, second);
        assert_eq!(store.task_count(day), 2);
        assert_eq!(store.all_dates(), vec![day]);
        assert_eq!(store.find(first).map(|t| t.due_date), Some(day));
    }

    #[test]
    fn remove_out_of_range_leaves_store_unchanged() {
        let day = date(2024, 6, 1);
        let mut store = TaskStore::new();
        store.add_task("one", day, false, 0);
        store.add_task("two", day, false, 0);
        let before = store.clone();

        assert_eq!(
            store.remove_task(day, 5),
            Err(StoreError::IndexOutOfRange {
                date: day,
                index: 5,
                len: 2
            })
        );
        assert_eq!(store, before);

        assert!(store.remove_task(date(2030, 1, 1), 0).is_err());
        assert_eq!(store, before);

        let removed = store.remove_task(day, 0).unwrap();
        assert_eq!(removed.text, "one");
        assert_eq!(texts(&store.tasks_for(day)), vec!["two"]);
    }

    #[test]
    fn emptied_dates_drop_out_of_the_date_list() {
        let first = date(2024, 6, 2);
        let second = date(2024, 6, 1);
        let mut store = TaskStore::new();
        store.add_task("x", first, false, 0);
        store.add_task("y", second, false, 0);
        assert_eq!(store.all_dates(), vec![second, first]);

        store.remove_task(first, 0).unwrap();
        assert_eq!(store.all_dates(), vec![second]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn tasks_never_appear_unless_added_and_not_removed() {
        let day = date(2024, 6, 1);
        let mut store = TaskStore::new();
        let mut live = Vec::new();
        for n in 0..8 {
            let id = store.add_task(format!("t{n}"), day, false, n % 3);
            live.push(id);
            if n % 3 == 2 {
                let victim = live.remove(0);
                store.remove_by_id(victim).unwrap();
            }
        }
        let listed: HashSet<TaskId> = store.tasks_for(day).iter().map(|t| t.id).collect();
        let expected: HashSet<TaskId> = live.into_iter().collect();
        assert_eq!(listed, expected);
    }

    #[test]
    fn completion_by_index_and_by_text() {
        let day = date(2024, 6, 1);
        let mut store = TaskStore::new();
        store.add_task("dup", day, false, 0);
        store.add_task("dup", day, false, 9);

        // Text lookup hits the first match in storage order.
        assert!(store.set_completed_by_text(day, "dup", true));
        let stored: Vec<bool> = store.tasks[&day].iter().map(|t| t.completed).collect();
        assert_eq!(stored, vec![true, false]);

        assert_eq!(store.find_by_text(day, "dup").map(|t| t.priority), Some(0));
        assert!(!store.set_completed_by_text(day, "missing", true));
        assert!(!store.set_completed_by_text(date(2024, 1, 1), "dup", true));

        store.set_completed(day, 1, true).unwrap();
        assert_eq!(store.get(day, 1).map(|t| t.completed), Some(true));
        assert!(store.get(day, 2).is_none());
        assert!(store.set_completed(day, 2, true).is_err());
    }

    #[test]
    fn promoting_twice_by_two_equals_once_by_four() {
        let day = date(2024, 6, 1);
        let mut base = TaskStore::new();
        base.add_task("a", day, false, 1);
        base.add_task("b", day, false, 3);

        let mut twice = base.clone();
        twice.promote_priority(day, 0, 2).unwrap();
        twice.promote_priority(day, 0, 2).unwrap();

        let mut once = base.clone();
        assert_eq!(once.promote_priority(day, 0, 4), Ok(5));

        assert_eq!(twice, once);
        assert_eq!(texts(&once.tasks_for(day)), vec!["a", "b"]);
    }

    #[test]
    fn promotion_saturates_instead_of_overflowing() {
        let day = date(2024, 6, 1);
        let mut store = TaskStore::new();
        let id = store.add_task("a", day, false, i64::MAX - 1);
        assert_eq!(store.promote_by_id(id, 2), Ok(i64::MAX));
    }

    #[test]
    fn id_operations_report_unknown_ids() {
        let day = date(2024, 6, 1);
        let mut store = TaskStore::new();
        let id = store.add_task("a", day, false, 0);
        let unknown = Uuid::new_v4();

        assert_eq!(store.toggle_completed_by_id(id), Ok(true));
        assert_eq!(store.toggle_completed_by_id(id), Ok(false));
        store.set_completed_by_id(id, true).unwrap();
        assert!(store.find(id).unwrap().completed);

        assert_eq!(
            store.toggle_completed_by_id(unknown),
            Err(StoreError::TaskNotFound(unknown))
        );
        assert!(store.promote_by_id(unknown, 2).is_err());
        assert!(store.remove_by_id(unknown).is_err());
        assert_eq!(store.remove_by_id(id).map(|t| t.text), Ok("a".to_string()));
        assert!(store.is_empty());
    }

    #[test]
    fn serialize_round_trips_every_field() {
        let mut store = TaskStore::new();
        store.add_task("Buy milk", date(2024, 6, 1), false, 0);
        store.add_task("Call dentist", date(2024, 6, 1), true, 5);
        store.add_task("Pay rent", date(2024, 7, 1), false, -3);

        let bytes = store.serialize().unwrap();
        let (loaded, report) = TaskStore::deserialize(&bytes).unwrap();

        assert!(report.is_clean());
        assert_eq!(loaded, store);
    }

    #[test]
    fn completed_flag_is_written_to_json() {
        let day = date(2024, 6, 1);
        let mut store = TaskStore::new();
        store.add_task("Buy milk", day, false, 0);
        store.add_task("Call dentist", day, false, 5);
        store.set_completed(day, 0, true).unwrap();

        let value: Value = serde_json::from_slice(&store.serialize().unwrap()).unwrap();
        let entries = value["2024-06-01"].as_array().unwrap();
        let milk = entries.iter().find(|e| e["text"] == "Buy milk").unwrap();
        assert_eq!(milk["completed"], Value::Bool(true));
        assert_eq!(milk["dueDate"], "2024-06-01");
    }

    #[test]
    fn empty_dates_are_not_serialized() {
        let day = date(2024, 6, 1);
        let mut store = TaskStore::new();
        store.add_task("gone", day, false, 0);
        store.remove_task(day, 0).unwrap();

        let value: Value = serde_json::from_slice(&store.serialize().unwrap()).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn deserialize_skips_invalid_date_keys() {
        let json = r#"{
          "31.02.2024": [ { "text": "ghost", "completed": false, "priority": 0 } ],
          "2024-06-01": [ { "text": "Buy milk", "completed": false, "priority": 1, "dueDate": "2024-06-01" } ]
        }"#;

        let (store, report) = TaskStore::deserialize(json.as_bytes()).unwrap();
        assert_eq!(report.skipped_keys, vec!["31.02.2024".to_string()]);
        assert_eq!(store.all_dates(), vec![date(2024, 6, 1)]);
        assert_eq!(texts(&store.tasks_for(date(2024, 6, 1))), vec!["Buy milk"]);
    }

    #[test]
    fn deserialize_defaults_due_date_to_key_date() {
        let json = r#"{
          "2024-06-01": [
            { "text": "missing" },
            { "text": "broken", "dueDate": "not a date" },
            { "text": "explicit", "dueDate": "2024-06-10" }
          ]
        }"#;

        let (store, _) = TaskStore::deserialize(json.as_bytes()).unwrap();
        let due: Vec<NaiveDate> = store.tasks[&date(2024, 6, 1)]
            .iter()
            .map(|t| t.due_date)
            .collect();
        assert_eq!(
            due,
            vec![date(2024, 6, 1), date(2024, 6, 1), date(2024, 6, 10)]
        );
    }

    #[test]
    fn deserialize_keeps_tasks_with_non_string_due_dates_and_ids() {
        let json = r#"{
          "2024-06-01": [
            { "text": "numeric due", "dueDate": 20240601 },
            { "text": "object due", "dueDate": { "day": 1 }, "id": 42 }
          ]
        }"#;

        let (store, report) = TaskStore::deserialize(json.as_bytes()).unwrap();
        assert_eq!(report.skipped_records, 0);
        assert_eq!(store.len(), 2);
        let due: Vec<NaiveDate> = store.tasks[&date(2024, 6, 1)]
            .iter()
            .map(|t| t.due_date)
            .collect();
        assert_eq!(due, vec![date(2024, 6, 1), date(2024, 6, 1)]);
    }

    #[test]
    fn deserialize_reads_legacy_keys_and_merges_same_day() {
        let json = r#"{
          "01.06.2024": [ { "text": "old", "completed": true, "priority": 2 } ],
          "2024-06-01": [ { "text": "new" } ]
        }"#;

        let (store, report) = TaskStore::deserialize(json.as_bytes()).unwrap();
        assert_eq!(report.legacy_keys, 1);
        assert!(!report.is_clean());
        assert_eq!(texts(&store.tasks_for(date(2024, 6, 1))), vec!["old", "new"]);

        let value: Value = serde_json::from_slice(&store.serialize().unwrap()).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["2024-06-01"]);
    }

    #[test]
    fn deserialize_skips_malformed_records_and_non_array_values() {
        let json = r#"{
          "2024-06-01": [ "just a string", { "text": "ok" }, { "text": "bad", "priority": "high" }, null ],
          "2024-06-02": { "text": "not an array" }
        }"#;

        let (store, report) = TaskStore::deserialize(json.as_bytes()).unwrap();
        assert_eq!(report.skipped_records, 3);
        assert_eq!(report.skipped_keys, vec!["2024-06-02".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn deserialize_keeps_ids_and_replaces_duplicates() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{ "2024-06-01": [ {{ "id": "{id}", "text": "a" }}, {{ "id": "{id}", "text": "b" }}, {{ "id": "nope", "text": "c" }} ] }}"#
        );

        let (store, report) = TaskStore::deserialize(json.as_bytes()).unwrap();
        assert_eq!(report.regenerated_ids, 1);
        assert_eq!(store.find(id).map(|t| t.text.as_str()), Some("a"));
        let ids: HashSet<TaskId> = store.tasks_for(date(2024, 6, 1)).iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn deserialize_rejects_documents_that_are_not_objects() {
        assert!(matches!(
            TaskStore::deserialize(b"[1, 2, 3]"),
            Err(StorageError::Json(_))
        ));
        assert!(TaskStore::deserialize(b"{ truncated").is_err());
    }
}
