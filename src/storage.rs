use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::models::SettingsFile;
use crate::store::{LoadReport, TaskStore};

pub const SETTINGS_FILE: &str = "settings.json";
const BACKUP_DIR: &str = "backups";

/// The tasks file must sit directly in the data directory and must not
/// shadow the settings file.
pub fn is_valid_data_file(name: &str) -> bool {
    !name.is_empty()
        && name != SETTINGS_FILE
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "io error: {err}"),
            StorageError::Json(err) => write!(f, "json error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::Io(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        StorageError::Json(value)
    }
}

/// Result of reading `tasks.json` from disk.
#[derive(Debug)]
pub enum LoadedTasks {
    /// No file yet.
    Missing,
    Loaded(TaskStore, LoadReport),
    /// The file exists but could not be read as a task document.
    Unreadable(StorageError),
}

pub struct Storage {
    root: PathBuf,
    data_file: String,
    backup_limit: usize,
}

impl Storage {
    pub fn new(root: PathBuf, data_file: impl Into<String>, backup_limit: usize) -> Self {
        Self {
            root,
            data_file: data_file.into(),
            backup_limit,
        }
    }

    pub fn tasks_path(&self) -> PathBuf {
        self.root.join(&self.data_file)
    }

    pub fn ensure_dirs(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.root.join(BACKUP_DIR))?;
        Ok(())
    }

    pub fn load_tasks(&self) -> LoadedTasks {
        let path = self.tasks_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return LoadedTasks::Missing,
            Err(err) => return LoadedTasks::Unreadable(err.into()),
        };
        match TaskStore::deserialize(&bytes) {
            Ok((store, report)) => LoadedTasks::Loaded(store, report),
            Err(err) => LoadedTasks::Unreadable(err),
        }
    }

    pub fn save_tasks(&self, store: &TaskStore) -> Result<(), StorageError> {
        let bytes = store.serialize()?;
        self.write_atomic(self.tasks_path(), &bytes)
    }

    pub fn load_settings(&self) -> Result<SettingsFile, StorageError> {
        self.load_json(self.root.join(SETTINGS_FILE))
    }

    pub fn save_settings(&self, data: &SettingsFile) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(data)?;
        self.write_atomic(self.root.join(SETTINGS_FILE), &bytes)
    }

    fn load_json<T: DeserializeOwned>(&self, path: PathBuf) -> Result<T, StorageError> {
        let mut file = File::open(path)?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        Ok(serde_json::from_str(&buf)?)
    }

    fn write_atomic(&self, path: PathBuf, bytes: &[u8]) -> Result<(), StorageError> {
        let temp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        if let Err(err) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        Ok(())
    }

    /// Copies the current tasks file into `backups/` and returns the copy's path.
    pub fn create_backup(&self) -> Result<PathBuf, StorageError> {
        self.ensure_dirs()?;
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let backup_path = self.unique_backup_path(&timestamp);
        fs::copy(self.tasks_path(), &backup_path)?;
        self.trim_backups()?;
        Ok(backup_path)
    }

    pub fn list_backups(&self) -> Result<Vec<(String, i64)>, StorageError> {
        let mut entries: Vec<_> = fs::read_dir(self.root.join(BACKUP_DIR))?
            .filter_map(|entry| entry.ok())
            .collect();
        entries.sort_by_key(|entry| entry.file_name());
        let mut results = Vec::new();
        for entry in entries {
            if let Some(name) = entry.file_name().to_str() {
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|dur| dur.as_secs() as i64)
                    .unwrap_or(0);
                results.push((name.to_string(), modified));
            }
        }
        Ok(results)
    }

    fn unique_backup_path(&self, timestamp: &str) -> PathBuf {
        let dir = self.root.join(BACKUP_DIR);
        let mut n = 0;
        loop {
            let candidate = dir.join(format!("tasks-{timestamp}-{n:03}.json"));
            if !candidate.exists() {
                return candidate;
            }
            n += 1;
        }
    }

    fn trim_backups(&self) -> Result<(), StorageError> {
        let mut entries: Vec<_> = fs::read_dir(self.root.join(BACKUP_DIR))?
            .filter_map(|entry| entry.ok())
            .collect();
        // Names embed the timestamp, so name order is age order.
        entries.sort_by_key(|entry| entry.file_name());
        let to_remove = entries.len().saturating_sub(self.backup_limit);
        for entry in entries.into_iter().take(to_remove) {
            let _ = fs::remove_file(entry.path());
        }
        Ok(())
    }
}
