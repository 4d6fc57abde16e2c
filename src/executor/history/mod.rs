use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_ENTRIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_prompt: String,
    pub command: String,
    pub success: bool,
    pub output: Option<String>,
    pub error: Option<String>,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn success(user_prompt: &str, command: &str, output: String) -> Self {
        Self {
            user_prompt: user_prompt.to_string(),
            command: command.to_string(),
            success: true,
            output: Some(output),
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failure(user_prompt: &str, command: &str, error: String) -> Self {
        Self {
            user_prompt: user_prompt.to_string(),
            command: command.to_string(),
            success: false,
            output: None,
            error: Some(error),
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
pub enum HistoryError {
    Io(io::Error),
    Format(serde_json::Error),
    NoStoragePath,
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "History file error: {}", e),
            Self::Format(e) => write!(f, "History file is not valid JSON: {}", e),
            Self::NoStoragePath => write!(f, "History persistence is disabled"),
        }
    }
}

impl std::error::Error for HistoryError {}

impl From<io::Error> for HistoryError {
    fn from(error: io::Error) -> Self {
        HistoryError::Io(error)
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(error: serde_json::Error) -> Self {
        HistoryError::Format(error)
    }
}

/// Bounded, insertion-ordered log of past turns. The oldest entry is
/// evicted once `max_entries` is exceeded.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
    storage_path: Option<PathBuf>,
}

impl CommandHistory {
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: VecDeque::with_capacity(max_entries + 1),
            max_entries,
            storage_path: None,
        }
    }

    pub fn with_storage(max_entries: usize, path: impl Into<PathBuf>) -> Self {
        let mut history = Self::new(max_entries);
        history.storage_path = Some(path.into());
        history
    }

    /// Reads a persisted history. A missing file yields an empty store;
    /// any other failure is returned.
    pub fn load(path: &Path, max_entries: usize) -> Result<Self, HistoryError> {
        let mut history = Self::with_storage(max_entries, path);
        if !path.exists() {
            return Ok(history);
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(history);
        }

        let entries: Vec<HistoryEntry> = serde_json::from_str(&content)?;
        for entry in entries {
            history.append(entry);
        }
        Ok(history)
    }

    pub fn load_or_empty(path: &Path, max_entries: usize) -> Self {
        match Self::load(path, max_entries) {
            Ok(history) => {
                tracing::debug!(
                    path = %path.display(),
                    entries = history.len(),
                    "loaded command history"
                );
                history
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "could not load command history, starting empty"
                );
                Self::with_storage(max_entries, path)
            }
        }
    }

    /// Writes the full sequence to the storage path. The in-memory state is
    /// untouched whether or not the write succeeds.
    pub fn persist(&self) -> Result<(), HistoryError> {
        let path = self
            .storage_path
            .as_ref()
            .ok_or(HistoryError::NoStoragePath)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entries: Vec<&HistoryEntry> = self.entries.iter().collect();
        let json = serde_json::to_string_pretty(&entries)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Appends an entry, evicting the oldest ones past capacity. Entries
    /// without a prompt or command are not recorded.
    pub fn append(&mut self, entry: HistoryEntry) -> bool {
        if entry.user_prompt.trim().is_empty() || entry.command.trim().is_empty() {
            return false;
        }

        self.entries.push_back(entry);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
        true
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &HistoryEntry> + '_ {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.storage_path.is_some()
    }
}
