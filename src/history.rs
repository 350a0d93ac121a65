use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::token::{Token, TokenSource};

/// Audit record for one processed token or playlist launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Assigned by the store on append; 0 until then.
    #[serde(default)]
    pub id: u64,
    pub time: DateTime<Utc>,
    pub source: TokenSource,
    pub uid: String,
    pub text: String,
    /// Resolved script text. `None` when dispatch never ran.
    pub script: Option<String>,
    pub success: bool,
}

impl HistoryEntry {
    /// An unsuccessful, unscripted record for `token`, to be completed once
    /// dispatch finishes.
    pub fn pending(token: &Token) -> Self {
        HistoryEntry {
            id: 0,
            time: token.scan_time.unwrap_or_else(Utc::now),
            source: token.source,
            uid: token.uid.clone(),
            text: token.text.clone(),
            script: None,
            success: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("history encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only store for history records.
pub trait HistoryStore: Send + Sync {
    /// Persist `entry`, returning it with its assigned id.
    fn append(&self, entry: HistoryEntry) -> Result<HistoryEntry, HistoryError>;

    /// Up to `limit` most recent entries, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError>;
}

// ── JSON lines file ───────────────────────────────────────────────────────────

struct Writer {
    file: File,
    next_id: u64,
}

/// History kept as one JSON object per line.
pub struct JsonlHistory {
    path: PathBuf,
    writer: Mutex<Writer>,
}

impl JsonlHistory {
    /// Open (or create) the history file and recover the next id.
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let last_id = read_entries(path)?.last().map(|e| e.id).unwrap_or(0);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!("history opened at {} (last id {})", path.display(), last_id);
        Ok(JsonlHistory {
            path: path.to_owned(),
            writer: Mutex::new(Writer {
                file,
                next_id: last_id + 1,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read all parseable entries. Corrupt lines are skipped with a warning.
fn read_entries(path: &Path) -> Result<Vec<HistoryEntry>, HistoryError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut entries = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryEntry>(&line) {
            Ok(e) => entries.push(e),
            Err(e) => tracing::warn!("skipping history line {}: {}", n + 1, e),
        }
    }
    Ok(entries)
}

impl HistoryStore for JsonlHistory {
    fn append(&self, mut entry: HistoryEntry) -> Result<HistoryEntry, HistoryError> {
        let mut writer = self.writer.lock();
        entry.id = writer.next_id;
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        writer.file.write_all(line.as_bytes())?;
        writer.file.flush()?;
        writer.next_id += 1;
        Ok(entry)
    }

    fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        // Hold the writer lock so a concurrent append is never half-read.
        let _writer = self.writer.lock();
        let entries = read_entries(&self.path)?;
        Ok(entries.into_iter().rev().take(limit).collect())
    }
}

// ── In memory ─────────────────────────────────────────────────────────────────

/// Process-local history, for embedding and tests.
#[derive(Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in append order.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }
}

impl HistoryStore for MemoryHistory {
    fn append(&self, mut entry: HistoryEntry) -> Result<HistoryEntry, HistoryError> {
        let mut entries = self.entries.lock();
        entry.id = entries.len() as u64 + 1;
        entries.push(entry.clone());
        Ok(entry)
    }

    fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>, HistoryError> {
        Ok(self.entries.lock().iter().rev().take(limit).cloned().collect())
    }
}
