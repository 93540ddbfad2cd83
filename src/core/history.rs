use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uplift_core::core::events::UploadItemInfo;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: u64,
    pub record_id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub location: String,
    pub uploaded_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
}

/// A completed upload on its way into the store; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub record_id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub location: String,
    pub uploaded_at: DateTime<Utc>,
    pub duration_ms: Option<u64>,
}

impl NewHistoryEntry {
    /// `None` unless the item completed with a location.
    pub fn from_info(info: &UploadItemInfo) -> Option<Self> {
        let location = info.result_location.clone()?;
        let uploaded_at = info.finished_at.unwrap_or_else(Utc::now);
        let duration_ms = info
            .started_at
            .map(|s| (uploaded_at - s).num_milliseconds().max(0) as u64);
        Some(Self {
            record_id: info.id,
            name: info.name.clone(),
            size_bytes: info.size_bytes,
            mime_type: info.mime_type.clone(),
            location,
            uploaded_at,
            duration_ms,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct HistoryStats {
    pub total: usize,
    pub total_bytes: u64,
    pub average_duration_ms: Option<u64>,
    pub last_upload_at: Option<DateTime<Utc>>,
}

impl HistoryStats {
    pub fn from_entries(entries: &[HistoryEntry]) -> Self {
        let durations: Vec<u64> = entries.iter().filter_map(|e| e.duration_ms).collect();
        Self {
            total: entries.len(),
            total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            average_duration_ms: if durations.is_empty() {
                None
            } else {
                Some(durations.iter().sum::<u64>() / durations.len() as u64)
            },
            last_upload_at: entries.iter().map(|e| e.uploaded_at).max(),
        }
    }
}

/// Lifetime record of completed uploads. Lives independently of the queue.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Records a completed upload. Appending a `record_id` that is already
    /// stored returns the existing entry unchanged.
    async fn append(&self, entry: NewHistoryEntry) -> anyhow::Result<HistoryEntry>;
    async fn contains(&self, record_id: Uuid) -> anyhow::Result<bool>;
    async fn list(&self) -> anyhow::Result<Vec<HistoryEntry>>;
    async fn remove(&self, id: u64) -> anyhow::Result<HistoryEntry>;
    async fn clear(&self) -> anyhow::Result<()>;

    async fn stats(&self) -> anyhow::Result<HistoryStats> {
        let entries = self.list().await?;
        Ok(HistoryStats::from_entries(&entries))
    }
}

/// In-memory history, optionally mirrored to a JSON-lines log.
pub struct MemoryHistory {
    entries: Mutex<Vec<HistoryEntry>>,
    log_path: Option<PathBuf>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            log_path: None,
        }
    }

    /// Opens a log-backed history, replaying any entries already on disk.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let mut entries = Vec::new();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                for (n, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<HistoryEntry>(line) {
                        Ok(entry) => entries.push(entry),
                        Err(e) => tracing::warn!(
                            "Skipping malformed history line {} in {}: {}",
                            n + 1,
                            path.display(),
                            e
                        ),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::debug!("Loaded {} history entries from {}", entries.len(), path.display());
        Ok(Self {
            entries: Mutex::new(entries),
            log_path: Some(path.to_path_buf()),
        })
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Vec<HistoryEntry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("history lock poisoned"))
    }

    async fn append_log(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
        let Some(path) = &self.log_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn rewrite_log(&self, entries: &[HistoryEntry]) -> anyhow::Result<()> {
        let Some(path) = &self.log_path else {
            return Ok(());
        };
        let mut content = String::new();
        for entry in entries {
            content.push_str(&serde_json::to_string(entry)?);
            content.push('\n');
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, entry: NewHistoryEntry) -> anyhow::Result<HistoryEntry> {
        let stored = {
            let mut entries = self.lock()?;
            if let Some(existing) = entries.iter().find(|e| e.record_id == entry.record_id) {
                return Ok(existing.clone());
            }
            let next_id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
            let stored = HistoryEntry {
                id: next_id,
                record_id: entry.record_id,
                name: entry.name,
                size_bytes: entry.size_bytes,
                mime_type: entry.mime_type,
                location: entry.location,
                uploaded_at: entry.uploaded_at,
                duration_ms: entry.duration_ms,
            };
            entries.push(stored.clone());
            stored
        };

        if let Err(e) = self.append_log(&stored).await {
            tracing::warn!("History log write failed for '{}': {}", stored.name, e);
        }
        Ok(stored)
    }

    async fn contains(&self, record_id: Uuid) -> anyhow::Result<bool> {
        Ok(self.lock()?.iter().any(|e| e.record_id == record_id))
    }

    async fn list(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        Ok(self.lock()?.clone())
    }

    async fn remove(&self, id: u64) -> anyhow::Result<HistoryEntry> {
        let (removed, remaining) = {
            let mut entries = self.lock()?;
            let pos = entries
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| anyhow!("Upload not found"))?;
            let removed = entries.remove(pos);
            (removed, entries.clone())
        };
        self.rewrite_log(&remaining).await?;
        Ok(removed)
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.lock()?.clear();
        self.rewrite_log(&[]).await
    }
}
