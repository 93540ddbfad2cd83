use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Transferring,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl UploadStatus {
    /// True once no further transfer will run without a user action.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadStatus::Completed | UploadStatus::Failed | UploadStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Transferring => "transferring",
            UploadStatus::Paused => "paused",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
            UploadStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadItemInfo {
    pub id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub status: UploadStatus,
    pub percent: f64,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result_location: Option<String>,
    pub preview: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadItemProgress {
    pub id: Uuid,
    pub name: String,
    pub percent: f64,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    /// `true` when the percentage came from the backend rather than the simulator.
    pub authoritative: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchFinished {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

pub trait EventEmitter: Send + Sync + 'static {
    fn emit_queue_state(&self, items: &[UploadItemInfo]);
    fn emit_progress(&self, progress: &UploadItemProgress);
    fn emit_batch_finished(&self, summary: &BatchFinished);
}
