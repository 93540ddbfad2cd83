use uplift_core::core::events::{
    BatchFinished, EventEmitter, UploadItemInfo, UploadItemProgress, UploadStatus,
};

/// Emits queue events as `tracing` records for headless use.
#[derive(Clone, Default)]
pub struct LogEventEmitter;

impl LogEventEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl EventEmitter for LogEventEmitter {
    fn emit_queue_state(&self, items: &[UploadItemInfo]) {
        let active = items
            .iter()
            .filter(|i| i.status == UploadStatus::Transferring)
            .count();
        tracing::debug!(target: "uplift::events", "queue-state-update: {} items, {} active", items.len(), active);
    }

    fn emit_progress(&self, progress: &UploadItemProgress) {
        tracing::debug!(
            target: "uplift::events",
            "upload-progress: '{}' {:.1}% ({}/{} bytes)",
            progress.name,
            progress.percent,
            progress.uploaded_bytes,
            progress.total_bytes
        );
    }

    fn emit_batch_finished(&self, summary: &BatchFinished) {
        tracing::info!(
            target: "uplift::events",
            "batch-finished: {} completed, {} failed, {} cancelled",
            summary.completed,
            summary.failed,
            summary.cancelled
        );
    }
}

/// Drops every event.
#[derive(Clone, Default)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit_queue_state(&self, _items: &[UploadItemInfo]) {}
    fn emit_progress(&self, _progress: &UploadItemProgress) {}
    fn emit_batch_finished(&self, _summary: &BatchFinished) {}
}
