use std::path::PathBuf;

use uplift_core::core::events::UploadItemInfo;
use uuid::Uuid;

use crate::core::bulk::{BulkAction, BulkReport, Selection};
use crate::core::error::ValidationError;
use crate::core::history::{HistoryEntry, HistoryStats};
use crate::core::lifecycle::ActionOutcome;
use crate::core::orchestrator::{BatchStart, ClearReport, EnqueueReport, Rejection};
use crate::core::progress::BatchSnapshot;
use crate::core::validation::{CandidateFile, ValidationRules};
use crate::storage::config;
use crate::AppState;

fn parse_id(id: &str) -> Result<Uuid, String> {
    Uuid::parse_str(id.trim()).map_err(|_| format!("Invalid upload id: {}", id))
}

async fn current_rules(state: &AppState) -> ValidationRules {
    let settings = state.settings.lock().await;
    ValidationRules::from_settings(&settings.upload)
}

pub async fn add_files(
    state: &AppState,
    files: Vec<CandidateFile>,
) -> Result<EnqueueReport, String> {
    let rules = current_rules(state).await;
    Ok(state.orchestrator.enqueue(files, &rules).await)
}

/// Stats each local path and enqueues the readable ones. Paths that cannot be
/// read are reported as rejections alongside validation failures.
pub async fn add_paths(state: &AppState, paths: Vec<PathBuf>) -> Result<EnqueueReport, String> {
    let mut candidates = Vec::with_capacity(paths.len());
    let mut unreadable = Vec::new();

    for path in paths {
        match CandidateFile::from_path(&path).await {
            Ok(file) => candidates.push(file),
            Err(e) => {
                tracing::warn!("Cannot read '{}': {}", path.display(), e);
                let error = ValidationError::Unreadable(e.to_string());
                unreadable.push(Rejection {
                    name: path.display().to_string(),
                    reason: error.to_string(),
                    error,
                });
            }
        }
    }

    let mut report = add_files(state, candidates).await?;
    unreadable.extend(report.rejected);
    report.rejected = unreadable;
    Ok(report)
}

pub async fn start_upload(state: &AppState) -> Result<BatchStart, String> {
    let limit = state.settings.lock().await.upload.max_concurrent_uploads;
    Ok(state.orchestrator.start_batch(limit).await)
}

pub async fn pause_upload(state: &AppState, id: String) -> Result<ActionOutcome, String> {
    let id = parse_id(&id)?;
    state.orchestrator.pause(id).await.map_err(|e| e.to_string())
}

pub async fn resume_upload(state: &AppState, id: String) -> Result<ActionOutcome, String> {
    let id = parse_id(&id)?;
    state.orchestrator.resume(id).await.map_err(|e| e.to_string())
}

pub async fn retry_upload(state: &AppState, id: String) -> Result<ActionOutcome, String> {
    let id = parse_id(&id)?;
    state.orchestrator.retry(id).await.map_err(|e| e.to_string())
}

pub async fn cancel_upload(state: &AppState, id: String) -> Result<ActionOutcome, String> {
    let id = parse_id(&id)?;
    state.orchestrator.cancel(id).await.map_err(|e| e.to_string())
}

pub async fn remove_upload(state: &AppState, id: String) -> Result<ActionOutcome, String> {
    let id = parse_id(&id)?;
    state.orchestrator.remove(id).await.map_err(|e| e.to_string())
}

pub async fn cancel_all_uploads(state: &AppState) -> Result<Vec<Uuid>, String> {
    Ok(state.orchestrator.cancel_all().await)
}

pub async fn clear_completed_uploads(state: &AppState) -> Result<ClearReport, String> {
    Ok(state.orchestrator.clear_completed().await)
}

pub async fn clear_all_uploads(state: &AppState) -> Result<usize, String> {
    Ok(state.orchestrator.clear_all().await)
}

pub async fn bulk_upload_action(
    state: &AppState,
    ids: Vec<String>,
    action: String,
) -> Result<BulkReport, String> {
    let action: BulkAction = action.parse()?;
    let mut selection = ids
        .iter()
        .map(|id| parse_id(id))
        .collect::<Result<Selection, String>>()?;
    Ok(state.orchestrator.bulk(&mut selection, action).await)
}

pub async fn get_queue_state(state: &AppState) -> Result<Vec<UploadItemInfo>, String> {
    Ok(state.orchestrator.get_state().await)
}

pub async fn get_batch_snapshot(state: &AppState) -> Result<BatchSnapshot, String> {
    Ok(state.orchestrator.snapshot().await)
}

pub async fn get_upload_history(state: &AppState) -> Result<Vec<HistoryEntry>, String> {
    state.orchestrator.history().await.map_err(|e| e.to_string())
}

pub async fn get_upload_stats(state: &AppState) -> Result<HistoryStats, String> {
    state
        .orchestrator
        .history_stats()
        .await
        .map_err(|e| e.to_string())
}

pub async fn remove_upload_history_entry(
    state: &AppState,
    id: u64,
) -> Result<HistoryEntry, String> {
    state
        .orchestrator
        .remove_history_entry(id)
        .await
        .map_err(|e| e.to_string())
}

pub async fn clear_upload_history(state: &AppState) -> Result<(), String> {
    state
        .orchestrator
        .clear_history()
        .await
        .map_err(|e| e.to_string())
}

/// Applies a new concurrency limit right away and persists it.
pub async fn update_max_concurrent(state: &AppState, max_concurrent: u32) -> Result<u32, String> {
    let max_concurrent = max_concurrent.max(1);
    {
        let mut settings = state.settings.lock().await;
        settings.upload.max_concurrent_uploads = max_concurrent;
        config::save_settings(state.paths.as_ref(), &settings)
            .map_err(|e| format!("Save: {}", e))?;
    }
    state.orchestrator.set_max_concurrent(max_concurrent).await;
    tracing::info!("Max concurrent uploads set to {}", max_concurrent);
    Ok(max_concurrent)
}
