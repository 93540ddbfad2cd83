//! One action fanned out over a caller-selected set of uploads.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uplift_core::core::events::UploadStatus;
use uuid::Uuid;

use crate::core::error::UploadError;
use crate::core::lifecycle::ActionOutcome;
use crate::core::orchestrator::UploadOrchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulkAction {
    Remove,
    Pause,
    Resume,
    Retry,
    Cancel,
    ClearCompleted,
}

impl FromStr for BulkAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "remove" => Ok(BulkAction::Remove),
            "pause" => Ok(BulkAction::Pause),
            "resume" => Ok(BulkAction::Resume),
            "retry" => Ok(BulkAction::Retry),
            "cancel" => Ok(BulkAction::Cancel),
            "clear-completed" => Ok(BulkAction::ClearCompleted),
            other => Err(format!("Unknown bulk action: {}", other)),
        }
    }
}

/// Ordered set of selected upload ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    ids: Vec<Uuid>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, id: Uuid) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    pub fn deselect(&mut self, id: Uuid) {
        self.ids.retain(|i| *i != id);
    }

    pub fn toggle(&mut self, id: Uuid) {
        if self.contains(id) {
            self.deselect(id);
        } else {
            self.select(id);
        }
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.ids
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

impl FromIterator<Uuid> for Selection {
    fn from_iter<I: IntoIterator<Item = Uuid>>(iter: I) -> Self {
        let mut selection = Selection::new();
        for id in iter {
            selection.select(id);
        }
        selection
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BulkReport {
    pub applied: Vec<Uuid>,
    /// Resumes accepted but waiting for a free slot.
    pub deferred: Vec<Uuid>,
    /// Not eligible for the action in their current state.
    pub skipped: Vec<Uuid>,
    pub not_found: Vec<Uuid>,
}

impl UploadOrchestrator {
    /// Applies `action` to each selected id independently, then clears the
    /// selection. Ineligible items are skipped, never treated as errors.
    pub async fn bulk(&self, selection: &mut Selection, action: BulkAction) -> BulkReport {
        let report = match action {
            BulkAction::ClearCompleted => self.bulk_clear_completed(selection.ids()).await,
            _ => self.bulk_transition(selection.ids(), action).await,
        };

        tracing::info!(
            "Bulk {:?}: {} applied, {} deferred, {} skipped, {} not found",
            action,
            report.applied.len(),
            report.deferred.len(),
            report.skipped.len(),
            report.not_found.len()
        );
        selection.clear();
        report
    }

    async fn bulk_transition(&self, ids: &[Uuid], action: BulkAction) -> BulkReport {
        let mut report = BulkReport::default();
        let mut notify = Vec::new();

        let dispatch = {
            let mut q = self.queue.lock().await;
            for &id in ids {
                let engaged = q.get(id).is_some_and(|i| i.backend_engaged());
                let outcome = match action {
                    BulkAction::Pause => q.pause(id),
                    BulkAction::Resume => q.resume(id),
                    BulkAction::Retry => q.retry(id),
                    BulkAction::Cancel => q.cancel(id),
                    BulkAction::Remove => q.remove(id).map(|_| ActionOutcome::Applied),
                    BulkAction::ClearCompleted => continue,
                };

                match outcome {
                    Ok(ActionOutcome::Applied) => {
                        report.applied.push(id);
                        if engaged && matches!(action, BulkAction::Cancel | BulkAction::Remove) {
                            notify.push(id);
                        }
                    }
                    Ok(ActionOutcome::Deferred) => report.deferred.push(id),
                    Ok(ActionOutcome::Ignored { .. }) => report.skipped.push(id),
                    Err(UploadError::NotFound(_)) => report.not_found.push(id),
                    Err(e) => {
                        tracing::warn!("Bulk {:?} failed for {}: {}", action, id, e);
                        report.skipped.push(id);
                    }
                }
            }
            self.settle(&mut q)
        };

        self.notify_backend_cancel(notify);
        self.launch(dispatch);
        report
    }

    async fn bulk_clear_completed(&self, ids: &[Uuid]) -> BulkReport {
        let state = self.get_state().await;
        let mut report = BulkReport::default();
        let mut eligible = Vec::new();
        for &id in ids {
            match state.iter().find(|i| i.id == id) {
                Some(info) if info.status == UploadStatus::Completed => eligible.push(id),
                Some(_) => report.skipped.push(id),
                None => report.not_found.push(id),
            }
        }

        let cleared = self.clear_completed_in(Some(&eligible)).await;
        report.applied = cleared.removed;
        report.skipped.extend(cleared.retained);
        report
    }
}
