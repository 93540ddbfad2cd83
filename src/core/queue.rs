use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uplift_core::core::events::{BatchFinished, UploadItemInfo, UploadItemProgress, UploadStatus};
use uuid::Uuid;

use crate::core::error::UploadError;
use crate::core::lifecycle::{ActionOutcome, Transition, CANCELLED_MESSAGE};
use crate::core::validation::CandidateFile;
use crate::models::transfer::TransferRequest;

/// In-flight progress never reaches 100 before the backend resolves.
pub const MAX_IN_FLIGHT_PERCENT: f64 = 99.0;

pub struct UploadItem {
    pub id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub preview: bool,
    status: UploadStatus,
    percent: f64,
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    result_location: Option<String>,
    attempt: u64,
    readmit_requested: bool,
    authoritative_progress: bool,
    cancel_token: CancellationToken,
}

impl UploadItem {
    pub fn from_candidate(file: CandidateFile) -> Self {
        let preview = file.mime_type.to_ascii_lowercase().starts_with("image/");
        Self {
            id: Uuid::new_v4(),
            name: file.name,
            size_bytes: file.size_bytes,
            mime_type: file.mime_type,
            preview,
            status: UploadStatus::Pending,
            percent: 0.0,
            error_message: None,
            started_at: None,
            finished_at: None,
            result_location: None,
            attempt: 0,
            readmit_requested: false,
            authoritative_progress: false,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Set by resume or retry; the item is admitted ahead of ordinary pending
    /// items even when no batch is running.
    pub fn is_readmit_requested(&self) -> bool {
        self.readmit_requested
    }

    /// Whether the backend has seen this item and should hear about a cancel.
    pub fn backend_engaged(&self) -> bool {
        self.attempt > 0
            && matches!(
                self.status,
                UploadStatus::Transferring | UploadStatus::Paused
            )
    }

    pub fn to_info(&self) -> UploadItemInfo {
        UploadItemInfo {
            id: self.id,
            name: self.name.clone(),
            size_bytes: self.size_bytes,
            mime_type: self.mime_type.clone(),
            status: self.status,
            percent: self.percent,
            error_message: self.error_message.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            result_location: self.result_location.clone(),
            preview: self.preview,
        }
    }

    fn to_progress(&self) -> UploadItemProgress {
        UploadItemProgress {
            id: self.id,
            name: self.name.clone(),
            percent: self.percent,
            uploaded_bytes: (self.percent / 100.0 * self.size_bytes as f64) as u64,
            total_bytes: self.size_bytes,
            authoritative: self.authoritative_progress,
        }
    }

    fn apply(&mut self, transition: Transition) -> Result<UploadStatus, ActionOutcome> {
        match transition.target(self.status) {
            Some(next) => {
                self.status = next;
                Ok(next)
            }
            None => Err(ActionOutcome::Ignored {
                status: self.status,
                action: transition,
            }),
        }
    }

    fn is_current_attempt(&self, attempt: u64) -> bool {
        self.status == UploadStatus::Transferring && self.attempt == attempt
    }
}

/// Everything a spawned transfer needs, captured at admission time.
#[derive(Debug, Clone)]
pub struct Admission {
    pub request: TransferRequest,
    pub cancel_token: CancellationToken,
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimTick {
    Advanced(UploadItemProgress),
    /// Attempt still running but nothing to simulate.
    Idle,
    Finished,
}

pub struct UploadQueue {
    items: Vec<UploadItem>,
    index: HashMap<Uuid, usize>,
    pub max_concurrent: u32,
    pub stagger_delay_ms: u64,
    running: bool,
}

impl UploadQueue {
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            max_concurrent: max_concurrent.max(1),
            stagger_delay_ms: 150,
            running: false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn get(&self, id: Uuid) -> Option<&UploadItem> {
        self.index.get(&id).map(|&pos| &self.items[pos])
    }

    fn get_mut(&mut self, id: Uuid) -> Result<&mut UploadItem, UploadError> {
        match self.index.get(&id) {
            Some(&pos) => Ok(&mut self.items[pos]),
            None => Err(UploadError::NotFound(id)),
        }
    }

    pub fn push(&mut self, item: UploadItem) -> Uuid {
        let id = item.id;
        self.index.insert(id, self.items.len());
        self.items.push(item);
        id
    }

    pub fn active_count(&self) -> u32 {
        self.count(UploadStatus::Transferring) as u32
    }

    pub fn count(&self, status: UploadStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }

    /// Ids that would be admitted now, in queue order within each group:
    /// resumed items, then retried items, then (only while a batch runs) the
    /// remaining pending items.
    pub fn next_admission_ids(&self) -> Vec<Uuid> {
        let slots = self.max_concurrent.saturating_sub(self.active_count()) as usize;
        if slots == 0 {
            return Vec::new();
        }
        let resumed = self
            .items
            .iter()
            .filter(|i| i.status == UploadStatus::Paused && i.readmit_requested);
        let retried = self
            .items
            .iter()
            .filter(|i| i.status == UploadStatus::Pending && i.readmit_requested);
        let running = self.running;
        let pending = self
            .items
            .iter()
            .filter(move |i| running && i.status == UploadStatus::Pending && !i.readmit_requested);
        resumed
            .chain(retried)
            .chain(pending)
            .take(slots)
            .map(|i| i.id)
            .collect()
    }

    /// Moves as many items into `transferring` as free slots allow. Outside a
    /// running batch only resumed and retried items are admitted.
    pub fn admit(&mut self) -> Vec<Admission> {
        self.next_admission_ids()
            .into_iter()
            .filter_map(|id| self.mark_active(id))
            .collect()
    }

    fn mark_active(&mut self, id: Uuid) -> Option<Admission> {
        let item = self.get_mut(id).ok()?;
        let resumed = item.status == UploadStatus::Paused;
        let transition = if resumed {
            Transition::Resume
        } else {
            Transition::Start
        };
        item.apply(transition).ok()?;

        item.attempt += 1;
        item.cancel_token = CancellationToken::new();
        item.started_at = Some(Utc::now());
        item.readmit_requested = false;
        item.authoritative_progress = false;
        if !resumed {
            item.percent = 0.0;
        }

        Some(Admission {
            request: TransferRequest {
                id: item.id,
                name: item.name.clone(),
                size_bytes: item.size_bytes,
                mime_type: item.mime_type.clone(),
                attempt: item.attempt,
            },
            cancel_token: item.cancel_token.clone(),
            resumed,
        })
    }

    /// Applies a backend-reported percentage. Values never move backwards and
    /// stay below 100 until completion.
    pub fn update_progress(
        &mut self,
        id: Uuid,
        attempt: u64,
        percent: f64,
    ) -> Option<UploadItemProgress> {
        let item = self.get_mut(id).ok()?;
        if !item.is_current_attempt(attempt) {
            return None;
        }
        let clamped = percent.clamp(0.0, MAX_IN_FLIGHT_PERCENT);
        item.percent = item.percent.max(clamped);
        item.authoritative_progress = true;
        Some(item.to_progress())
    }

    pub fn simulate_tick(&mut self, id: Uuid, attempt: u64, increment: f64, cap: f64) -> SimTick {
        let item = match self.get_mut(id) {
            Ok(item) if item.is_current_attempt(attempt) => item,
            _ => return SimTick::Finished,
        };
        if item.authoritative_progress {
            return SimTick::Finished;
        }
        let cap = cap.min(MAX_IN_FLIGHT_PERCENT);
        if item.percent >= cap || increment <= 0.0 {
            return SimTick::Idle;
        }
        item.percent = (item.percent + increment).min(cap);
        SimTick::Advanced(item.to_progress())
    }

    /// Resolves an attempt successfully. `None` means the result is stale and
    /// was discarded.
    pub fn complete(&mut self, id: Uuid, attempt: u64, location: String) -> Option<UploadItemInfo> {
        let item = self.get_mut(id).ok()?;
        if !item.is_current_attempt(attempt) {
            return None;
        }
        item.apply(Transition::Complete).ok()?;
        item.percent = 100.0;
        item.result_location = Some(location);
        item.error_message = None;
        item.finished_at = Some(Utc::now());
        Some(item.to_info())
    }

    pub fn fail(&mut self, id: Uuid, attempt: u64, message: String) -> bool {
        let item = match self.get_mut(id) {
            Ok(item) if item.is_current_attempt(attempt) => item,
            _ => return false,
        };
        if item.apply(Transition::Fail).is_err() {
            return false;
        }
        item.error_message = Some(message);
        item.finished_at = Some(Utc::now());
        true
    }

    pub fn pause(&mut self, id: Uuid) -> Result<ActionOutcome, UploadError> {
        let item = self.get_mut(id)?;
        if let Err(ignored) = item.apply(Transition::Pause) {
            return Ok(ignored);
        }
        item.cancel_token.cancel();
        item.readmit_requested = false;
        Ok(ActionOutcome::Applied)
    }

    /// Pauses the most recently started transfers until at most
    /// `max_concurrent` remain. Shed items keep their progress and are flagged
    /// for readmission, so they go first when a slot frees.
    pub fn shed_excess(&mut self) -> Vec<Uuid> {
        let excess = self.active_count().saturating_sub(self.max_concurrent) as usize;
        if excess == 0 {
            return Vec::new();
        }

        let mut active: Vec<(usize, Option<DateTime<Utc>>)> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.status == UploadStatus::Transferring)
            .map(|(pos, i)| (pos, i.started_at))
            .collect();
        active.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));

        let mut shed = Vec::with_capacity(excess);
        for (pos, _) in active.into_iter().take(excess) {
            let item = &mut self.items[pos];
            if item.apply(Transition::Pause).is_ok() {
                item.cancel_token.cancel();
                item.readmit_requested = true;
                shed.push(item.id);
            }
        }
        shed
    }

    /// Flags a paused item for readmission. The status only changes once
    /// [`admit`](Self::admit) hands it a slot.
    pub fn resume(&mut self, id: Uuid) -> Result<ActionOutcome, UploadError> {
        let max = self.max_concurrent;
        let active = self.active_count();
        let queued_ahead = self
            .items
            .iter()
            .filter(|i| i.readmit_requested && i.id != id && !i.status.is_terminal())
            .count() as u32;

        let item = self.get_mut(id)?;
        if !Transition::Resume.is_allowed(item.status) {
            return Ok(ActionOutcome::Ignored {
                status: item.status,
                action: Transition::Resume,
            });
        }
        item.readmit_requested = true;

        if active + queued_ahead < max {
            Ok(ActionOutcome::Applied)
        } else {
            Ok(ActionOutcome::Deferred)
        }
    }

    pub fn retry(&mut self, id: Uuid) -> Result<ActionOutcome, UploadError> {
        let item = self.get_mut(id)?;
        if let Err(ignored) = item.apply(Transition::Retry) {
            return Ok(ignored);
        }
        item.percent = 0.0;
        item.error_message = None;
        item.started_at = None;
        item.finished_at = None;
        item.result_location = None;
        item.authoritative_progress = false;
        item.cancel_token = CancellationToken::new();
        item.readmit_requested = true;
        Ok(ActionOutcome::Applied)
    }

    pub fn cancel(&mut self, id: Uuid) -> Result<ActionOutcome, UploadError> {
        let item = self.get_mut(id)?;
        if let Err(ignored) = item.apply(Transition::Cancel) {
            return Ok(ignored);
        }
        item.cancel_token.cancel();
        item.error_message = Some(CANCELLED_MESSAGE.to_string());
        item.finished_at = Some(Utc::now());
        item.readmit_requested = false;
        Ok(ActionOutcome::Applied)
    }

    /// Cancels every cancellable item. Returns `(id, backend_engaged)` pairs.
    pub fn cancel_all(&mut self) -> Vec<(Uuid, bool)> {
        let ids: Vec<(Uuid, bool)> = self
            .items
            .iter()
            .filter(|i| Transition::Cancel.is_allowed(i.status))
            .map(|i| (i.id, i.backend_engaged()))
            .collect();
        for (id, _) in &ids {
            let _ = self.cancel(*id);
        }
        ids
    }

    pub fn remove(&mut self, id: Uuid) -> Result<UploadItem, UploadError> {
        let pos = *self.index.get(&id).ok_or(UploadError::NotFound(id))?;
        let item = self.items.remove(pos);
        item.cancel_token.cancel();
        self.reindex_from(pos);
        self.index.remove(&id);
        Ok(item)
    }

    /// Removes the given ids that are still `completed`.
    pub fn remove_completed(&mut self, ids: &[Uuid]) -> Vec<Uuid> {
        let mut removed = Vec::new();
        for id in ids {
            let still_completed = self
                .get(*id)
                .is_some_and(|i| i.status == UploadStatus::Completed);
            if still_completed && self.remove(*id).is_ok() {
                removed.push(*id);
            }
        }
        removed
    }

    pub fn clear_all(&mut self) -> Vec<UploadItem> {
        for item in &self.items {
            item.cancel_token.cancel();
        }
        self.index.clear();
        self.running = false;
        std::mem::take(&mut self.items)
    }

    pub fn completed_infos(&self) -> Vec<UploadItemInfo> {
        self.items
            .iter()
            .filter(|i| i.status == UploadStatus::Completed)
            .map(|i| i.to_info())
            .collect()
    }

    /// Ends the running batch once nothing is waiting or in flight.
    pub fn finish_batch_if_idle(&mut self) -> Option<BatchFinished> {
        if !self.running {
            return None;
        }
        let busy = self.items.iter().any(|i| {
            !i.status.is_terminal() && (i.status != UploadStatus::Paused || i.readmit_requested)
        });
        if busy {
            return None;
        }
        self.running = false;
        Some(BatchFinished {
            completed: self.count(UploadStatus::Completed),
            failed: self.count(UploadStatus::Failed),
            cancelled: self.count(UploadStatus::Cancelled),
        })
    }

    pub fn get_state(&self) -> Vec<UploadItemInfo> {
        self.items.iter().map(|i| i.to_info()).collect()
    }

    fn reindex_from(&mut self, pos: usize) {
        for (offset, item) in self.items[pos..].iter().enumerate() {
            self.index.insert(item.id, pos + offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with(n: usize, max: u32) -> (UploadQueue, Vec<Uuid>) {
        let mut q = UploadQueue::new(max);
        let ids = (0..n)
            .map(|i| {
                q.push(UploadItem::from_candidate(CandidateFile::new(
                    format!("file-{}.png", i),
                    1000,
                    "image/png",
                )))
            })
            .collect();
        (q, ids)
    }

    fn status(q: &UploadQueue, id: Uuid) -> UploadStatus {
        q.get(id).unwrap().status()
    }

    #[test]
    fn admit_respects_limit_and_order() {
        let (mut q, ids) = queue_with(5, 3);
        q.set_running(true);
        let admitted: Vec<Uuid> = q.admit().into_iter().map(|a| a.request.id).collect();
        assert_eq!(admitted, ids[..3].to_vec());
        assert_eq!(q.active_count(), 3);
        assert!(q.admit().is_empty());
    }

    #[test]
    fn admit_is_idle_without_running_batch() {
        let (mut q, _) = queue_with(2, 2);
        assert!(q.admit().is_empty());
        assert_eq!(q.active_count(), 0);
    }

    #[test]
    fn complete_forces_full_progress_and_location() {
        let (mut q, ids) = queue_with(1, 1);
        q.set_running(true);
        let adm = q.admit().remove(0);
        let info = q
            .complete(ids[0], adm.request.attempt, "https://example.com/uploads/a".into())
            .unwrap();
        assert_eq!(info.status, UploadStatus::Completed);
        assert_eq!(info.percent, 100.0);
        assert_eq!(info.result_location.as_deref(), Some("https://example.com/uploads/a"));
        assert!(info.error_message.is_none());
        assert!(info.finished_at.is_some());
    }

    #[test]
    fn stale_attempt_results_are_discarded() {
        let (mut q, ids) = queue_with(1, 1);
        q.set_running(true);
        let adm = q.admit().remove(0);
        q.cancel(ids[0]).unwrap();
        assert!(adm.cancel_token.is_cancelled());
        assert!(q.complete(ids[0], adm.request.attempt, "x".into()).is_none());
        assert!(!q.fail(ids[0], adm.request.attempt, "boom".into()));
        assert_eq!(status(&q, ids[0]), UploadStatus::Cancelled);
        assert_eq!(
            q.get(ids[0]).unwrap().to_info().error_message.as_deref(),
            Some(CANCELLED_MESSAGE)
        );
    }

    #[test]
    fn progress_is_monotonic_and_capped() {
        let (mut q, ids) = queue_with(1, 1);
        q.set_running(true);
        let attempt = q.admit()[0].request.attempt;
        assert_eq!(q.update_progress(ids[0], attempt, 40.0).unwrap().percent, 40.0);
        assert_eq!(q.update_progress(ids[0], attempt, 20.0).unwrap().percent, 40.0);
        assert_eq!(q.update_progress(ids[0], attempt, 150.0).unwrap().percent, MAX_IN_FLIGHT_PERCENT);
        assert!(q.update_progress(ids[0], attempt + 1, 50.0).is_none());
    }

    #[test]
    fn simulation_stops_after_authoritative_progress() {
        let (mut q, ids) = queue_with(1, 1);
        q.set_running(true);
        let attempt = q.admit()[0].request.attempt;
        assert!(matches!(q.simulate_tick(ids[0], attempt, 10.0, 95.0), SimTick::Advanced(_)));
        q.update_progress(ids[0], attempt, 50.0);
        assert_eq!(q.simulate_tick(ids[0], attempt, 10.0, 95.0), SimTick::Finished);
    }

    #[test]
    fn simulation_saturates_at_cap() {
        let (mut q, ids) = queue_with(1, 1);
        q.set_running(true);
        let attempt = q.admit()[0].request.attempt;
        for _ in 0..20 {
            q.simulate_tick(ids[0], attempt, 10.0, 95.0);
        }
        assert_eq!(q.get(ids[0]).unwrap().percent(), 95.0);
        assert_eq!(q.simulate_tick(ids[0], attempt, 10.0, 95.0), SimTick::Idle);
    }

    #[test]
    fn pause_keeps_progress_and_resume_readmits_first() {
        let (mut q, ids) = queue_with(3, 1);
        q.set_running(true);
        let attempt = q.admit()[0].request.attempt;
        q.update_progress(ids[0], attempt, 42.0);

        assert_eq!(q.pause(ids[0]).unwrap(), ActionOutcome::Applied);
        let next = q.admit();
        assert_eq!(next[0].request.id, ids[1]);

        assert_eq!(q.resume(ids[0]).unwrap(), ActionOutcome::Deferred);
        assert_eq!(status(&q, ids[0]), UploadStatus::Paused);

        q.pause(ids[1]).unwrap();
        let next = q.admit();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].request.id, ids[0]);
        assert!(next[0].resumed);
        assert_eq!(q.get(ids[0]).unwrap().percent(), 42.0);
        assert_eq!(q.active_count(), 1);
    }

    #[test]
    fn pause_on_pending_is_ignored() {
        let (mut q, ids) = queue_with(1, 1);
        assert_eq!(
            q.pause(ids[0]).unwrap(),
            ActionOutcome::Ignored {
                status: UploadStatus::Pending,
                action: Transition::Pause,
            }
        );
    }

    #[test]
    fn retry_resets_failed_item() {
        let (mut q, ids) = queue_with(1, 1);
        q.set_running(true);
        let attempt = q.admit()[0].request.attempt;
        q.update_progress(ids[0], attempt, 30.0);
        assert!(q.fail(ids[0], attempt, "Network error occurred during upload".into()));
        q.set_running(false);

        assert_eq!(q.retry(ids[0]).unwrap(), ActionOutcome::Applied);
        let info = q.get(ids[0]).unwrap().to_info();
        assert_eq!(info.status, UploadStatus::Pending);
        assert_eq!(info.percent, 0.0);
        assert!(info.error_message.is_none());
        assert!(q.get(ids[0]).unwrap().is_readmit_requested());
        assert!(!q.is_running());
    }

    #[test]
    fn retry_outside_batch_admits_only_that_item() {
        let (mut q, ids) = queue_with(1, 3);
        q.set_running(true);
        let attempt = q.admit()[0].request.attempt;
        q.fail(ids[0], attempt, "boom".into());
        assert!(q.finish_batch_if_idle().is_some());

        let later: Vec<Uuid> = (0..2)
            .map(|i| {
                q.push(UploadItem::from_candidate(CandidateFile::new(
                    format!("later-{}.png", i),
                    10,
                    "image/png",
                )))
            })
            .collect();

        q.retry(ids[0]).unwrap();
        let admitted: Vec<Uuid> = q.admit().into_iter().map(|a| a.request.id).collect();
        assert_eq!(admitted, vec![ids[0]]);
        for id in later {
            assert_eq!(status(&q, id), UploadStatus::Pending);
        }
    }

    #[test]
    fn lowering_limit_sheds_newest_transfers() {
        let (mut q, ids) = queue_with(3, 3);
        q.set_running(true);
        let attempts: Vec<u64> = q.admit().iter().map(|a| a.request.attempt).collect();
        q.update_progress(ids[2], attempts[2], 30.0);

        q.max_concurrent = 1;
        let shed = q.shed_excess();
        assert_eq!(shed.len(), 2);
        assert_eq!(q.active_count(), 1);
        for id in &shed {
            let item = q.get(*id).unwrap();
            assert_eq!(item.status(), UploadStatus::Paused);
            assert!(item.is_readmit_requested());
        }
        assert_eq!(q.get(ids[2]).unwrap().percent(), 30.0);
        assert!(q.shed_excess().is_empty());
        assert!(q.finish_batch_if_idle().is_none());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let (mut q, _) = queue_with(1, 1);
        let missing = Uuid::new_v4();
        assert!(matches!(q.pause(missing), Err(UploadError::NotFound(id)) if id == missing));
        assert!(matches!(q.remove(missing), Err(UploadError::NotFound(_))));
    }

    #[test]
    fn remove_keeps_index_consistent() {
        let (mut q, ids) = queue_with(4, 1);
        q.remove(ids[1]).unwrap();
        assert_eq!(q.len(), 3);
        for id in [ids[0], ids[2], ids[3]] {
            assert_eq!(q.get(id).unwrap().id, id);
        }
        assert!(q.get(ids[1]).is_none());
    }

    #[test]
    fn cancel_all_skips_finished_items() {
        let (mut q, ids) = queue_with(4, 1);
        q.set_running(true);
        let attempt = q.admit()[0].request.attempt;
        q.complete(ids[0], attempt, "loc".into());
        q.admit();

        let cancelled = q.cancel_all();
        assert_eq!(cancelled.len(), 3);
        assert_eq!(cancelled[0], (ids[1], true));
        assert_eq!(cancelled[1], (ids[2], false));
        assert_eq!(status(&q, ids[0]), UploadStatus::Completed);
    }

    #[test]
    fn batch_finishes_when_nothing_is_left() {
        let (mut q, ids) = queue_with(1, 1);
        q.set_running(true);
        let attempt = q.admit()[0].request.attempt;
        assert!(q.finish_batch_if_idle().is_none());
        q.fail(ids[0], attempt, "boom".into());
        let summary = q.finish_batch_if_idle().unwrap();
        assert_eq!(summary.failed, 1);
        assert!(!q.is_running());
    }
}
