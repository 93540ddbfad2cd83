use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;
use uplift_core::core::events::{EventEmitter, UploadItemInfo, UploadItemProgress, UploadStatus};
use uuid::Uuid;

use crate::backends::traits::TransferBackend;
use crate::core::error::{UploadError, ValidationError};
use crate::core::history::{HistoryEntry, HistoryStats, HistoryStore, NewHistoryEntry};
use crate::core::lifecycle::ActionOutcome;
use crate::core::progress::{BatchSnapshot, ProgressThrottle};
use crate::core::queue::{Admission, SimTick, UploadItem, UploadQueue};
use crate::core::ticks::{IntervalTicks, ProgressSimulation, TickSource};
use crate::core::validation::{validate, CandidateFile, ValidationRules};
use crate::models::transfer::{TransferReceipt, TransferRequest};

const PROGRESS_THROTTLE_MS: u64 = 150;
const DEFAULT_TICK: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub name: String,
    pub reason: String,
    pub error: ValidationError,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnqueueReport {
    pub accepted: Vec<UploadItemInfo>,
    pub rejected: Vec<Rejection>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchStart {
    pub admitted: Vec<Uuid>,
    pub pending: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ClearReport {
    pub removed: Vec<Uuid>,
    /// Completed items kept because the history store could not confirm them.
    pub retained: Vec<Uuid>,
}

/// Admissions produced under the queue lock, launched after it is released.
pub(crate) struct Dispatch {
    admissions: Vec<Admission>,
    stagger_ms: u64,
}

/// Owns the upload queue and drives pending items through the backend.
///
/// Cloning is cheap and yields another handle to the same queue.
#[derive(Clone)]
pub struct UploadOrchestrator {
    pub(crate) queue: Arc<Mutex<UploadQueue>>,
    backend: Arc<dyn TransferBackend>,
    history: Arc<dyn HistoryStore>,
    ticks: Arc<dyn TickSource>,
    emitter: Arc<dyn EventEmitter>,
    simulation: ProgressSimulation,
    idle: Arc<Notify>,
}

impl UploadOrchestrator {
    pub fn new(
        backend: Arc<dyn TransferBackend>,
        history: Arc<dyn HistoryStore>,
        emitter: Arc<dyn EventEmitter>,
        max_concurrent: u32,
    ) -> Self {
        Self {
            queue: Arc::new(Mutex::new(UploadQueue::new(max_concurrent))),
            backend,
            history,
            ticks: Arc::new(IntervalTicks::new(DEFAULT_TICK)),
            emitter,
            simulation: ProgressSimulation::default(),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn with_ticks(mut self, ticks: Arc<dyn TickSource>) -> Self {
        self.ticks = ticks;
        self
    }

    pub fn with_simulation(mut self, simulation: ProgressSimulation) -> Self {
        self.simulation = simulation;
        self
    }

    /// Delay between launches admitted in the same round.
    pub fn with_stagger_delay(self, stagger_ms: u64) -> Self {
        if let Ok(mut q) = self.queue.try_lock() {
            q.stagger_delay_ms = stagger_ms;
        }
        self
    }

    pub async fn enqueue(&self, files: Vec<CandidateFile>, rules: &ValidationRules) -> EnqueueReport {
        let mut report = EnqueueReport::default();

        let dispatch = {
            let mut q = self.queue.lock().await;
            for file in files {
                let checked = validate(&file, rules).and_then(|()| {
                    if q.len() >= rules.max_files {
                        Err(ValidationError::QueueFull {
                            max: rules.max_files,
                        })
                    } else {
                        Ok(())
                    }
                });

                match checked {
                    Ok(()) => {
                        let item = UploadItem::from_candidate(file);
                        report.accepted.push(item.to_info());
                        q.push(item);
                    }
                    Err(error) => {
                        tracing::warn!("Rejected '{}': {}", file.name, error);
                        report.rejected.push(Rejection {
                            name: file.name,
                            reason: error.to_string(),
                            error,
                        });
                    }
                }
            }
            self.settle(&mut q)
        };

        if !report.accepted.is_empty() {
            tracing::info!("{} file(s) added", report.accepted.len());
        }
        self.launch(dispatch);
        report
    }

    /// Starts (or widens) the batch and fills free slots in queue order.
    pub async fn start_batch(&self, concurrency_limit: u32) -> BatchStart {
        let (dispatch, admitted, pending) = {
            let mut q = self.queue.lock().await;
            q.max_concurrent = concurrency_limit.max(1);

            let was_running = q.is_running();
            q.set_running(true);
            if q.next_admission_ids().is_empty() && q.active_count() == 0 {
                q.set_running(was_running);
                tracing::info!("No files to upload");
                return BatchStart {
                    admitted: Vec::new(),
                    pending: 0,
                };
            }

            let dispatch = self.settle(&mut q);
            let admitted: Vec<Uuid> = dispatch.admissions.iter().map(|a| a.request.id).collect();
            (dispatch, admitted, q.count(UploadStatus::Pending))
        };

        tracing::info!(
            "Batch started: {} admitted, {} waiting (limit {})",
            admitted.len(),
            pending,
            concurrency_limit.max(1)
        );
        self.launch(dispatch);
        BatchStart { admitted, pending }
    }

    /// Changes the concurrency limit. Raising it admits waiting items right
    /// away; lowering it pauses the newest transfers, which resume first.
    pub async fn set_max_concurrent(&self, max_concurrent: u32) {
        let dispatch = {
            let mut q = self.queue.lock().await;
            q.max_concurrent = max_concurrent.max(1);
            self.settle(&mut q)
        };
        self.launch(dispatch);
    }

    pub async fn pause(&self, id: Uuid) -> Result<ActionOutcome, UploadError> {
        let (outcome, dispatch) = {
            let mut q = self.queue.lock().await;
            let outcome = q.pause(id)?;
            (outcome, self.settle(&mut q))
        };
        if outcome.is_applied() {
            tracing::info!("Paused upload {}", id);
        }
        self.launch(dispatch);
        Ok(outcome)
    }

    pub async fn resume(&self, id: Uuid) -> Result<ActionOutcome, UploadError> {
        let (outcome, dispatch) = {
            let mut q = self.queue.lock().await;
            let outcome = q.resume(id)?;
            (outcome, self.settle(&mut q))
        };
        self.launch(dispatch);
        Ok(outcome)
    }

    /// Sends a failed upload back through the transfer path.
    pub async fn retry(&self, id: Uuid) -> Result<ActionOutcome, UploadError> {
        let (outcome, dispatch) = {
            let mut q = self.queue.lock().await;
            let outcome = q.retry(id)?;
            (outcome, self.settle(&mut q))
        };
        self.launch(dispatch);
        Ok(outcome)
    }

    /// Cancels locally right away; the backend is told afterwards and its
    /// answer is never awaited.
    pub async fn cancel(&self, id: Uuid) -> Result<ActionOutcome, UploadError> {
        let (outcome, engaged, dispatch) = {
            let mut q = self.queue.lock().await;
            let engaged = q.get(id).is_some_and(|i| i.backend_engaged());
            let outcome = q.cancel(id)?;
            (outcome, engaged, self.settle(&mut q))
        };
        if outcome.is_applied() {
            tracing::info!("Cancelled upload {}", id);
            if engaged {
                self.notify_backend_cancel(vec![id]);
            }
        }
        self.launch(dispatch);
        Ok(outcome)
    }

    pub async fn remove(&self, id: Uuid) -> Result<ActionOutcome, UploadError> {
        let (removed, engaged, dispatch) = {
            let mut q = self.queue.lock().await;
            let engaged = q.get(id).is_some_and(|i| i.backend_engaged());
            let removed = q.remove(id)?;
            (removed, engaged, self.settle(&mut q))
        };
        tracing::info!("Removed '{}' from queue", removed.name);
        if engaged {
            self.notify_backend_cancel(vec![id]);
        }
        self.launch(dispatch);
        Ok(ActionOutcome::Applied)
    }

    /// Cancels everything not yet finished. Returns the cancelled ids.
    pub async fn cancel_all(&self) -> Vec<Uuid> {
        let (cancelled, dispatch) = {
            let mut q = self.queue.lock().await;
            let cancelled = q.cancel_all();
            (cancelled, self.settle(&mut q))
        };
        let engaged: Vec<Uuid> = cancelled.iter().filter(|(_, e)| *e).map(|(id, _)| *id).collect();
        tracing::info!("Cancelled {} upload(s)", cancelled.len());
        self.notify_backend_cancel(engaged);
        self.launch(dispatch);
        cancelled.into_iter().map(|(id, _)| id).collect()
    }

    pub async fn clear_completed(&self) -> ClearReport {
        self.clear_completed_in(None).await
    }

    /// Removes completed items (optionally only those in `only`) once the
    /// history store confirms it holds them.
    pub(crate) async fn clear_completed_in(&self, only: Option<&[Uuid]>) -> ClearReport {
        let completed: Vec<UploadItemInfo> = {
            let q = self.queue.lock().await;
            q.completed_infos()
                .into_iter()
                .filter(|i| only.map_or(true, |ids| ids.contains(&i.id)))
                .collect()
        };

        let mut confirmed = Vec::new();
        let mut retained = Vec::new();
        for info in &completed {
            if self.ensure_in_history(info).await {
                confirmed.push(info.id);
            } else {
                retained.push(info.id);
            }
        }

        let removed = {
            let mut q = self.queue.lock().await;
            let removed = q.remove_completed(&confirmed);
            self.emitter.emit_queue_state(&q.get_state());
            removed
        };
        if !removed.is_empty() {
            tracing::info!("Cleared {} completed upload(s)", removed.len());
        }
        ClearReport { removed, retained }
    }

    /// Drops every item, cancelling whatever is in flight.
    pub async fn clear_all(&self) -> usize {
        let (items, dispatch) = {
            let mut q = self.queue.lock().await;
            let items = q.clear_all();
            (items, self.settle(&mut q))
        };
        let engaged: Vec<Uuid> = items
            .iter()
            .filter(|i| i.backend_engaged())
            .map(|i| i.id)
            .collect();
        self.notify_backend_cancel(engaged);
        self.launch(dispatch);
        items.len()
    }

    pub async fn get_state(&self) -> Vec<UploadItemInfo> {
        self.queue.lock().await.get_state()
    }

    pub async fn get(&self, id: Uuid) -> Result<UploadItemInfo, UploadError> {
        let q = self.queue.lock().await;
        q.get(id).map(|i| i.to_info()).ok_or(UploadError::NotFound(id))
    }

    pub async fn snapshot(&self) -> BatchSnapshot {
        let items = self.get_state().await;
        BatchSnapshot::from_items(&items, Utc::now())
    }

    pub async fn is_running(&self) -> bool {
        self.queue.lock().await.is_running()
    }

    /// Resolves once no batch is running.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if !self.queue.lock().await.is_running() {
                return;
            }
            notified.await;
        }
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>, UploadError> {
        self.history
            .list()
            .await
            .map_err(|e| UploadError::History(e.to_string()))
    }

    pub async fn history_stats(&self) -> Result<HistoryStats, UploadError> {
        self.history
            .stats()
            .await
            .map_err(|e| UploadError::History(e.to_string()))
    }

    pub async fn clear_history(&self) -> Result<(), UploadError> {
        self.history
            .clear()
            .await
            .map_err(|e| UploadError::History(e.to_string()))
    }

    pub async fn remove_history_entry(&self, id: u64) -> Result<HistoryEntry, UploadError> {
        self.history
            .remove(id)
            .await
            .map_err(|e| UploadError::History(e.to_string()))
    }

    /// Applies a new launch stagger to subsequent admissions.
    pub async fn set_stagger_delay(&self, stagger_ms: u64) {
        self.queue.lock().await.stagger_delay_ms = stagger_ms;
    }

    /// Sheds transfers above the limit, admits what fits, ends the batch when
    /// idle and publishes the new state. Must be called with the queue locked.
    pub(crate) fn settle(&self, q: &mut UploadQueue) -> Dispatch {
        let shed = q.shed_excess();
        if !shed.is_empty() {
            tracing::info!(
                "Paused {} upload(s) to fit the limit of {}",
                shed.len(),
                q.max_concurrent
            );
        }
        let admissions = q.admit();
        let finished = q.finish_batch_if_idle();

        self.emitter.emit_queue_state(&q.get_state());
        if let Some(summary) = &finished {
            tracing::info!(
                "Batch finished: {} completed, {} failed, {} cancelled",
                summary.completed,
                summary.failed,
                summary.cancelled
            );
            self.emitter.emit_batch_finished(summary);
        }
        if !q.is_running() {
            self.idle.notify_waiters();
        }

        Dispatch {
            admissions,
            stagger_ms: q.stagger_delay_ms,
        }
    }

    pub(crate) fn launch(&self, dispatch: Dispatch) {
        for (i, admission) in dispatch.admissions.into_iter().enumerate() {
            let delay = Duration::from_millis(dispatch.stagger_ms * i as u64);
            tokio::spawn(self.clone().spawn_upload(admission, delay));
        }
    }

    pub async fn try_start_next(&self) {
        let dispatch = {
            let mut q = self.queue.lock().await;
            self.settle(&mut q)
        };
        self.launch(dispatch);
    }

    pub(crate) fn notify_backend_cancel(&self, ids: Vec<Uuid>) {
        if ids.is_empty() {
            return;
        }
        let backend = self.backend.clone();
        tokio::spawn(async move {
            let results = futures::future::join_all(ids.iter().map(|id| backend.cancel(*id))).await;
            for (id, result) in ids.iter().zip(results) {
                if let Err(e) = result {
                    tracing::warn!("Cancel notice for {} failed: {}", id, e);
                }
            }
        });
    }

    fn spawn_upload(
        self,
        admission: Admission,
        delay: Duration,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            self.run_attempt(admission, delay).await;
        })
    }

    async fn run_attempt(self, admission: Admission, delay: Duration) {
        let Admission {
            request,
            cancel_token,
            resumed,
        } = admission;

        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel_token.cancelled() => return,
            }
        }

        tracing::info!(
            "Uploading '{}' via {} (attempt {}{})",
            request.name,
            self.backend.name(),
            request.attempt,
            if resumed { ", resumed" } else { "" }
        );

        let (tx, rx) = mpsc::channel::<f64>(32);
        let forwarder = tokio::spawn(self.clone().forward_progress(request.id, request.attempt, rx));
        let simulator = tokio::spawn(self.clone().simulate_progress(
            request.id,
            request.attempt,
            cancel_token.clone(),
        ));

        let result = tokio::select! {
            r = self.backend.transfer(&request, tx) => Some(r),
            _ = cancel_token.cancelled() => None,
        };
        simulator.abort();
        forwarder.abort();

        match result {
            Some(Ok(receipt)) => self.finish_success(&request, receipt).await,
            Some(Err(e)) => self.finish_failure(&request, e).await,
            None => {
                tracing::debug!("Upload '{}' attempt {} interrupted", request.name, request.attempt);
            }
        }
    }

    async fn finish_success(&self, request: &TransferRequest, receipt: TransferReceipt) {
        let info = {
            let mut q = self.queue.lock().await;
            q.complete(request.id, request.attempt, receipt.location)
        };
        let Some(info) = info else {
            tracing::debug!("Discarding stale success for '{}'", request.name);
            return;
        };

        tracing::info!(
            "Upload complete: '{}' -> {}",
            info.name,
            info.result_location.as_deref().unwrap_or_default()
        );
        self.emitter.emit_progress(&UploadItemProgress {
            id: info.id,
            name: info.name.clone(),
            percent: info.percent,
            uploaded_bytes: info.size_bytes,
            total_bytes: info.size_bytes,
            authoritative: true,
        });
        self.ensure_in_history(&info).await;
        self.try_start_next().await;
    }

    async fn finish_failure(&self, request: &TransferRequest, error: anyhow::Error) {
        let reason = error.to_string();
        let recorded = {
            let mut q = self.queue.lock().await;
            q.fail(request.id, request.attempt, reason.clone())
        };
        if !recorded {
            tracing::debug!("Discarding stale failure for '{}': {}", request.name, reason);
            return;
        }

        tracing::error!("Upload error '{}': {}", request.name, UploadError::Transfer(reason));
        self.try_start_next().await;
    }

    /// Returns `true` once the history store holds the item.
    async fn ensure_in_history(&self, info: &UploadItemInfo) -> bool {
        match self.history.contains(info.id).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("History lookup failed for '{}': {}", info.name, e);
                return false;
            }
        }

        let Some(entry) = NewHistoryEntry::from_info(info) else {
            return false;
        };
        match self.history.append(entry).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("History append failed for '{}': {}", info.name, e);
                false
            }
        }
    }

    async fn forward_progress(self, id: Uuid, attempt: u64, mut rx: mpsc::Receiver<f64>) {
        let mut throttle = ProgressThrottle::new(PROGRESS_THROTTLE_MS);
        while let Some(percent) = rx.recv().await {
            let progress = {
                let mut q = self.queue.lock().await;
                q.update_progress(id, attempt, percent)
            };
            match progress {
                Some(p) => {
                    if throttle.should_emit() {
                        self.emitter.emit_progress(&p);
                    }
                }
                None => break,
            }
        }
    }

    async fn simulate_progress(self, id: Uuid, attempt: u64, cancel_token: CancellationToken) {
        loop {
            tokio::select! {
                _ = self.ticks.tick() => {}
                _ = cancel_token.cancelled() => break,
            }
            let increment = self.simulation.next_increment();
            let tick = {
                let mut q = self.queue.lock().await;
                q.simulate_tick(id, attempt, increment, self.simulation.cap_percent)
            };
            match tick {
                SimTick::Advanced(p) => self.emitter.emit_progress(&p),
                SimTick::Idle => {}
                SimTick::Finished => break,
            }
        }
    }
}
