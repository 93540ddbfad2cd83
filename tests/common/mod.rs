#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use uplift_core::core::events::{
    BatchFinished, EventEmitter, UploadItemInfo, UploadItemProgress, UploadStatus,
};
use uplift_lib::backends::TransferBackend;
use uplift_lib::core::history::{HistoryEntry, HistoryStore, MemoryHistory, NewHistoryEntry};
use uplift_lib::core::orchestrator::UploadOrchestrator;
use uplift_lib::core::ticks::{NeverTicks, ProgressSimulation, TickSource};
use uplift_lib::core::validation::{CandidateFile, ValidationRules};
use uplift_lib::models::transfer::{TransferReceipt, TransferRequest};
use uuid::Uuid;

const WAIT_LIMIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(2);

struct Inflight {
    outcome: oneshot::Sender<Result<String, String>>,
    progress: mpsc::Sender<f64>,
}

/// Backend whose transfers stay open until the test resolves them.
#[derive(Default)]
pub struct ScriptedBackend {
    inflight: Mutex<HashMap<Uuid, Inflight>>,
    started: Mutex<Vec<(Uuid, u64)>>,
    cancels: Mutex<Vec<Uuid>>,
    fail_cancel: bool,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_cancel() -> Self {
        Self {
            fail_cancel: true,
            ..Self::default()
        }
    }

    pub fn started(&self) -> Vec<(Uuid, u64)> {
        self.started.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> Vec<Uuid> {
        self.cancels.lock().unwrap().clone()
    }

    pub async fn wait_started(&self, n: usize) {
        eventually(|| self.started.lock().unwrap().len() >= n).await;
    }

    pub fn succeed(&self, id: Uuid) -> bool {
        self.resolve(id, Ok(format!("mock://uploads/{}", id)))
    }

    pub fn fail(&self, id: Uuid, message: &str) -> bool {
        self.resolve(id, Err(message.to_string()))
    }

    pub async fn report_progress(&self, id: Uuid, percent: f64) {
        let sender = self
            .inflight
            .lock()
            .unwrap()
            .get(&id)
            .map(|i| i.progress.clone())
            .expect("transfer not in flight");
        sender.send(percent).await.unwrap();
    }

    fn resolve(&self, id: Uuid, outcome: Result<String, String>) -> bool {
        match self.inflight.lock().unwrap().remove(&id) {
            Some(inflight) => inflight.outcome.send(outcome).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl TransferBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: mpsc::Sender<f64>,
    ) -> anyhow::Result<TransferReceipt> {
        let (tx, rx) = oneshot::channel();
        self.inflight.lock().unwrap().insert(
            request.id,
            Inflight {
                outcome: tx,
                progress,
            },
        );
        self.started.lock().unwrap().push((request.id, request.attempt));

        match rx.await {
            Ok(Ok(location)) => Ok(TransferReceipt { location }),
            Ok(Err(message)) => Err(anyhow!(message)),
            Err(_) => std::future::pending().await,
        }
    }

    async fn cancel(&self, id: Uuid) -> anyhow::Result<()> {
        self.cancels.lock().unwrap().push(id);
        if self.fail_cancel {
            Err(anyhow!("backend unreachable"))
        } else {
            Ok(())
        }
    }
}

/// History store that can never confirm anything.
pub struct BrokenHistory;

#[async_trait]
impl HistoryStore for BrokenHistory {
    async fn append(&self, _entry: NewHistoryEntry) -> anyhow::Result<HistoryEntry> {
        Err(anyhow!("disk full"))
    }

    async fn contains(&self, _record_id: Uuid) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn list(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        Ok(Vec::new())
    }

    async fn remove(&self, _id: u64) -> anyhow::Result<HistoryEntry> {
        Err(anyhow!("Upload not found"))
    }

    async fn clear(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// In-memory history whose lookups are slow, widening the window between
/// `contains` and `append`.
pub struct SlowLookupHistory {
    inner: MemoryHistory,
    delay: Duration,
}

impl SlowLookupHistory {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryHistory::new(),
            delay,
        }
    }
}

#[async_trait]
impl HistoryStore for SlowLookupHistory {
    async fn append(&self, entry: NewHistoryEntry) -> anyhow::Result<HistoryEntry> {
        self.inner.append(entry).await
    }

    async fn contains(&self, record_id: Uuid) -> anyhow::Result<bool> {
        tokio::time::sleep(self.delay).await;
        self.inner.contains(record_id).await
    }

    async fn list(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        self.inner.list().await
    }

    async fn remove(&self, id: u64) -> anyhow::Result<HistoryEntry> {
        self.inner.remove(id).await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        self.inner.clear().await
    }
}

#[derive(Default)]
pub struct RecordingEmitter {
    max_active: Mutex<usize>,
    progress: Mutex<Vec<UploadItemProgress>>,
    batches: Mutex<Vec<BatchFinished>>,
}

impl RecordingEmitter {
    pub fn max_active(&self) -> usize {
        *self.max_active.lock().unwrap()
    }

    pub fn progress(&self) -> Vec<UploadItemProgress> {
        self.progress.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<BatchFinished> {
        self.batches.lock().unwrap().clone()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_queue_state(&self, items: &[UploadItemInfo]) {
        let active = items
            .iter()
            .filter(|i| i.status == UploadStatus::Transferring)
            .count();
        let mut max = self.max_active.lock().unwrap();
        *max = (*max).max(active);
    }

    fn emit_progress(&self, progress: &UploadItemProgress) {
        self.progress.lock().unwrap().push(progress.clone());
    }

    fn emit_batch_finished(&self, summary: &BatchFinished) {
        self.batches.lock().unwrap().push(summary.clone());
    }
}

pub struct Harness {
    pub orchestrator: UploadOrchestrator,
    pub backend: Arc<ScriptedBackend>,
    pub emitter: Arc<RecordingEmitter>,
    pub history: Arc<dyn HistoryStore>,
}

impl Harness {
    pub fn new(max_concurrent: u32) -> Self {
        Self::with_parts(
            max_concurrent,
            ScriptedBackend::new(),
            Arc::new(MemoryHistory::new()),
        )
    }

    pub fn with_parts(
        max_concurrent: u32,
        backend: ScriptedBackend,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let backend = Arc::new(backend);
        let emitter = Arc::new(RecordingEmitter::default());
        let orchestrator = UploadOrchestrator::new(
            backend.clone(),
            history.clone(),
            emitter.clone(),
            max_concurrent,
        )
        .with_ticks(Arc::new(NeverTicks))
        .with_stagger_delay(0);
        Self {
            orchestrator,
            backend,
            emitter,
            history,
        }
    }

    pub fn with_ticks(mut self, ticks: Arc<dyn TickSource>) -> Self {
        self.orchestrator = self.orchestrator.with_ticks(ticks);
        self
    }

    pub fn with_simulation(mut self, simulation: ProgressSimulation) -> Self {
        self.orchestrator = self.orchestrator.with_simulation(simulation);
        self
    }

    pub async fn percent(&self, id: Uuid) -> f64 {
        self.orchestrator.get(id).await.unwrap().percent
    }

    /// Enqueues `n` small PNGs and returns their ids in queue order.
    pub async fn enqueue(&self, n: usize) -> Vec<Uuid> {
        let files = (0..n)
            .map(|i| CandidateFile::new(format!("photo-{}.png", i), 1_000, "image/png"))
            .collect();
        let report = self
            .orchestrator
            .enqueue(files, &ValidationRules::default())
            .await;
        assert!(report.rejected.is_empty());
        report.accepted.into_iter().map(|i| i.id).collect()
    }

    pub async fn status(&self, id: Uuid) -> UploadStatus {
        self.orchestrator.get(id).await.unwrap().status
    }

    pub async fn wait_status(&self, id: Uuid, status: UploadStatus) -> UploadItemInfo {
        let items = wait_for(&self.orchestrator, |items| {
            items.iter().any(|i| i.id == id && i.status == status)
        })
        .await;
        items.into_iter().find(|i| i.id == id).unwrap()
    }
}

pub async fn eventually<F: FnMut() -> bool>(mut cond: F) {
    tokio::time::timeout(WAIT_LIMIT, async {
        while !cond() {
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn wait_for<F>(orchestrator: &UploadOrchestrator, mut cond: F) -> Vec<UploadItemInfo>
where
    F: FnMut(&[UploadItemInfo]) -> bool,
{
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            let items = orchestrator.get_state().await;
            if cond(&items) {
                return items;
            }
            tokio::time::sleep(POLL).await;
        }
    })
    .await
    .expect("queue never reached the expected state")
}
