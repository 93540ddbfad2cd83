use async_trait::async_trait;
use uuid::Uuid;

use crate::models::transfer::{TransferReceipt, TransferRequest};

/// Performs the actual transfer of one file.
///
/// `progress` may carry authoritative percentages; a backend that never sends
/// on it leaves progress to the orchestrator's simulation. Timeouts are the
/// backend's concern and should surface as an `Err`.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    fn name(&self) -> &str;
    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: tokio::sync::mpsc::Sender<f64>,
    ) -> anyhow::Result<TransferReceipt>;
    /// Best-effort notice that an upload was cancelled locally.
    async fn cancel(&self, id: Uuid) -> anyhow::Result<()>;
}
