use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::mpsc;
use uplift_core::models::settings::SimulationSettings;
use uuid::Uuid;

use crate::backends::traits::TransferBackend;
use crate::models::transfer::{TransferReceipt, TransferRequest};

const CANCEL_DELAY: Duration = Duration::from_millis(200);
const PROGRESS_STEPS: u64 = 10;

/// Stand-in backend with random latency and injectable failures.
pub struct SimulatedBackend {
    latency_min_ms: u64,
    latency_max_ms: u64,
    failure_rate: f64,
    base_url: String,
    report_progress: bool,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::from_settings(&SimulationSettings::default())
    }

    pub fn from_settings(settings: &SimulationSettings) -> Self {
        Self {
            latency_min_ms: settings.latency_min_ms,
            latency_max_ms: settings.latency_max_ms.max(settings.latency_min_ms),
            failure_rate: settings.failure_rate.clamp(0.0, 1.0),
            base_url: "https://example.com/uploads".into(),
            report_progress: false,
        }
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency_min_ms = min_ms;
        self.latency_max_ms = max_ms.max(min_ms);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sends evenly spaced percentages while "uploading" instead of leaving
    /// progress to the orchestrator.
    pub fn with_progress_reports(mut self, enabled: bool) -> Self {
        self.report_progress = enabled;
        self
    }

    fn pick_latency(&self) -> Duration {
        let span = self.latency_max_ms - self.latency_min_ms;
        let jitter = if span == 0 {
            0
        } else {
            rand::random::<u64>() % (span + 1)
        };
        Duration::from_millis(self.latency_min_ms + jitter)
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn transfer(
        &self,
        request: &TransferRequest,
        progress: mpsc::Sender<f64>,
    ) -> anyhow::Result<TransferReceipt> {
        let latency = self.pick_latency();

        if self.report_progress {
            let step = latency / PROGRESS_STEPS as u32;
            for i in 1..PROGRESS_STEPS {
                tokio::time::sleep(step).await;
                let _ = progress.send(i as f64 * 100.0 / PROGRESS_STEPS as f64).await;
            }
            tokio::time::sleep(step).await;
        } else {
            drop(progress);
            tokio::time::sleep(latency).await;
        }

        if self.failure_rate > 0.0 && rand::random::<f64>() < self.failure_rate {
            return Err(anyhow!("Network error occurred during upload"));
        }

        tracing::debug!(
            "Simulated upload of '{}' ({} bytes) finished in {:?}",
            request.name,
            request.size_bytes,
            latency
        );

        Ok(TransferReceipt {
            location: format!("{}/{}", self.base_url, request.name),
        })
    }

    async fn cancel(&self, id: Uuid) -> anyhow::Result<()> {
        tokio::time::sleep(CANCEL_DELAY).await;
        tracing::debug!("Simulated backend acknowledged cancel for {}", id);
        Ok(())
    }
}
