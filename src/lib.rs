use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use uplift_core::fs_paths::{AppPaths, DesktopPaths};

use crate::backends::SimulatedBackend;
use crate::core::events::LogEventEmitter;
use crate::core::history::{HistoryStore, MemoryHistory};
use crate::core::orchestrator::UploadOrchestrator;
use crate::core::ticks::{ticks_from_settings, ProgressSimulation};
use crate::models::settings::AppSettings;

pub mod backends;
pub mod commands;
pub mod core;
pub mod models;
pub mod storage;

pub struct AppState {
    pub orchestrator: UploadOrchestrator,
    pub settings: Arc<tokio::sync::Mutex<AppSettings>>,
    pub paths: Arc<dyn AppPaths>,
}

impl AppState {
    /// Loads settings and history from the data dir and wires the simulated
    /// backend.
    pub async fn initialize(paths: Arc<dyn AppPaths>) -> anyhow::Result<Self> {
        let settings = storage::config::load_settings(paths.as_ref());

        let history: Arc<dyn HistoryStore> = if settings.history.log_enabled {
            let log_path = paths.data_dir().join(&settings.history.file_name);
            Arc::new(MemoryHistory::load(&log_path).await?)
        } else {
            Arc::new(MemoryHistory::new())
        };

        let orchestrator = UploadOrchestrator::new(
            Arc::new(SimulatedBackend::from_settings(&settings.simulation)),
            history,
            Arc::new(LogEventEmitter::new()),
            settings.upload.max_concurrent_uploads,
        )
        .with_ticks(Arc::from(ticks_from_settings(&settings.simulation)))
        .with_simulation(ProgressSimulation::from_settings(&settings.simulation))
        .with_stagger_delay(settings.upload.stagger_delay_ms);

        tracing::info!(
            "Upload queue ready (max {} concurrent, data dir {})",
            settings.upload.max_concurrent_uploads,
            paths.data_dir().display()
        );

        Ok(Self::with_orchestrator(orchestrator, settings, paths))
    }

    pub fn with_orchestrator(
        orchestrator: UploadOrchestrator,
        settings: AppSettings,
        paths: Arc<dyn AppPaths>,
    ) -> Self {
        Self {
            orchestrator,
            settings: Arc::new(tokio::sync::Mutex::new(settings)),
            paths,
        }
    }
}

pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let files: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if let Err(e) = runtime.block_on(upload_files(files)) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn upload_files(files: Vec<PathBuf>) -> anyhow::Result<()> {
    if files.is_empty() {
        anyhow::bail!("usage: uplift <file>...");
    }

    let state = AppState::initialize(Arc::new(DesktopPaths)).await?;

    let report = commands::uploads::add_paths(&state, files)
        .await
        .map_err(anyhow::Error::msg)?;
    for rejection in &report.rejected {
        tracing::warn!("Skipped '{}': {}", rejection.name, rejection.reason);
    }

    let started = commands::uploads::start_upload(&state)
        .await
        .map_err(anyhow::Error::msg)?;
    if !started.admitted.is_empty() || started.pending > 0 {
        state.orchestrator.wait_until_idle().await;
    }

    let snapshot = commands::uploads::get_batch_snapshot(&state)
        .await
        .map_err(anyhow::Error::msg)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
