use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSettings {
    pub schema_version: u32,
    pub upload: UploadSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub history: HistorySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadSettings {
    #[serde(default = "default_max_concurrent_uploads")]
    pub max_concurrent_uploads: u32,
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: u64,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_accepted_types")]
    pub accepted_types: Vec<String>,
    #[serde(default = "default_stagger_delay_ms")]
    pub stagger_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationSettings {
    pub tick_interval_ms: u64,
    pub max_increment: f64,
    pub cap_percent: f64,
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistorySettings {
    pub log_enabled: bool,
    pub file_name: String,
}

fn default_max_concurrent_uploads() -> u32 {
    3
}

fn default_max_size_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_max_files() -> usize {
    10
}

fn default_stagger_delay_ms() -> u64 {
    150
}

pub fn default_accepted_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "application/pdf",
        "text/plain",
        "application/zip",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "video/mp4",
        "audio/mpeg",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: default_max_concurrent_uploads(),
            max_size_bytes: default_max_size_bytes(),
            max_files: default_max_files(),
            accepted_types: default_accepted_types(),
            stagger_delay_ms: default_stagger_delay_ms(),
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            max_increment: 10.0,
            cap_percent: 95.0,
            latency_min_ms: 500,
            latency_max_ms: 1500,
            failure_rate: 0.1,
        }
    }
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            log_enabled: true,
            file_name: "history.jsonl".into(),
        }
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            schema_version: 1,
            upload: UploadSettings::default(),
            simulation: SimulationSettings::default(),
            history: HistorySettings::default(),
        }
    }
}
