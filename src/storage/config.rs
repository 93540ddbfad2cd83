use std::path::PathBuf;

use uplift_core::fs_paths::AppPaths;

use crate::models::settings::AppSettings;

const STORE_PATH: &str = "settings.json";

fn settings_path(paths: &dyn AppPaths) -> PathBuf {
    paths.data_dir().join(STORE_PATH)
}

/// Missing or unreadable settings fall back to defaults.
pub fn load_settings(paths: &dyn AppPaths) -> AppSettings {
    let path = settings_path(paths);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(_) => return AppSettings::default(),
    };

    match serde_json::from_str::<AppSettings>(&content) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!("Ignoring invalid settings in {}: {}", path.display(), e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(paths: &dyn AppPaths, settings: &AppSettings) -> anyhow::Result<()> {
    let path = settings_path(paths);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(&path, content)?;
    Ok(())
}
