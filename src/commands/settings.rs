use crate::models::settings::AppSettings;
use crate::storage::config;
use crate::AppState;

pub async fn get_settings(state: &AppState) -> Result<AppSettings, String> {
    Ok(state.settings.lock().await.clone())
}

/// Merges a partial JSON object into the current settings, e.g.
/// `{"upload": {"max_files": 20}}`.
///
/// Upload limits, accepted types and the launch stagger apply immediately.
/// `simulation` and `history` changes are saved and take effect on the next
/// start.
pub async fn update_settings(state: &AppState, partial: String) -> Result<AppSettings, String> {
    let updated = {
        let mut current = state.settings.lock().await;

        let patch: serde_json::Value =
            serde_json::from_str(&partial).map_err(|e| format!("Invalid JSON: {}", e))?;
        let mut current_val =
            serde_json::to_value(&*current).map_err(|e| format!("Serialize: {}", e))?;
        merge_json(&mut current_val, &patch);
        let updated: AppSettings =
            serde_json::from_value(current_val).map_err(|e| format!("Deserialize: {}", e))?;
        config::save_settings(state.paths.as_ref(), &updated)
            .map_err(|e| format!("Save: {}", e))?;

        *current = updated.clone();
        updated
    };

    apply_upload_settings(state, &updated).await;
    Ok(updated)
}

pub async fn reset_settings(state: &AppState) -> Result<AppSettings, String> {
    let defaults = AppSettings::default();
    config::save_settings(state.paths.as_ref(), &defaults).map_err(|e| format!("Save: {}", e))?;
    *state.settings.lock().await = defaults.clone();
    apply_upload_settings(state, &defaults).await;
    Ok(defaults)
}

async fn apply_upload_settings(state: &AppState, settings: &AppSettings) {
    state
        .orchestrator
        .set_stagger_delay(settings.upload.stagger_delay_ms)
        .await;
    state
        .orchestrator
        .set_max_concurrent(settings.upload.max_concurrent_uploads)
        .await;
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            match base_obj.get_mut(key) {
                Some(existing) if value.is_object() && existing.is_object() => {
                    merge_json(existing, value)
                }
                _ => {
                    base_obj.insert(key.clone(), value.clone());
                }
            }
        }
    }
}
