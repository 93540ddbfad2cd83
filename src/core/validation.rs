use std::path::Path;

use serde::{Deserialize, Serialize};
use uplift_core::models::settings::UploadSettings;

use crate::core::error::ValidationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRules {
    pub max_size_bytes: u64,
    /// Exact MIME types (`image/png`), wildcards (`image/*`, `*/*`) or
    /// extension globs (`*.pdf`).
    pub accepted_types: Vec<String>,
    pub max_files: usize,
}

impl ValidationRules {
    pub fn from_settings(settings: &UploadSettings) -> Self {
        Self {
            max_size_bytes: settings.max_size_bytes,
            accepted_types: settings.accepted_types.clone(),
            max_files: settings.max_files,
        }
    }

    pub fn accepts(&self, name: &str, mime_type: &str) -> bool {
        self.accepted_types
            .iter()
            .any(|pattern| pattern_matches(pattern, name, mime_type))
    }
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self::from_settings(&UploadSettings::default())
    }
}

/// A file the caller wants to upload, before it becomes a queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFile {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, size_bytes: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            mime_type: mime_type.into(),
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a regular file: {}", path.display()),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = mime_from_name(&name).to_string();
        Ok(Self {
            name,
            size_bytes: meta.len(),
            mime_type,
        })
    }
}

pub fn validate(file: &CandidateFile, rules: &ValidationRules) -> Result<(), ValidationError> {
    if file.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }

    if file.size_bytes > rules.max_size_bytes {
        return Err(ValidationError::TooLarge {
            size: file.size_bytes,
            limit: rules.max_size_bytes,
        });
    }

    if !rules.accepts(&file.name, &file.mime_type) {
        let shown = if file.mime_type.is_empty() {
            "unknown".to_string()
        } else {
            file.mime_type.clone()
        };
        return Err(ValidationError::UnsupportedType(shown));
    }

    Ok(())
}

fn pattern_matches(pattern: &str, name: &str, mime_type: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let mime_type = mime_type.trim().to_ascii_lowercase();

    if pattern == "*" || pattern == "*/*" {
        return true;
    }

    if let Some(ext) = pattern.strip_prefix("*.") {
        return extension_of(name).is_some_and(|e| e.eq_ignore_ascii_case(ext));
    }

    if let Some(prefix) = pattern.strip_suffix("/*") {
        return mime_type
            .split_once('/')
            .is_some_and(|(major, _)| major == prefix);
    }

    !mime_type.is_empty() && pattern == mime_type
}

fn extension_of(name: &str) -> Option<&str> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

pub fn mime_from_name(name: &str) -> &'static str {
    let ext = extension_of(name).map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("zip") => "application/zip",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}
