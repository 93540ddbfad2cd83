use std::path::PathBuf;

pub trait AppPaths: Send + Sync {
    fn data_dir(&self) -> PathBuf;
}

pub struct DesktopPaths;

impl AppPaths for DesktopPaths {
    fn data_dir(&self) -> PathBuf {
        app_data_dir().unwrap_or_else(|| PathBuf::from("."))
    }
}

pub fn app_data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("UPLIFT_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }
    dirs::data_dir().map(|d| d.join("uplift"))
}
