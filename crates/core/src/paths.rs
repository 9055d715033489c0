//! Centralized path functions for app storage locations.
//!
//! Keeps `dirs::data_dir().join(...)` in one place.

use std::path::{Path, PathBuf};

use crate::storage::STORAGE_KEY;

/// App data root: `~/Library/Application Support/flashdeck/` (macOS) or `~/.local/share/flashdeck/` (Linux).
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("flashdeck"))
}

/// Tracked job collection file inside `dir`: `<dir>/flashdeck.active-jobs.v1.json`.
pub fn job_store_file(dir: &Path) -> PathBuf {
    dir.join(format!("{STORAGE_KEY}.json"))
}

/// Default tracked job collection file: `<app_data_dir>/flashdeck.active-jobs.v1.json`.
pub fn default_job_store_path() -> Option<PathBuf> {
    app_data_dir().map(|d| job_store_file(&d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_store_file() {
        let path = job_store_file(Path::new("/tmp/fd"));
        assert_eq!(path, PathBuf::from("/tmp/fd/flashdeck.active-jobs.v1.json"));
    }

    #[test]
    fn test_default_job_store_path() {
        if let Some(path) = default_job_store_path() {
            assert!(path.to_string_lossy().contains("flashdeck"));
            assert!(path.to_string_lossy().ends_with(".json"));
        }
    }
}
