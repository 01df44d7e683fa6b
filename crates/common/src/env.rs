//! Environment/runtime helpers
//!
//! Sanity checks to ensure expected directories exist at startup.

use std::path::PathBuf;

use tracing::warn;

/// Ensure the host data directory exists and return it.
///
/// Relative paths are accepted but logged, since they depend on the working directory.
pub fn ensure_data_dir(data_dir: &str) -> anyhow::Result<PathBuf> {
    let path = PathBuf::from(data_dir);
    if path.is_relative() {
        warn!(%data_dir, "data directory is relative to the working directory");
    }
    std::fs::create_dir_all(&path).map_err(|e| anyhow::anyhow!("cannot create {data_dir}: {e}"))?;
    Ok(path)
}
