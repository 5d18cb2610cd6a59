//! On-disk format of the config entry store

use crate::config::ConfigEntry;
use crate::error::IntegrationError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

/// Read the stored entries; a missing file is an empty store
pub async fn read_entries(path: &Path) -> Result<Vec<ConfigEntry>, IntegrationError> {
    let contents = match fs::read(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&contents)?)
}

/// Replace the stored entries
///
/// Readers see either the previous list or the new one, never a partial file.
pub async fn write_entries(path: &Path, entries: &[ConfigEntry]) -> Result<(), IntegrationError> {
    let json = serde_json::to_vec_pretty(entries)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let tmp = tmp_path(path);
    fs::write(&tmp, &json).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        if let Err(cleanup) = fs::remove_file(&tmp).await {
            tracing::debug!("Could not remove {:?}: {}", tmp, cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}
