//! JSON output of the daily clipping.
//!
//! The canonical JSON is fully replaced on every run. The document is
//! written to a hidden sibling file first and then renamed over the
//! canonical path, so a reader never sees a half-written clipping and a
//! failed write leaves the previous one intact.

use crate::error::{PipelineError, Result};
use crate::models::StructuredClipping;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "clipping.json".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write `clipping` as pretty-printed UTF-8 JSON to `path`.
///
/// # Arguments
///
/// * `clipping` - The validated clipping
/// * `path` - Canonical output path; parent directories are created
///
/// # Returns
///
/// The size in bytes of the written file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_clipping(clipping: &StructuredClipping, path: &Path) -> Result<u64> {
    let output_err = |source: io::Error| PipelineError::Output {
        path: path.to_path_buf(),
        source,
    };

    let mut json = serde_json::to_string_pretty(clipping)
        .map_err(|e| output_err(io::Error::other(e)))?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create output dir");
            return Err(output_err(e));
        }
    }

    let staging = staging_path(path);
    fs::write(&staging, &json).await.map_err(output_err)?;
    if let Err(e) = fs::rename(&staging, path).await {
        let _ = fs::remove_file(&staging).await;
        return Err(output_err(e));
    }

    let bytes = json.len() as u64;
    info!(bytes, items = clipping.item_count(), "Wrote clipping JSON");
    Ok(bytes)
}
