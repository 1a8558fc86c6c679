//! Download staging, completion watching and artifact normalization.
//!
//! The browser downloads into a dedicated staging directory that is emptied
//! before every run, so whatever completed PDF shows up there belongs to this
//! run. The canonical PDF lives outside staging and is only replaced once a
//! new download has fully landed.

use crate::error::{PipelineError, Result};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, instrument, warn};

/// Suffix Chromium gives a file while it is still being written.
pub const PARTIAL_SUFFIX: &str = "crdownload";

/// One look at the staging directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DownloadScan {
    /// In-progress downloads.
    pub transient: Vec<PathBuf>,
    /// Finished PDFs, in discovery order.
    pub completed: Vec<PathBuf>,
}

/// Something the watcher can poll for download state.
pub trait DownloadProbe {
    fn location(&self) -> &Path;

    async fn scan(&self) -> io::Result<DownloadScan>;
}

/// Probe over a real directory.
pub struct DownloadDir {
    dir: PathBuf,
}

impl DownloadDir {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

fn is_transient(name: &str) -> bool {
    name.ends_with(&format!(".{PARTIAL_SUFFIX}")) || name.starts_with(".com.google.Chrome.")
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

impl DownloadProbe for DownloadDir {
    fn location(&self) -> &Path {
        &self.dir
    }

    async fn scan(&self) -> io::Result<DownloadScan> {
        let mut scan = DownloadScan::default();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if is_transient(&name) {
                scan.transient.push(path);
            } else if is_pdf(&path) && entry.file_type().await?.is_file() {
                scan.completed.push(path);
            }
        }
        // read_dir order is platform-dependent
        scan.transient.sort();
        scan.completed.sort();
        Ok(scan)
    }
}

/// Poll `probe` every `poll` until a completed PDF exists and nothing is
/// still in flight, or fail once `budget` is spent.
#[instrument(level = "info", skip(probe), fields(dir = %probe.location().display()))]
pub async fn wait_for_download<P: DownloadProbe>(
    probe: &P,
    budget: Duration,
    poll: Duration,
) -> Result<PathBuf> {
    let started = Instant::now();
    let deadline = started + budget;
    loop {
        let scan = probe.scan().await.map_err(|source| PipelineError::Artifact {
            path: probe.location().to_path_buf(),
            source,
        })?;

        if !scan.transient.is_empty() {
            debug!(in_flight = scan.transient.len(), "Download still in progress");
        } else if let Some(first) = scan.completed.first() {
            if scan.completed.len() > 1 {
                warn!(candidates = scan.completed.len(), "Several PDFs in staging; taking the first");
            }
            info!(
                path = %first.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Download complete"
            );
            return Ok(first.clone());
        }

        if Instant::now() >= deadline {
            warn!(budget_secs = budget.as_secs(), "Download did not finish in time");
            return Err(PipelineError::DownloadTimeout(budget));
        }
        sleep(poll).await;
    }
}

/// Create `dir` if needed and delete every file left in it by earlier runs.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn clear_staging(dir: &Path) -> Result<()> {
    let artifact_err = |source: io::Error| PipelineError::Artifact {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).await.map_err(artifact_err)?;

    let mut removed = 0usize;
    let mut entries = fs::read_dir(dir).await.map_err(artifact_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(artifact_err)? {
        if !entry.file_type().await.map_err(artifact_err)?.is_file() {
            continue;
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(file = %entry.path().display(), error = %e, "Could not remove stale download"),
        }
    }
    if removed > 0 {
        info!(removed, "Cleared stale downloads");
    }
    Ok(())
}

/// Replace `canonical` with `downloaded`, leaving exactly one copy.
#[instrument(level = "info", skip_all, fields(from = %downloaded.display(), to = %canonical.display()))]
pub async fn normalize_artifact(downloaded: &Path, canonical: &Path) -> Result<()> {
    let artifact_err = |source: io::Error| PipelineError::Artifact {
        path: canonical.to_path_buf(),
        source,
    };

    if let Some(parent) = canonical.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(artifact_err)?;
    }

    match fs::remove_file(canonical).await {
        Ok(()) => info!("Removed previous edition"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(artifact_err(e)),
    }

    match fs::rename(downloaded, canonical).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("Staging is on another filesystem; copying instead of renaming");
            fs::copy(downloaded, canonical).await.map_err(artifact_err)?;
            fs::remove_file(downloaded).await.map_err(artifact_err)?;
        }
        Err(e) => return Err(artifact_err(e)),
    }

    let bytes = fs::metadata(canonical).await.map_err(artifact_err)?.len();
    info!(bytes, "Canonical PDF in place");
    Ok(())
}
