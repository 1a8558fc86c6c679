//! Single-run lock.
//!
//! Both canonical artifacts are overwritten by every run, so two runs on the
//! same data directory must not interleave. The lock is a file created with
//! `create_new`; it holds the owner's pid and start time and is removed when
//! the [`RunLock`] is dropped. A lock older than the configured staleness
//! limit is assumed to belong to a crashed run and is taken over.

use crate::error::{PipelineError, Result};
use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock at `path`, replacing it if it is older than
    /// `stale_after`.
    pub async fn acquire(path: &Path, stale_after: Duration) -> Result<Self> {
        let io_err = |source: io::Error| PipelineError::Output {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        match Self::create(path).await {
            Ok(lock) => return Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(io_err(e)),
        }

        let holder = fs::read_to_string(path).await.unwrap_or_default();
        let age = fs::metadata(path)
            .await
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();

        if age < stale_after {
            warn!(
                path = %path.display(),
                holder = %holder.trim().replace('\n', " "),
                age_secs = age.as_secs(),
                "Another run is in progress"
            );
            return Err(PipelineError::AlreadyRunning {
                path: path.to_path_buf(),
            });
        }

        warn!(
            path = %path.display(),
            holder = %holder.trim().replace('\n', " "),
            age_secs = age.as_secs(),
            "Taking over stale run lock"
        );
        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }
        Self::create(path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                PipelineError::AlreadyRunning {
                    path: path.to_path_buf(),
                }
            } else {
                io_err(e)
            }
        })
    }

    async fn create(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path).await?;
        let contents = format!("pid={}\nstarted={}\n", std::process::id(), Utc::now().to_rfc3339());
        file.write_all(contents.as_bytes()).await?;
        file.flush().await?;
        info!(path = %path.display(), "Run lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

// Drop cannot await, so release goes through std::fs.
impl Drop for RunLock {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "Run lock released"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "Could not remove run lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_second_acquire_is_rejected_until_release() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".clipping.lock");

        let first = RunLock::acquire(&path, HOUR).await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with(&format!("pid={}", std::process::id())));

        let err = RunLock::acquire(&path, HOUR).await.unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyRunning { .. }));
        assert_eq!(err.exit_code(), 9);

        drop(first);
        assert!(!path.exists());
        let _again = RunLock::acquire(&path, HOUR).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(".clipping.lock");
        std::fs::write(&path, "pid=1\nstarted=2020-01-01T00:00:00Z\n").unwrap();

        let lock = RunLock::acquire(&path, Duration::ZERO).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("2020-01-01"));
        drop(lock);
        assert!(!path.exists());
    }
}
