use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use tokio::runtime::Handle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::ScratchMode, error::ApiError};

/// Owner of the directory downloads are staged in before being served.
///
/// In [`ScratchMode::Shared`] every job writes straight into the root, which is
/// purged when a job begins. Nothing serializes concurrent jobs: one request's
/// purge can delete another request's file mid-flight.
#[derive(Debug, Clone)]
pub struct ScratchSpace {
    root: PathBuf,
    mode: ScratchMode,
}

impl ScratchSpace {
    pub fn new(root: PathBuf, mode: ScratchMode) -> Self {
        Self { root, mode }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> ScratchMode {
        self.mode
    }

    pub async fn ensure_root(&self) -> Result<(), ApiError> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|error| {
            ApiError::internal(format!(
                "Could not create scratch directory {}: {error}",
                self.root.display()
            ))
        })
    }

    /// Deletes every entry directly inside the root. Individual failures are
    /// logged and skipped.
    pub async fn purge(&self) {
        self.purge_with(remove_entry).await;
    }

    async fn purge_with<F, Fut>(&self, mut remove: F)
    where
        F: FnMut(PathBuf, bool) -> Fut,
        Fut: Future<Output = io::Result<()>>,
    {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(error) => {
                if error.kind() != ErrorKind::NotFound {
                    warn!("Could not open scratch directory for purge: {error}");
                }
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(error) => {
                    warn!("Could not iterate scratch directory for purge: {error}");
                    break;
                }
            };

            let path = entry.path();
            let is_dir = entry
                .file_type()
                .await
                .map(|file_type| file_type.is_dir())
                .unwrap_or(false);

            match remove(path.clone(), is_dir).await {
                Ok(()) => debug!("Purged {:?}", path),
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => warn!("Could not purge {:?}: {error}", path),
            }
        }
    }

    /// Prepares the directory a single download writes into.
    pub async fn begin_job(&self) -> Result<ScratchJob, ApiError> {
        match self.mode {
            ScratchMode::Shared => {
                self.purge().await;
                self.ensure_root().await?;
                Ok(ScratchJob {
                    dir: self.root.clone(),
                    owns_dir: false,
                    artifact: None,
                })
            }
            ScratchMode::PerRequest => {
                let dir = self.root.join(Uuid::new_v4().to_string());
                tokio::fs::create_dir_all(&dir).await.map_err(|error| {
                    ApiError::internal(format!("Could not prepare download directory: {error}"))
                })?;
                Ok(ScratchJob {
                    dir,
                    owns_dir: true,
                    artifact: None,
                })
            }
        }
    }
}

/// Scoped claim on one download's scratch files. Dropping it deletes the
/// tracked artifact and, for per-request jobs, the job directory.
#[derive(Debug)]
pub struct ScratchJob {
    dir: PathBuf,
    owns_dir: bool,
    artifact: Option<PathBuf>,
}

impl ScratchJob {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn track(&mut self, artifact: PathBuf) {
        self.artifact = Some(artifact);
    }
}

impl Drop for ScratchJob {
    fn drop(&mut self) {
        if let Some(artifact) = self.artifact.take() {
            match std::fs::remove_file(&artifact) {
                Ok(()) => debug!("Removed served file {:?}", artifact),
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => warn!("Could not remove scratch file {:?}: {error}", artifact),
            }
        }

        if self.owns_dir {
            let dir = std::mem::take(&mut self.dir);
            match Handle::try_current() {
                Ok(handle) => drop(handle.spawn_blocking(move || remove_job_dir(&dir))),
                Err(_) => remove_job_dir(&dir),
            }
        }
    }
}

async fn remove_entry(path: PathBuf, is_dir: bool) -> io::Result<()> {
    if is_dir {
        tokio::fs::remove_dir_all(&path).await
    } else {
        tokio::fs::remove_file(&path).await
    }
}

fn remove_job_dir(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => debug!("Removed job directory {:?}", dir),
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => warn!("Could not remove job directory {:?}: {error}", dir),
    }
}
