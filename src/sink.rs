#![allow(dead_code)]
//! Output sinks for assembled document text.
//!
//! The existence of a document's entry is the resumability marker, so a sink
//! must never expose a partially written entry.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

#[async_trait::async_trait]
pub trait OutputSink: Send + Sync {
    /// Whether a finished result for `name` is already stored.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Store the full text for `name`.
    async fn write(&self, name: &str, text: &str) -> Result<()>;
}

/// Writes `<dir>/<name>.txt`, staging through a hidden file and renaming.
#[derive(Debug, Clone)]
pub struct FsOutputSink {
    dir: PathBuf,
}

impl FsOutputSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.txt", name))
    }

    fn staging_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!(".{}.txt.partial", name))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait::async_trait]
impl OutputSink for FsOutputSink {
    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name);
        tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check output: {:?}", path))
    }

    async fn write(&self, name: &str, text: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create output directory: {:?}", self.dir))?;

        let staging = self.staging_path(name);
        let target = self.path_for(name);
        tokio::fs::write(&staging, text.as_bytes())
            .await
            .with_context(|| format!("Failed to write {:?}", staging))?;
        // rename within one directory is atomic; `target` only ever appears complete
        tokio::fs::rename(&staging, &target)
            .await
            .with_context(|| format!("Failed to move {:?} into place", staging))?;

        debug!("FsOutputSink: wrote {:?} ({} bytes)", target, text.len());
        Ok(())
    }
}
