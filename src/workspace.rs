//! Scoped scratch directory for one run.

use anyhow::{Context, Result};
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;

/// Temporary directory holding intermediate files of a run.
///
/// Removed with everything in it when dropped, whether the run succeeded
/// or not.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
}

impl RunWorkspace {
    /// Create a workspace under the system temporary directory.
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("blocksmith-")
            .tempdir()
            .context("Failed to create run workspace")?;
        debug!("Run workspace at {:?}", dir.path());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}
