//! Scoped on-disk staging for uploads that need a seekable file.
//!
//! A [`StagedUpload`] owns its temporary file from creation until it is
//! released or dropped, whichever comes first. Removal happens exactly once;
//! a removal failure is logged and counted, never surfaced to the caller.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, warn};

pub struct StagedUpload {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl StagedUpload {
    /// Write `bytes` to a fresh temporary file.
    ///
    /// `suffix` (e.g. `.mp4`) is kept on the file name so container probing
    /// can use it as a hint. `dir` defaults to the system temp directory.
    pub fn stage(bytes: &[u8], dir: Option<&Path>, suffix: &str) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("density-upload-").suffix(suffix);

        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .context("failed to create staging file")?;

        file.write_all(bytes)
            .context("failed to write upload to staging file")?;
        file.flush().context("failed to flush staging file")?;

        let temp = file.into_temp_path();
        let path = temp.to_path_buf();

        debug!(path = %path.display(), size_bytes = bytes.len(), "staged upload");

        Ok(Self {
            path,
            temp: Some(temp),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the staged file now instead of at drop time
    pub fn release(mut self) {
        self.cleanup();
    }

    fn cleanup(&mut self) {
        let Some(temp) = self.temp.take() else {
            return;
        };

        match temp.close() {
            Ok(()) => debug!(path = %self.path.display(), "released staged upload"),
            Err(e) => {
                telemetry::metrics::DENSITY_STAGING_CLEANUP_FAILURES.inc();
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove staged upload"
                );
            }
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for StagedUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedUpload")
            .field("path", &self.path)
            .field("released", &self.temp.is_none())
            .finish()
    }
}
