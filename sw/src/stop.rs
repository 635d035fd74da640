//! Global stop marker - a sentinel file observed between iterations
//!
//! Presence of the file means "stop"; its content is never read. Instances
//! check the marker between units of work, not preemptively, so an in-flight
//! unit always runs to completion before a stop is honored.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use tracing::{debug, info};

/// File name of the stop marker inside the data directory
pub const STOP_MARKER: &str = "stop-swarm";

/// Handle on the stop marker file
#[derive(Debug, Clone)]
pub struct StopSignal {
    path: PathBuf,
}

impl StopSignal {
    /// Stop signal living in the given data directory
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(STOP_MARKER),
        }
    }

    /// Request a stop by creating the marker
    pub fn request(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create stop marker directory")?;
        }
        fs::write(&self.path, "").context("Failed to write stop marker")?;
        info!(path = %self.path.display(), "Stop requested");
        Ok(())
    }

    /// Whether a stop has been requested
    pub fn is_requested(&self) -> bool {
        self.path.exists()
    }

    /// Clear the marker. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path).context("Failed to remove stop marker")?;
        debug!(path = %self.path.display(), "Stop marker cleared");
        Ok(true)
    }

    /// Path of the marker file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
