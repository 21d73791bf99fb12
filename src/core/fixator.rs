//! Snapshot fixation.
//!
//! The raw capture is append-only, non-seekable, and written concurrently
//! by an external process; nothing downstream may read it directly. The
//! fixator periodically remuxes it (stream copy, no re-encode) into a
//! snapshot file that readers can open and measure, replacing the previous
//! snapshot atomically so a reader always sees a complete file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::adapters::{Remuxer, ToolError};

/// What a fixation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixateOutcome {
    /// A new snapshot was produced
    Fixed,

    /// The raw capture has not been modified since the last fixation
    Unchanged,

    /// The size/staleness gate decided a remux was not worth running yet
    Skipped,

    /// The raw capture exists but is still empty
    SourceEmpty,
}

#[derive(Debug, Error)]
pub enum FixateError {
    #[error("Cannot read raw capture: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot remux failed: {0}")]
    Remux(#[from] ToolError),
}

/// Fixation watermark. Updated only after a successful remux + rename.
#[derive(Debug, Default)]
struct Watermark {
    source_mtime: Option<SystemTime>,
    source_size: u64,
    fixed_at: Option<Instant>,
}

/// Converts the raw capture into a seekable snapshot on demand.
///
/// The single mutex enforces the single-writer discipline: concurrent
/// callers (the fixation timer and clip requests) serialize, and the
/// second caller observes an unchanged mtime and no-ops.
pub struct SnapshotFixator {
    raw: PathBuf,
    snapshot: PathBuf,
    scratch: PathBuf,
    remuxer: Arc<dyn Remuxer>,
    state: Mutex<Watermark>,
}

impl SnapshotFixator {
    pub fn new(
        raw: PathBuf,
        snapshot: PathBuf,
        scratch: PathBuf,
        remuxer: Arc<dyn Remuxer>,
    ) -> Self {
        Self {
            raw,
            snapshot,
            scratch,
            remuxer,
            state: Mutex::new(Watermark::default()),
        }
    }

    /// Path of the snapshot this fixator maintains
    pub fn snapshot_path(&self) -> &PathBuf {
        &self.snapshot
    }

    /// Fixate unconditionally (modulo the mtime watermark).
    ///
    /// Returns `Unchanged` without spawning anything when the raw capture
    /// has not been modified since the last successful fixation. On remux
    /// failure the previous snapshot and watermark are left untouched, so
    /// the last known-good snapshot stays usable.
    pub async fn fixate(&self) -> Result<FixateOutcome, FixateError> {
        let mut state = self.state.lock().await;
        self.fixate_locked(&mut state).await
    }

    /// Fixate only if the raw capture grew or the snapshot went stale.
    ///
    /// This is the periodic driver's entry point: it bounds remux
    /// frequency while guaranteeing a maximum snapshot staleness.
    pub async fn fixate_if_due(
        &self,
        staleness: Duration,
    ) -> Result<FixateOutcome, FixateError> {
        let mut state = self.state.lock().await;

        let meta = tokio::fs::metadata(&self.raw).await?;
        let fresh = state
            .fixed_at
            .map(|at| at.elapsed() <= staleness)
            .unwrap_or(false);

        if meta.len() == state.source_size && fresh {
            return Ok(FixateOutcome::Skipped);
        }

        self.fixate_locked(&mut state).await
    }

    async fn fixate_locked(&self, state: &mut Watermark) -> Result<FixateOutcome, FixateError> {
        let meta = tokio::fs::metadata(&self.raw).await?;

        if meta.len() == 0 {
            debug!("raw capture is empty, skipping fixation");
            return Ok(FixateOutcome::SourceEmpty);
        }

        let mtime = meta.modified()?;
        if let Some(last) = state.source_mtime {
            if mtime <= last {
                debug!("raw capture unchanged since last fixation");
                return Ok(FixateOutcome::Unchanged);
            }
        }

        info!(
            size = meta.len(),
            previous = state.source_size,
            "fixating capture into snapshot"
        );

        if let Err(e) = self.remuxer.remux_copy(&self.raw, &self.scratch).await {
            warn!("snapshot remux failed: {}", e);
            return Err(FixateError::Remux(e));
        }

        // Readers see either the old or the new complete snapshot, never
        // a partial one.
        tokio::fs::rename(&self.scratch, &self.snapshot).await?;

        state.source_mtime = Some(mtime);
        state.source_size = meta.len();
        state.fixed_at = Some(Instant::now());

        Ok(FixateOutcome::Fixed)
    }
}
