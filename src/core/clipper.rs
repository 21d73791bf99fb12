//! On-demand clip extraction.
//!
//! Carves a bounded time range out of the current snapshot into a
//! standalone encoded clip plus a thumbnail, reporting fractional
//! progress along the way. Requests are independent I/O keyed by their
//! own id, so any number may run concurrently.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::adapters::{ClipEncoder, ToolError};
use crate::domain::clip::ClipValidationError;
use crate::domain::{ClipArtifact, ClipRequest, EventKind, EventSink};

use super::fixator::{FixateError, SnapshotFixator};

#[derive(Debug, Error)]
pub enum ClipError {
    #[error(transparent)]
    Invalid(#[from] ClipValidationError),

    #[error("Could not refresh snapshot for clipping: {0}")]
    Fixation(#[from] FixateError),

    #[error(
        "Requested end time ({requested}s) exceeds available video duration ({available}s)"
    )]
    OutOfRange { requested: f64, available: f64 },

    #[error("Could not measure snapshot duration: {0}")]
    Probe(#[source] ToolError),

    #[error("Clip encode failed: {0}")]
    Encode(#[source] ToolError),

    #[error("Thumbnail generation failed: {0}")]
    Thumbnail(#[source] ToolError),
}

/// Extracts clips from the snapshot the fixator maintains.
pub struct ClipExtractor {
    snapshot: PathBuf,
    clips_dir: PathBuf,
    fixator: Arc<SnapshotFixator>,
    encoder: Arc<dyn ClipEncoder>,
    events: EventSink,
}

impl ClipExtractor {
    pub fn new(
        snapshot: PathBuf,
        clips_dir: PathBuf,
        fixator: Arc<SnapshotFixator>,
        encoder: Arc<dyn ClipEncoder>,
        events: EventSink,
    ) -> Self {
        Self {
            snapshot,
            clips_dir,
            fixator,
            encoder,
            events,
        }
    }

    /// Produce a clip and thumbnail for `request`.
    ///
    /// Validation happens before any subprocess is spawned. Every failure
    /// path emits a `ClipFailed` event before returning; success emits
    /// `ClipCompleted`.
    pub async fn create_clip(&self, request: ClipRequest) -> Result<ClipArtifact, ClipError> {
        match self.create_clip_inner(request).await {
            Ok(artifact) => {
                self.events
                    .emit(EventKind::ClipCompleted {
                        request_id: request.id,
                        clip_path: artifact.clip_path.clone(),
                        thumbnail_path: artifact.thumbnail_path.clone(),
                    });
                Ok(artifact)
            }
            Err(e) => {
                warn!(request_id = %request.id, "clip request failed: {}", e);
                self.events
                    .emit(EventKind::ClipFailed {
                        request_id: request.id,
                        reason: e.to_string(),
                    });
                Err(e)
            }
        }
    }

    async fn create_clip_inner(&self, request: ClipRequest) -> Result<ClipArtifact, ClipError> {
        request.validate()?;

        // Cut from the freshest possible snapshot
        self.fixator.fixate().await?;

        let available = self
            .encoder
            .probe_duration(&self.snapshot)
            .await
            .map_err(ClipError::Probe)?;

        if request.end > available {
            return Err(ClipError::OutOfRange {
                requested: request.end,
                available,
            });
        }

        let clip_path = request.clip_path(&self.clips_dir);
        let thumbnail_path = request.thumbnail_path(&self.clips_dir);

        info!(
            request_id = %request.id,
            start = request.start,
            end = request.end,
            quality = ?request.quality,
            "creating clip"
        );

        // Forward encoder progress as clamped, non-decreasing percent
        let (progress_tx, mut progress_rx) = mpsc::channel::<f64>(16);
        let events = self.events.clone();
        let request_id = request.id;
        let forwarder = tokio::spawn(async move {
            let mut last = 0.0_f64;
            while let Some(fraction) = progress_rx.recv().await {
                let percent = (fraction * 100.0).clamp(0.0, 100.0);
                if percent > last {
                    last = percent;
                    events
                        .emit(EventKind::ClipProgress {
                            request_id,
                            percent,
                        });
                }
            }
            last
        });

        let encode_result = self
            .encoder
            .encode_clip(
                &self.snapshot,
                &clip_path,
                request.start,
                request.duration(),
                request.quality.preset(),
                progress_tx,
            )
            .await;

        // The sender is consumed by the encoder; once it returns the
        // forwarder drains and finishes.
        let last_percent = forwarder.await.unwrap_or(0.0);

        encode_result.map_err(ClipError::Encode)?;

        if last_percent < 100.0 {
            self.events
                .emit(EventKind::ClipProgress {
                    request_id,
                    percent: 100.0,
                });
        }

        // Thumbnail only after a successful encode; a failed clip leaves
        // no artifact considered valid
        self.encoder
            .thumbnail(&clip_path, &thumbnail_path, request.start)
            .await
            .map_err(ClipError::Thumbnail)?;

        Ok(ClipArtifact {
            clip_path,
            thumbnail_path,
        })
    }
}
