//! The per-session object.
//!
//! One `Session` owns the work-dir layout, the fixator, the capture and
//! transcription lifecycles, and the outbound event sender. Commands from
//! the boundary (`start`, `stop`, `create_clip`) land here; there is no
//! ambient global state, so a future multi-session process just holds
//! more than one of these.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::adapters::{FfmpegTool, Language, WhisperModel, WhisperTranscriber, YtDlp};
use crate::config::{PipelineSettings, WorkLayout};
use crate::domain::clip::ClipValidationError;
use crate::domain::{ClipQuality, ClipRequest, EventSink};

use super::clipper::ClipExtractor;
use super::engine::{EngineHandle, TranscriptionEngine};
use super::fixator::SnapshotFixator;
use super::ingestor::{CaptureHandle, IngestError, StreamIngestor};
use super::poll::FsStats;

/// Parameters a capture was started with, kept for recovery restarts.
#[derive(Debug, Clone)]
pub struct StartParams {
    pub source: String,
    pub model: WhisperModel,
    pub language: Language,
}

#[derive(Default)]
struct ActiveState {
    capture: Option<CaptureHandle>,
    engine: Option<EngineHandle>,
    params: Option<StartParams>,
}

/// A single capture/transcription/clip session.
pub struct Session {
    layout: WorkLayout,
    settings: PipelineSettings,
    events: EventSink,
    ffmpeg: Arc<FfmpegTool>,
    fixator: Arc<SnapshotFixator>,
    ingestor: StreamIngestor,
    clipper: Arc<ClipExtractor>,
    active: Mutex<ActiveState>,
}

impl Session {
    /// Build a session over `layout`, creating the directory tree.
    pub async fn create(
        layout: WorkLayout,
        settings: PipelineSettings,
        events: EventSink,
    ) -> anyhow::Result<Self> {
        layout.ensure().await?;

        let ffmpeg = Arc::new(FfmpegTool::new());
        let fixator = Arc::new(SnapshotFixator::new(
            layout.capture(),
            layout.snapshot(),
            layout.snapshot_part(),
            ffmpeg.clone(),
        ));
        let ingestor = StreamIngestor::new(
            YtDlp::new(),
            ffmpeg.clone(),
            fixator.clone(),
            layout.clone(),
            settings,
            events.clone(),
        );
        let clipper = Arc::new(ClipExtractor::new(
            layout.snapshot(),
            layout.clips_dir(),
            fixator.clone(),
            ffmpeg.clone(),
            events.clone(),
        ));

        Ok(Self {
            layout,
            settings,
            events,
            ffmpeg,
            fixator,
            ingestor,
            clipper,
            active: Mutex::new(ActiveState::default()),
        })
    }

    pub fn layout(&self) -> &WorkLayout {
        &self.layout
    }

    /// Whether a capture is currently active
    pub async fn is_active(&self) -> bool {
        self.active.lock().await.capture.is_some()
    }

    /// Start capturing and transcribing `source`.
    ///
    /// An already-active session is stopped first; the transcript cursor
    /// starts from zero for the new capture.
    pub async fn start(
        &self,
        source: &str,
        model: WhisperModel,
        language: Language,
    ) -> Result<(), IngestError> {
        let mut active = self.active.lock().await;
        Self::stop_locked(&mut active).await;

        let capture = self.ingestor.start(source).await?;

        let transcriber = Arc::new(WhisperTranscriber::new(
            model,
            language,
            self.layout.audio_dir(),
        ));
        let engine = TranscriptionEngine::new(
            self.layout.snapshot(),
            self.layout.cycle_audio(),
            self.settings,
            Arc::new(FsStats),
            self.ffmpeg.clone(),
            transcriber,
            self.events.clone(),
        )
        .spawn();

        active.capture = Some(capture);
        active.engine = Some(engine);
        active.params = Some(StartParams {
            source: source.to_string(),
            model,
            language,
        });

        Ok(())
    }

    /// Stop the capture and the transcription loop. A no-op when nothing
    /// is running.
    pub async fn stop(&self) {
        let mut active = self.active.lock().await;
        Self::stop_locked(&mut active).await;
    }

    /// Restart the capture with the parameters of the previous `start`,
    /// optionally deleting the (corrupt) raw capture first. Returns false
    /// when the session was never started.
    pub async fn restart(&self, purge_capture: bool) -> Result<bool, IngestError> {
        let params = {
            let mut active = self.active.lock().await;
            let Some(params) = active.params.clone() else {
                return Ok(false);
            };
            Self::stop_locked(&mut active).await;
            params
        };

        if purge_capture {
            if let Err(e) = tokio::fs::remove_file(self.layout.capture()).await {
                tracing::debug!("could not remove capture file: {}", e);
            }
        }

        info!(source = %params.source, "restarting capture");
        self.start(&params.source, params.model, params.language)
            .await?;
        Ok(true)
    }

    /// Request a clip. Validates synchronously (no subprocess is spawned
    /// for an invalid range) and runs the extraction as its own task;
    /// progress and the outcome arrive as events keyed by the returned id.
    pub fn create_clip(
        &self,
        start: f64,
        end: f64,
        quality: ClipQuality,
    ) -> Result<Uuid, ClipValidationError> {
        let request = ClipRequest::new(start, end, quality);
        request.validate()?;

        let clipper = self.clipper.clone();
        tokio::spawn(async move {
            // Outcome is reported through the event channel
            let _ = clipper.create_clip(request).await;
        });

        Ok(request.id)
    }

    /// Run a clip request to completion (used by the one-shot CLI path).
    pub async fn create_clip_blocking(
        &self,
        start: f64,
        end: f64,
        quality: ClipQuality,
    ) -> Result<crate::domain::ClipArtifact, super::clipper::ClipError> {
        let request = ClipRequest::new(start, end, quality);
        self.clipper.create_clip(request).await
    }

    /// Direct access to the fixator (recovery and diagnostics)
    pub fn fixator(&self) -> &Arc<SnapshotFixator> {
        &self.fixator
    }

    async fn stop_locked(active: &mut ActiveState) {
        if let Some(engine) = active.engine.take() {
            engine.stop().await;
        }
        if let Some(capture) = active.capture.take() {
            capture.stop().await;
        }
    }
}
