//! Stream ingestion.
//!
//! Turns a user-supplied source reference into a running capture process
//! and keeps a fresh snapshot available while it runs. The capture child
//! is supervised: any exit, clean or not, ends the capture and is
//! reported as terminal status.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adapters::ffmpeg::drain_stderr_tail;
use crate::adapters::{FfmpegTool, ResolveError, ToolError, YtDlp};
use crate::config::{PipelineSettings, WorkLayout};
use crate::domain::{CaptureSession, EventKind, EventSink};

use super::fixator::{FixateOutcome, SnapshotFixator};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("Failed to start capture: {0}")]
    Capture(#[from] ToolError),
}

/// Resolves sources, launches captures, and drives periodic fixation.
pub struct StreamIngestor {
    ytdlp: YtDlp,
    ffmpeg: Arc<FfmpegTool>,
    fixator: Arc<SnapshotFixator>,
    layout: WorkLayout,
    settings: PipelineSettings,
    events: EventSink,
}

impl StreamIngestor {
    pub fn new(
        ytdlp: YtDlp,
        ffmpeg: Arc<FfmpegTool>,
        fixator: Arc<SnapshotFixator>,
        layout: WorkLayout,
        settings: PipelineSettings,
        events: EventSink,
    ) -> Self {
        Self {
            ytdlp,
            ffmpeg,
            fixator,
            layout,
            settings,
            events,
        }
    }

    /// Check a source reference without spawning anything.
    pub fn is_valid_source(reference: &str) -> bool {
        YtDlp::is_valid_source(reference)
    }

    /// Validate, resolve, and launch a capture.
    ///
    /// On success the returned handle owns the capture child and the
    /// fixation timer; the capture runs until it exits on its own or the
    /// handle is stopped.
    pub async fn start(&self, source: &str) -> Result<CaptureHandle, IngestError> {
        self.events
            .emit(EventKind::CaptureStatus {
                message: "Starting capture process...".to_string(),
            });

        if YtDlp::needs_extraction(source) {
            self.events
                .emit(EventKind::CaptureStatus {
                    message: "Getting stream URL...".to_string(),
                });
        }

        let stream = match self.ytdlp.resolve(source).await {
            Ok(stream) => stream,
            Err(e) => {
                // Platform reasons (not started / ended / auth) surface as
                // readable status, not just an error return
                self.events
                    .emit(EventKind::CaptureStatus {
                        message: e.to_string(),
                    });
                return Err(e.into());
            }
        };

        let message = if stream.audio_url().is_some() {
            "Got video and audio URLs"
        } else {
            "Got stream URL"
        };
        self.events
            .emit(EventKind::CaptureStatus {
                message: message.to_string(),
            });

        let session = CaptureSession {
            source_url: source.to_string(),
            stream: stream.clone(),
        };

        let mut child = self.ffmpeg.spawn_capture(&stream, &self.layout.capture())?;
        info!(source, "capture process started");
        self.events
            .emit(EventKind::CaptureStatus {
                message: "Started ffmpeg capture process".to_string(),
            });

        // Capture diagnostics go to the log; the supervisor keeps a short
        // tail for the exit report.
        let stderr_tail = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(drain_stderr_tail(stderr, 8)));

        let fixation = self.spawn_fixation_timer();

        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        let events = self.events.clone();

        let supervisor = tokio::spawn(async move {
            let exited = tokio::select! {
                status = child.wait() => status.ok(),
                _ = kill_rx.recv() => {
                    // Explicit stop, or the owning session was dropped
                    if let Err(e) = child.kill().await {
                        debug!("capture child already gone: {}", e);
                    }
                    None
                }
            };

            fixation.abort();

            if let Some(handle) = stderr_tail {
                if let Ok(tail) = handle.await {
                    for line in &tail {
                        debug!(target: "streamscribe::capture", "{}", line);
                    }
                }
            }

            match exited {
                Some(status) => {
                    let code = status.code().unwrap_or(-1);
                    warn!(code, "capture process exited");
                    events
                        .emit(EventKind::CaptureStatus {
                            message: format!("Capture process exited with code {}", code),
                        });
                    events
                        .emit(EventKind::SessionEnded {
                            reason: format!("capture process exited with code {}", code),
                        });
                }
                None => {
                    events
                        .emit(EventKind::CaptureStatus {
                            message: "Capture stopped".to_string(),
                        });
                }
            }
        });

        Ok(CaptureHandle {
            session,
            kill_tx,
            supervisor,
        })
    }

    /// Periodic fixation driver: every interval, remux if the capture
    /// grew or the snapshot went stale. Failures are reported and the
    /// timer keeps running; the last good snapshot stays in place.
    fn spawn_fixation_timer(&self) -> JoinHandle<()> {
        let fixator = self.fixator.clone();
        let staleness = self.settings.fixation_staleness;
        let interval = self.settings.fixation_interval;
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the capture
            // has a chance to write something
            timer.tick().await;

            loop {
                timer.tick().await;
                match fixator.fixate_if_due(staleness).await {
                    Ok(FixateOutcome::Fixed) => {
                        events
                            .emit(EventKind::CaptureStatus {
                                message: "Snapshot refreshed".to_string(),
                            });
                    }
                    Ok(outcome) => {
                        debug!(?outcome, "fixation pass");
                    }
                    Err(e) => {
                        warn!("fixation failed: {}", e);
                        events
                            .emit(EventKind::CaptureStatus {
                                message: format!("Fixation failed: {}", e),
                            });
                    }
                }
            }
        })
    }
}

/// Handle to a running capture.
pub struct CaptureHandle {
    session: CaptureSession,
    kill_tx: mpsc::Sender<()>,
    supervisor: JoinHandle<()>,
}

impl CaptureHandle {
    /// The source reference and resolved URLs behind this capture
    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// Stop the capture: kill the child, cancel fixation, report status.
    pub async fn stop(self) {
        let _ = self.kill_tx.send(()).await;
        let _ = self.supervisor.await;
    }
}
