//! Incremental transcription cycles.
//!
//! A periodic timer requests cycles; each cycle slices new audio from the
//! latest snapshot, transcribes it, and emits only the segments past the
//! cursor. Cycles are single-flight with one-slot coalescing: however many
//! timer ticks arrive while a cycle runs, at most one catch-up cycle is
//! owed afterwards, so backlog never grows.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adapters::{AudioExtractor, ToolError, Transcriber};
use crate::config::PipelineSettings;
use crate::domain::{EventKind, EventSink, TranscriptCursor};

use super::poll::{SnapshotGate, StatSource, WaitOutcome};

/// Why a cycle did not advance the cursor.
#[derive(Debug, Error)]
pub enum CycleError {
    /// The snapshot never became ready within the wait deadline. Transient;
    /// the next tick retries from the same cursor.
    #[error("Snapshot not ready for transcription yet")]
    SnapshotNotReady,

    #[error("Audio extraction failed: {0}")]
    Extract(#[source] ToolError),

    #[error("Transcription failed: {0}")]
    Transcribe(#[source] ToolError),
}

/// Single-flight cycle scheduling state.
///
/// Modeled as one explicit enum rather than two booleans so the
/// three-way transition is testable on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    /// No cycle running
    #[default]
    Idle,

    /// One cycle executing, nothing owed
    Running,

    /// One cycle executing and exactly one catch-up owed
    RunningWithPending,
}

impl CycleState {
    /// A cycle was requested. Returns true when the caller should start
    /// one now; otherwise the request is absorbed into the pending slot.
    pub fn on_request(&mut self) -> bool {
        match *self {
            Self::Idle => {
                *self = Self::Running;
                true
            }
            Self::Running => {
                *self = Self::RunningWithPending;
                false
            }
            // The slot is already full; further requests coalesce into it
            Self::RunningWithPending => false,
        }
    }

    /// The running cycle finished. Returns true when a pending request
    /// was absorbed and exactly one more cycle should start immediately.
    pub fn on_finished(&mut self) -> bool {
        match *self {
            Self::RunningWithPending => {
                *self = Self::Running;
                true
            }
            _ => {
                *self = Self::Idle;
                false
            }
        }
    }

    pub fn is_running(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Everything a cycle needs, shared by value across cycle tasks.
struct CycleContext {
    snapshot: PathBuf,
    audio_out: PathBuf,
    gate: SnapshotGate,
    stats: Arc<dyn StatSource>,
    extractor: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    events: EventSink,
}

impl CycleContext {
    /// One cycle: wait for data, extract, transcribe, merge into cursor.
    ///
    /// Takes the cursor by value and returns the advanced copy; the loop
    /// task owns the authoritative cursor, so no cross-task mutation.
    async fn run_cycle(&self, mut cursor: TranscriptCursor) -> Result<TranscriptCursor, CycleError> {
        let first_cycle = cursor == TranscriptCursor::default();

        let outcome = self
            .gate
            .wait_until_ready(self.stats.as_ref(), &self.snapshot, first_cycle)
            .await;
        if outcome == WaitOutcome::TimedOut {
            return Err(CycleError::SnapshotNotReady);
        }

        self.events
            .emit(EventKind::TranscriptionStatus {
                message: "Extracting audio from snapshot".to_string(),
            });

        self.extractor
            .extract_audio(&self.snapshot, &self.audio_out)
            .await
            .map_err(CycleError::Extract)?;

        let segments = self
            .transcriber
            .transcribe(&self.audio_out)
            .await
            .map_err(CycleError::Transcribe)?;

        let accepted = cursor.accept(segments);
        if accepted.is_empty() {
            debug!("no segments past the cursor this cycle");
            return Ok(cursor);
        }

        let new_words: usize = accepted.iter().map(|s| s.word_count()).sum();
        info!(
            segments = accepted.len(),
            words = new_words,
            cursor = cursor.last_end,
            "emitting transcript batch"
        );

        self.events
            .emit(EventKind::TranscriptionStatus {
                message: format!(
                    "Transcribed {} new segment(s) ({} words)",
                    accepted.len(),
                    new_words
                ),
            });
        self.events
            .emit(EventKind::TranscriptBatch {
                segments: accepted,
                total_word_count: cursor.total_words,
            });

        Ok(cursor)
    }
}

/// The transcription cycle engine for one session.
pub struct TranscriptionEngine {
    snapshot: PathBuf,
    audio_out: PathBuf,
    settings: PipelineSettings,
    stats: Arc<dyn StatSource>,
    extractor: Arc<dyn AudioExtractor>,
    transcriber: Arc<dyn Transcriber>,
    events: EventSink,
}

impl TranscriptionEngine {
    pub fn new(
        snapshot: PathBuf,
        audio_out: PathBuf,
        settings: PipelineSettings,
        stats: Arc<dyn StatSource>,
        extractor: Arc<dyn AudioExtractor>,
        transcriber: Arc<dyn Transcriber>,
        events: EventSink,
    ) -> Self {
        Self {
            snapshot,
            audio_out,
            settings,
            stats,
            extractor,
            transcriber,
            events,
        }
    }

    /// Start the cycle loop. The cursor starts at zero: a new session
    /// never resumes a previous session's progress.
    pub fn spawn(self) -> EngineHandle {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let ctx = Arc::new(CycleContext {
            snapshot: self.snapshot,
            audio_out: self.audio_out,
            gate: SnapshotGate::from(&self.settings),
            stats: self.stats,
            extractor: self.extractor,
            transcriber: self.transcriber,
            events: self.events.clone(),
        });
        let events = self.events;
        let cycle_interval = self.settings.cycle_interval;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(cycle_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            let mut state = CycleState::default();
            let mut cursor = TranscriptCursor::default();

            // Finished cycles report back over this channel; capacity one
            // because at most one cycle is ever in flight.
            let (done_tx, mut done_rx) =
                mpsc::channel::<Result<TranscriptCursor, CycleError>>(1);

            events
                .emit(EventKind::TranscriptionStatus {
                    message: "Transcription started".to_string(),
                });

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,

                    _ = interval.tick() => {
                        if state.on_request() {
                            spawn_cycle(ctx.clone(), cursor, done_tx.clone());
                        }
                    }

                    Some(result) = done_rx.recv() => {
                        match result {
                            Ok(advanced) => cursor = advanced,
                            Err(CycleError::SnapshotNotReady) => {
                                debug!("cycle deferred: snapshot not ready");
                                events
                                    .emit(EventKind::TranscriptionStatus {
                                        message: "Waiting for snapshot data, will retry"
                                            .to_string(),
                                    });
                            }
                            Err(e) => {
                                // Component-local: report and keep ticking
                                warn!("transcription cycle failed: {}", e);
                                events
                                    .emit(EventKind::TranscriptionStatus {
                                        message: format!("Transcription error: {}", e),
                                    });
                            }
                        }

                        if state.on_finished() {
                            debug!("running coalesced catch-up cycle");
                            spawn_cycle(ctx.clone(), cursor, done_tx.clone());
                        }
                    }
                }
            }

            events
                .emit(EventKind::TranscriptionStatus {
                    message: "Transcription stopped".to_string(),
                });
        });

        EngineHandle { stop_tx, task }
    }
}

fn spawn_cycle(
    ctx: Arc<CycleContext>,
    cursor: TranscriptCursor,
    done_tx: mpsc::Sender<Result<TranscriptCursor, CycleError>>,
) {
    tokio::spawn(async move {
        let result = ctx.run_cycle(cursor).await;
        // The loop may have stopped while we ran; that drops the result,
        // which is fine because the session is over.
        let _ = done_tx.send(result).await;
    });
}

/// Handle to a running transcription engine.
pub struct EngineHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl EngineHandle {
    /// Stop the cycle loop. An in-flight cycle drains on its own; its
    /// result is discarded.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(()).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_request_starts_cycle() {
        let mut state = CycleState::Idle;
        assert!(state.on_request());
        assert_eq!(state, CycleState::Running);
    }

    #[test]
    fn test_requests_while_running_coalesce() {
        let mut state = CycleState::Idle;
        assert!(state.on_request());

        // N requests while running leave exactly one pending
        for _ in 0..10 {
            assert!(!state.on_request());
        }
        assert_eq!(state, CycleState::RunningWithPending);

        // Completion owes exactly one catch-up run
        assert!(state.on_finished());
        assert_eq!(state, CycleState::Running);

        // And that one owes nothing
        assert!(!state.on_finished());
        assert_eq!(state, CycleState::Idle);
    }

    #[test]
    fn test_finish_without_pending_goes_idle() {
        let mut state = CycleState::Idle;
        state.on_request();
        assert!(!state.on_finished());
        assert_eq!(state, CycleState::Idle);
    }

    #[test]
    fn test_is_running() {
        assert!(!CycleState::Idle.is_running());
        assert!(CycleState::Running.is_running());
        assert!(CycleState::RunningWithPending.is_running());
    }
}
