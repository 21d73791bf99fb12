//! Outbound events produced by the core pipeline.
//!
//! The core never talks to a transport directly. Every observable state
//! change is published as a `CoreEvent` on an mpsc channel; the consumer
//! (WebSocket layer, CLI printer, tests) decides what to do with it.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::segment::Segment;

/// A timestamped event emitted by the core pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreEvent {
    /// When this event was emitted
    pub timestamp: DateTime<Utc>,

    /// What happened
    #[serde(flatten)]
    pub kind: EventKind,
}

impl CoreEvent {
    /// Create an event stamped with the current time
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Shorthand for a capture status message
    pub fn capture_status(message: impl Into<String>) -> Self {
        Self::new(EventKind::CaptureStatus {
            message: message.into(),
        })
    }

    /// Shorthand for a transcription status message
    pub fn transcription_status(message: impl Into<String>) -> Self {
        Self::new(EventKind::TranscriptionStatus {
            message: message.into(),
        })
    }
}

/// The payload of a core event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Human-readable capture/ingest status
    CaptureStatus { message: String },

    /// Human-readable transcription status
    TranscriptionStatus { message: String },

    /// Newly transcribed segments from one cycle
    TranscriptBatch {
        segments: Vec<Segment>,
        total_word_count: usize,
    },

    /// Fractional clip-encode progress (0-100, non-decreasing)
    ClipProgress { request_id: Uuid, percent: f64 },

    /// A clip finished; artifacts are on disk
    ClipCompleted {
        request_id: Uuid,
        clip_path: PathBuf,
        thumbnail_path: PathBuf,
    },

    /// A clip request failed
    ClipFailed { request_id: Uuid, reason: String },

    /// The capture session ended (process exit, stop, or recovery)
    SessionEnded { reason: String },
}

/// Sender half of the outbound event channel.
///
/// Sends are best-effort: a closed or full channel is logged and dropped,
/// never propagated as a pipeline failure.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: tokio::sync::mpsc::Sender<CoreEvent>,
}

impl EventSink {
    pub fn new(tx: tokio::sync::mpsc::Sender<CoreEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink plus its receiver (convenience for tests and the CLI)
    pub fn channel(capacity: usize) -> (Self, tokio::sync::mpsc::Receiver<CoreEvent>) {
        let (tx, rx) = tokio::sync::mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Publish an event. Never blocks the pipeline: a closed or full
    /// channel is logged and the event dropped.
    pub fn emit(&self, kind: EventKind) {
        if let Err(e) = self.tx.try_send(CoreEvent::new(kind)) {
            tracing::debug!("event channel unavailable, dropping event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::capture_status("Started ffmpeg capture process");

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"capture_status\""));

        let parsed: CoreEvent = serde_json::from_str(&json).unwrap();
        match parsed.kind {
            EventKind::CaptureStatus { message } => {
                assert_eq!(message, "Started ffmpeg capture process");
            }
            other => panic!("unexpected event kind: {:?}", other),
        }
    }

    #[test]
    fn test_clip_progress_serialization() {
        let id = Uuid::new_v4();
        let event = CoreEvent::new(EventKind::ClipProgress {
            request_id: id,
            percent: 42.5,
        });

        let json = serde_json::to_string(&event).unwrap();
        let parsed: CoreEvent = serde_json::from_str(&json).unwrap();

        match parsed.kind {
            EventKind::ClipProgress { request_id, percent } => {
                assert_eq!(request_id, id);
                assert!((percent - 42.5).abs() < f64::EPSILON);
            }
            other => panic!("unexpected event kind: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_emit_to_closed_channel_does_not_fail() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);

        // Must not panic or error
        sink.emit(EventKind::SessionEnded {
            reason: "test".to_string(),
        });
    }

    #[tokio::test]
    async fn test_emit_to_full_channel_drops_instead_of_blocking() {
        let (sink, mut rx) = EventSink::channel(1);

        sink.emit(CoreEvent::capture_status("first").kind);
        sink.emit(CoreEvent::capture_status("second").kind);

        let first = rx.recv().await.unwrap();
        match first.kind {
            EventKind::CaptureStatus { message } => assert_eq!(message, "first"),
            other => panic!("unexpected event kind: {:?}", other),
        }
        assert!(rx.try_recv().is_err(), "second event should have been dropped");
    }
}
