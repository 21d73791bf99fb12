//! streamscribe - Live-stream capture, transcription, and clipping
//!
//! Ingests a continuously-growing live stream, keeps a periodically
//! refreshed seekable snapshot of it, incrementally transcribes new audio
//! as it arrives, and carves bounded time ranges into standalone clips.
//!
//! # Architecture
//!
//! ```text
//! source ref → Ingestor → capture.ts → Fixator → snapshot.ts
//!                                                   │
//!                           ┌───────────────────────┤
//!                           ▼                       ▼
//!                   Transcription Engine       Clip Extractor
//!                   (cycles, cursor)           (per-request tasks)
//!                           │                       │
//!                           └──────► CoreEvent channel ◄──── status
//! ```
//!
//! The snapshot is single-writer (the fixator) and multi-reader; replace
//! is atomic so readers never see a partial file. The transcription
//! engine is single-flight with one-slot coalescing, so backlog never
//! grows past one owed cycle.
//!
//! # Modules
//!
//! - `adapters`: subprocess tools (yt-dlp, ffmpeg/ffprobe, whisper)
//! - `core`: fixation, ingestion, transcription cycles, clipping, recovery
//! - `domain`: events, segments, clips, session identity
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Capture and transcribe a live stream
//! streamscribe run https://www.youtube.com/watch?v=...
//!
//! # Cut a clip from the current snapshot
//! streamscribe clip 42.0 78.5 --quality high
//!
//! # Verify external tools
//! streamscribe check
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{Language, WhisperModel};
pub use config::{PipelineSettings, ResolvedConfig, WorkLayout};
pub use crate::core::{
    ClipError, CycleState, HealthFacts, RecoveryAction, RecoverySupervisor, Session,
    SnapshotFixator,
};
pub use domain::{
    ClipArtifact, ClipQuality, ClipRequest, CoreEvent, EventKind, EventSink, Segment,
    TranscriptCursor, Word,
};
