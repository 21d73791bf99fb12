//! Core pipeline logic.
//!
//! This module contains:
//! - Fixator: turns the raw capture into a seekable snapshot
//! - Poll: snapshot-readiness polling primitive
//! - Engine: incremental transcription cycles
//! - Ingestor: capture process lifecycle and fixation scheduling
//! - Clipper: on-demand clip extraction
//! - Recovery: health-fact driven session recovery
//! - Session: the explicit per-session object tying it together

pub mod clipper;
pub mod engine;
pub mod fixator;
pub mod ingestor;
pub mod poll;
pub mod recovery;
pub mod session;

// Re-export commonly used types
pub use clipper::{ClipError, ClipExtractor};
pub use engine::{CycleError, CycleState, EngineHandle, TranscriptionEngine};
pub use fixator::{FixateError, FixateOutcome, SnapshotFixator};
pub use ingestor::{CaptureHandle, IngestError, StreamIngestor};
pub use poll::{FsStats, SnapshotGate, StatSource, WaitOutcome};
pub use recovery::{HealthFacts, RecoveryAction, RecoverySupervisor};
pub use session::Session;
