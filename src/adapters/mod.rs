//! Adapters for the external media tools.
//!
//! Everything that touches a subprocess lives here: yt-dlp for URL
//! resolution, ffmpeg/ffprobe for capture, remux, extraction, encode and
//! probing, and whisper for transcription. The traits are the seams the
//! core components depend on, so tests can substitute fakes without any
//! tool installed.

pub mod ffmpeg;
pub mod whisper;
pub mod ytdlp;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Segment;

// Re-export the concrete tools
pub use ffmpeg::FfmpegTool;
pub use whisper::{Language, WhisperModel, WhisperTranscriber};
pub use ytdlp::{ResolveError, YtDlp};

/// Failure of an external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with code {code}: {stderr}")]
    Failed {
        tool: &'static str,
        code: i32,
        stderr: String,
    },

    #[error("{tool} produced unusable output: {message}")]
    BadOutput { tool: &'static str, message: String },

    #[error("IO error while running {tool}: {source}")]
    Io {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    /// Build a `Failed` error from an exit status, keeping only the tail
    /// of stderr (tool logs can be long; the last lines carry the reason).
    pub fn from_exit(tool: &'static str, status: std::process::ExitStatus, stderr: &[u8]) -> Self {
        let text = String::from_utf8_lossy(stderr);
        let tail: Vec<&str> = text.lines().rev().take(6).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        Self::Failed {
            tool,
            code: status.code().unwrap_or(-1),
            stderr: tail.join("\n").trim().to_string(),
        }
    }
}

/// Copies a possibly-truncated capture into a seekable file (no re-encode).
#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn remux_copy(&self, input: &Path, output: &Path) -> Result<(), ToolError>;
}

/// Extracts mono 16 kHz audio from a snapshot for transcription.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract_audio(&self, input: &Path, output: &Path) -> Result<(), ToolError>;
}

/// Turns an audio file into timed transcript segments.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<Vec<Segment>, ToolError>;
}

/// Cuts and thumbnails clips from a snapshot.
#[async_trait]
pub trait ClipEncoder: Send + Sync {
    /// Total duration of a media file in seconds
    async fn probe_duration(&self, path: &Path) -> Result<f64, ToolError>;

    /// Re-encode `duration` seconds starting at `start` into `output`.
    ///
    /// Fractional progress (0-1, best effort) is reported on `progress`.
    async fn encode_clip(
        &self,
        source: &Path,
        output: &Path,
        start: f64,
        duration: f64,
        preset: &str,
        progress: tokio::sync::mpsc::Sender<f64>,
    ) -> Result<(), ToolError>;

    /// Grab one frame at `offset` seconds, scaled to a fixed width.
    async fn thumbnail(&self, video: &Path, output: &Path, offset: f64) -> Result<(), ToolError>;
}
