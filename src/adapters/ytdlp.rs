//! yt-dlp adapter for resolving playable stream URLs.
//!
//! Platform URLs (YouTube live/watch pages) are handed to yt-dlp with a
//! fixed format-preference ladder; direct manifest URLs pass through
//! untouched. Known platform failure reasons are surfaced as structured
//! variants instead of a generic tool error.

use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::ResolvedStream;

/// Format preference: 1080p60+audio, then 720p60+audio, then best available
const FORMAT_PREFERENCE: &str = "312+234/311+234/best";

/// yt-dlp is fussy about clients; the android player client avoids most
/// throttling and consent walls for live streams.
const EXTRACTOR_ARGS: &str = "youtube:player_client=android";

const USER_AGENT: &str = "User-Agent: Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Why a source reference could not be resolved to a playable URL.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Not a recognized live-stream reference: {0}")]
    InvalidSource(String),

    #[error("Stream has not started yet")]
    NotStarted,

    #[error("Stream has ended")]
    Ended,

    #[error("Stream requires authentication")]
    AuthRequired,

    #[error("Failed to start yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("yt-dlp exited with code {code}: {stderr}")]
    Tool { code: i32, stderr: String },

    #[error("yt-dlp returned no URL")]
    NoUrl,
}

/// The yt-dlp extraction tool.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlp {
    pub fn new() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Accept only references we know how to capture: YouTube live/watch
    /// URLs or direct playlist/manifest URLs (.m3u8/.mpd).
    pub fn is_valid_source(reference: &str) -> bool {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return false;
        }

        // Strip scheme and leading www. for shape matching
        let rest = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let rest = rest.strip_prefix("www.").unwrap_or(rest);

        if rest.starts_with("youtube.com/live/") || rest.starts_with("youtube.com/watch?v=") {
            return true;
        }

        // Direct manifest: path component ends in a manifest extension
        let path = rest.split(['?', '#']).next().unwrap_or(rest);
        path.ends_with(".m3u8") || path.ends_with(".mpd")
    }

    /// Whether a reference needs yt-dlp at all (platform page vs. direct
    /// manifest URL).
    pub fn needs_extraction(reference: &str) -> bool {
        reference.contains("youtube.com")
    }

    /// Resolve a source reference into playable URL(s).
    ///
    /// Direct manifest URLs are returned as-is; platform URLs go through
    /// yt-dlp. Two stdout lines mean separate video and audio streams.
    pub async fn resolve(&self, reference: &str) -> Result<ResolvedStream, ResolveError> {
        if !Self::is_valid_source(reference) {
            return Err(ResolveError::InvalidSource(reference.to_string()));
        }

        if !Self::needs_extraction(reference) {
            debug!(url = reference, "direct manifest URL, skipping extraction");
            return Ok(ResolvedStream::Combined(reference.to_string()));
        }

        info!(url = reference, "resolving stream URL via yt-dlp");

        let output = Command::new(&self.binary)
            .arg(reference)
            .arg("--get-url")
            .args(["--format", FORMAT_PREFERENCE])
            .arg("--no-warnings")
            .arg("--no-check-certificates")
            .args(["--extractor-args", EXTRACTOR_ARGS])
            .args(["--add-header", USER_AGENT])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(ResolveError::Spawn)?;

        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            return Err(classify_failure(
                output.status.code().unwrap_or(-1),
                &stderr,
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut urls = stdout.lines().map(str::trim).filter(|l| !l.is_empty());

        match (urls.next(), urls.next()) {
            (Some(video), Some(audio)) => {
                debug!("resolved separate video and audio URLs");
                Ok(ResolvedStream::Split {
                    video: video.to_string(),
                    audio: audio.to_string(),
                })
            }
            (Some(url), None) => {
                debug!("resolved combined stream URL");
                Ok(ResolvedStream::Combined(url.to_string()))
            }
            (None, _) => Err(ResolveError::NoUrl),
        }
    }

    /// Verify the binary is installed and runnable.
    pub async fn health_check(&self) -> Result<(), ResolveError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(ResolveError::Spawn)?;

        if !output.status.success() {
            return Err(classify_failure(
                output.status.code().unwrap_or(-1),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(())
    }
}

/// Map yt-dlp stderr phrases to structured platform reasons.
fn classify_failure(code: i32, stderr: &str) -> ResolveError {
    if stderr.contains("This live event will begin in") {
        ResolveError::NotStarted
    } else if stderr.contains("This live event has ended") {
        ResolveError::Ended
    } else if stderr.contains("Sign in") {
        ResolveError::AuthRequired
    } else {
        let tail: Vec<&str> = stderr.lines().rev().take(4).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        ResolveError::Tool {
            code,
            stderr: tail.join("\n").trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_youtube_sources() {
        assert!(YtDlp::is_valid_source("https://www.youtube.com/watch?v=abc123"));
        assert!(YtDlp::is_valid_source("https://youtube.com/live/abc123"));
        assert!(YtDlp::is_valid_source("youtube.com/watch?v=abc123"));
        assert!(YtDlp::is_valid_source("www.youtube.com/live/xyz"));
    }

    #[test]
    fn test_valid_manifest_sources() {
        assert!(YtDlp::is_valid_source("https://cdn.example.com/stream.m3u8"));
        assert!(YtDlp::is_valid_source("https://cdn.example.com/dash/stream.mpd"));
        assert!(YtDlp::is_valid_source("https://cdn.example.com/stream.m3u8?token=a"));
    }

    #[test]
    fn test_invalid_sources() {
        assert!(!YtDlp::is_valid_source(""));
        assert!(!YtDlp::is_valid_source("https://example.com/video.mp4"));
        assert!(!YtDlp::is_valid_source("https://youtube.com/channel/UC123"));
        assert!(!YtDlp::is_valid_source("not a url at all"));
        assert!(!YtDlp::is_valid_source("https://example.com/m3u8page"));
    }

    #[test]
    fn test_needs_extraction() {
        assert!(YtDlp::needs_extraction("https://www.youtube.com/watch?v=abc"));
        assert!(!YtDlp::needs_extraction("https://cdn.example.com/stream.m3u8"));
    }

    #[test]
    fn test_classify_not_started() {
        let err = classify_failure(1, "ERROR: This live event will begin in 2 hours");
        assert!(matches!(err, ResolveError::NotStarted));
    }

    #[test]
    fn test_classify_ended() {
        let err = classify_failure(1, "ERROR: This live event has ended");
        assert!(matches!(err, ResolveError::Ended));
    }

    #[test]
    fn test_classify_auth() {
        let err = classify_failure(1, "ERROR: Sign in to confirm your age");
        assert!(matches!(err, ResolveError::AuthRequired));
    }

    #[test]
    fn test_classify_generic_keeps_code_and_tail() {
        let err = classify_failure(101, "some\nunknown\nfailure");
        match err {
            ResolveError::Tool { code, stderr } => {
                assert_eq!(code, 101);
                assert!(stderr.contains("failure"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
