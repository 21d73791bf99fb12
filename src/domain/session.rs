//! Capture session identity.

use serde::{Deserialize, Serialize};

/// Playable URL(s) resolved from a source reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolvedStream {
    /// One combined audio+video URL
    Combined(String),

    /// Separate video and audio URLs that the capture process merges
    Split { video: String, audio: String },
}

impl ResolvedStream {
    /// The video (or combined) URL
    pub fn video_url(&self) -> &str {
        match self {
            Self::Combined(url) => url,
            Self::Split { video, .. } => video,
        }
    }

    /// The separate audio URL, if the platform served one
    pub fn audio_url(&self) -> Option<&str> {
        match self {
            Self::Combined(_) => None,
            Self::Split { audio, .. } => Some(audio),
        }
    }
}

/// An active capture: the user-supplied reference plus what it resolved to.
///
/// Created when capture starts, dropped when the session stops or the
/// stream ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSession {
    /// The reference the user supplied
    pub source_url: String,

    /// What the extractor resolved it to
    pub stream: ResolvedStream,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_has_no_audio_url() {
        let stream = ResolvedStream::Combined("https://cdn.example/stream.m3u8".to_string());
        assert_eq!(stream.video_url(), "https://cdn.example/stream.m3u8");
        assert!(stream.audio_url().is_none());
    }

    #[test]
    fn test_split_exposes_both() {
        let stream = ResolvedStream::Split {
            video: "https://cdn.example/v.m3u8".to_string(),
            audio: "https://cdn.example/a.m3u8".to_string(),
        };
        assert_eq!(stream.video_url(), "https://cdn.example/v.m3u8");
        assert_eq!(stream.audio_url(), Some("https://cdn.example/a.m3u8"));
    }
}
