//! Clip requests and artifacts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Minimum clip duration in seconds
pub const MIN_CLIP_SECONDS: f64 = 1.0;

/// Maximum clip duration in seconds
pub const MAX_CLIP_SECONDS: f64 = 300.0;

/// Encode quality tier for clips.
///
/// Trades encode speed for compression efficiency; the time range and
/// codecs are identical across tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ClipQuality {
    /// Fast, low-effort encode (x264 ultrafast)
    Fast,

    /// Slow, high-efficiency encode (x264 slow)
    High,
}

impl ClipQuality {
    /// The x264 preset this tier maps to
    pub fn preset(self) -> &'static str {
        match self {
            Self::Fast => "ultrafast",
            Self::High => "slow",
        }
    }
}

impl std::fmt::Display for ClipQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Fast => "fast",
            Self::High => "high",
        })
    }
}

/// Reasons a clip request is rejected before any subprocess is spawned.
#[derive(Debug, Error, PartialEq)]
pub enum ClipValidationError {
    #[error("Start and end times must be finite numbers")]
    NonFinite,

    #[error("Start time cannot be negative (got {0})")]
    NegativeStart(f64),

    #[error("Start time must be less than end time ({start} >= {end})")]
    EmptyRange { start: f64, end: f64 },

    #[error("Clip duration must be at least {MIN_CLIP_SECONDS} second(s) (got {0:.2}s)")]
    TooShort(f64),

    #[error("Clip duration cannot exceed {MAX_CLIP_SECONDS} seconds (got {0:.2}s)")]
    TooLong(f64),
}

/// A request to carve a bounded time range out of the snapshot.
///
/// Immutable once created; the outcome (artifact or failure) is reported
/// through the event channel keyed by `id`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClipRequest {
    /// Request id; artifact filenames are keyed by this
    pub id: Uuid,

    /// Start offset in seconds
    pub start: f64,

    /// End offset in seconds
    pub end: f64,

    /// Encode quality tier
    pub quality: ClipQuality,
}

impl ClipRequest {
    /// Create a request with a fresh id
    pub fn new(start: f64, end: f64, quality: ClipQuality) -> Self {
        Self {
            id: Uuid::new_v4(),
            start,
            end,
            quality,
        }
    }

    /// Requested duration in seconds
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Check the range invariants that hold independently of the snapshot:
    /// `0 <= start < end` and `1s <= duration <= 300s`.
    pub fn validate(&self) -> Result<(), ClipValidationError> {
        if !self.start.is_finite() || !self.end.is_finite() {
            return Err(ClipValidationError::NonFinite);
        }
        if self.start < 0.0 {
            return Err(ClipValidationError::NegativeStart(self.start));
        }
        if self.start >= self.end {
            return Err(ClipValidationError::EmptyRange {
                start: self.start,
                end: self.end,
            });
        }

        let duration = self.duration();
        if duration < MIN_CLIP_SECONDS {
            return Err(ClipValidationError::TooShort(duration));
        }
        if duration > MAX_CLIP_SECONDS {
            return Err(ClipValidationError::TooLong(duration));
        }

        Ok(())
    }

    /// Clip file path for this request under `clips_dir`
    pub fn clip_path(&self, clips_dir: &Path) -> PathBuf {
        clips_dir.join(format!("clip_{}.mp4", self.id))
    }

    /// Thumbnail path for this request under `clips_dir`
    pub fn thumbnail_path(&self, clips_dir: &Path) -> PathBuf {
        clips_dir.join(format!("thumb_{}.jpg", self.id))
    }
}

/// Output of a successful clip request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipArtifact {
    /// Encoded clip file
    pub clip_path: PathBuf,

    /// Thumbnail extracted from the clip
    pub thumbnail_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(start: f64, end: f64) -> ClipRequest {
        ClipRequest::new(start, end, ClipQuality::High)
    }

    #[test]
    fn test_valid_range() {
        assert!(req(10.0, 40.0).validate().is_ok());
        assert!(req(0.0, 1.0).validate().is_ok());
        assert!(req(0.0, 300.0).validate().is_ok());
    }

    #[test]
    fn test_negative_start() {
        assert_eq!(
            req(-1.0, 10.0).validate(),
            Err(ClipValidationError::NegativeStart(-1.0))
        );
    }

    #[test]
    fn test_empty_and_inverted_range() {
        assert!(matches!(
            req(10.0, 10.0).validate(),
            Err(ClipValidationError::EmptyRange { .. })
        ));
        assert!(matches!(
            req(20.0, 10.0).validate(),
            Err(ClipValidationError::EmptyRange { .. })
        ));
    }

    #[test]
    fn test_duration_bounds() {
        assert!(matches!(
            req(0.0, 0.5).validate(),
            Err(ClipValidationError::TooShort(_))
        ));
        assert!(matches!(
            req(0.0, 301.0).validate(),
            Err(ClipValidationError::TooLong(_))
        ));
    }

    #[test]
    fn test_non_finite_rejected() {
        assert_eq!(
            req(f64::NAN, 10.0).validate(),
            Err(ClipValidationError::NonFinite)
        );
        assert_eq!(
            req(0.0, f64::INFINITY).validate(),
            Err(ClipValidationError::NonFinite)
        );
    }

    #[test]
    fn test_artifact_paths_keyed_by_id() {
        let dir = Path::new("/tmp/clips");
        let a = req(0.0, 10.0);
        let b = req(0.0, 10.0);

        assert_ne!(a.clip_path(dir), b.clip_path(dir));
        assert_ne!(a.thumbnail_path(dir), b.thumbnail_path(dir));
        assert!(a
            .clip_path(dir)
            .to_string_lossy()
            .contains(&a.id.to_string()));
    }
}
