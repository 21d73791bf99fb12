//! Transcript segments and the incremental-transcription cursor.

use serde::{Deserialize, Serialize};

/// One word with timing, as reported by the transcription tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    /// The word text
    pub text: String,

    /// Start offset in seconds from the beginning of the capture
    pub start: f64,

    /// End offset in seconds
    pub end: f64,

    /// Recognition confidence (0-1), when the tool reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// A contiguous span of transcribed speech.
///
/// Segments are immutable once emitted; a given time range is never
/// published twice within one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// The segment text
    pub text: String,

    /// Start offset in seconds
    pub start: f64,

    /// End offset in seconds
    pub end: f64,

    /// Word-level timing, empty when the tool produced none
    #[serde(default)]
    pub words: Vec<Word>,
}

impl Segment {
    /// Words contributed by this segment: word timestamps when present,
    /// whitespace tokens of the text otherwise.
    pub fn word_count(&self) -> usize {
        if self.words.is_empty() {
            self.text.split_whitespace().count()
        } else {
            self.words.len()
        }
    }
}

/// Tracks how far into the stream transcription has progressed.
///
/// `last_end` is monotonically non-decreasing within a session and is
/// reset to zero only when a new session starts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TranscriptCursor {
    /// End time of the last accepted segment, in seconds
    pub last_end: f64,

    /// Running word count across all accepted segments
    pub total_words: usize,
}

impl TranscriptCursor {
    /// Filter a transcription result down to segments not yet emitted and
    /// advance the cursor past them.
    ///
    /// A segment whose start precedes the cursor is dropped whole, even if
    /// it extends past it. Overlapping re-transcriptions therefore never
    /// duplicate text, at the cost of occasionally losing a few trailing
    /// words of overlap.
    pub fn accept(&mut self, segments: Vec<Segment>) -> Vec<Segment> {
        let mut accepted: Vec<Segment> = segments
            .into_iter()
            .filter(|s| s.start >= self.last_end)
            .collect();

        accepted.sort_by(|a, b| a.start.total_cmp(&b.start));

        for segment in &accepted {
            if segment.end > self.last_end {
                self.last_end = segment.end;
            }
            self.total_words += segment.word_count();
        }

        accepted
    }
}
