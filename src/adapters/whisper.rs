//! Whisper transcription backend.
//!
//! Shells out to `python -m whisper` with word-level timestamps enabled
//! and parses the JSON output file into domain segments.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use super::{ToolError, Transcriber};
use crate::domain::{Segment, Word};

/// Available Whisper models, fastest to most accurate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WhisperModel {
    Tiny,
    #[default]
    Base,
    Small,
    Medium,
    Large,
}

impl WhisperModel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Base => "base",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl std::fmt::Display for WhisperModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transcription language: a fixed set of codes plus auto-detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Auto,
    En,
    Es,
    Fr,
    De,
    It,
    Pt,
    Nl,
    Pl,
    Ru,
    Zh,
    Ja,
    Ko,
    Ar,
    Hi,
    Tr,
}

impl Language {
    /// The `--language` argument value, or `None` for auto-detection.
    pub fn code(self) -> Option<&'static str> {
        match self {
            Self::Auto => None,
            Self::En => Some("en"),
            Self::Es => Some("es"),
            Self::Fr => Some("fr"),
            Self::De => Some("de"),
            Self::It => Some("it"),
            Self::Pt => Some("pt"),
            Self::Nl => Some("nl"),
            Self::Pl => Some("pl"),
            Self::Ru => Some("ru"),
            Self::Zh => Some("zh"),
            Self::Ja => Some("ja"),
            Self::Ko => Some("ko"),
            Self::Ar => Some("ar"),
            Self::Hi => Some("hi"),
            Self::Tr => Some("tr"),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code().unwrap_or("auto"))
    }
}

/// Whisper output JSON structure (the parts we read)
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    text: String,
    start: f64,
    end: f64,
    #[serde(default)]
    words: Vec<WhisperWord>,
}

/// Word entries vary across whisper versions: the token may be under
/// `word` or `text`, the confidence under `probability` or `confidence`.
#[derive(Debug, Deserialize)]
struct WhisperWord {
    #[serde(alias = "word")]
    text: String,
    start: f64,
    end: f64,
    #[serde(default, alias = "confidence")]
    probability: Option<f64>,
}

impl From<WhisperSegment> for Segment {
    fn from(s: WhisperSegment) -> Self {
        Segment {
            text: s.text.trim().to_string(),
            start: s.start,
            end: s.end,
            words: s
                .words
                .into_iter()
                .map(|w| Word {
                    text: w.text.trim().to_string(),
                    start: w.start,
                    end: w.end,
                    confidence: w.probability,
                })
                .collect(),
        }
    }
}

/// Whisper CLI transcriber.
///
/// Model and language are fixed at construction; a session picks them
/// once at `start()` and they never change mid-session.
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    python: String,
    model: WhisperModel,
    language: Language,
    output_dir: PathBuf,
}

impl WhisperTranscriber {
    pub fn new(model: WhisperModel, language: Language, output_dir: PathBuf) -> Self {
        Self {
            python: "python".to_string(),
            model,
            language,
            output_dir,
        }
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn model(&self) -> WhisperModel {
        self.model
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Verify whisper is importable from the configured python.
    pub async fn health_check(&self) -> Result<(), ToolError> {
        let output = Command::new(&self.python)
            .args(["-m", "whisper", "--help"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                tool: "whisper",
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::from_exit("whisper", output.status, &output.stderr));
        }
        Ok(())
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<Vec<Segment>, ToolError> {
        info!(
            audio = %audio.display(),
            model = %self.model,
            language = %self.language,
            "running whisper transcription"
        );

        let mut cmd = Command::new(&self.python);
        cmd.args(["-m", "whisper"])
            .arg(audio)
            .args(["--model", self.model.as_str()])
            .arg("--output_dir")
            .arg(&self.output_dir)
            .args(["--output_format", "json"])
            .args(["--word_timestamps", "True"]);

        if let Some(code) = self.language.code() {
            cmd.args(["--language", code]);
        }

        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                tool: "whisper",
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::from_exit("whisper", output.status, &output.stderr));
        }

        // Whisper writes <stem>.json next to the requested output dir
        let stem = audio
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let json_path = self.output_dir.join(format!("{}.json", stem));

        let content = tokio::fs::read_to_string(&json_path)
            .await
            .map_err(|_| ToolError::BadOutput {
                tool: "whisper",
                message: format!("output file not found: {}", json_path.display()),
            })?;

        let parsed: WhisperOutput =
            serde_json::from_str(&content).map_err(|e| ToolError::BadOutput {
                tool: "whisper",
                message: format!("invalid JSON output: {}", e),
            })?;

        debug!(segments = parsed.segments.len(), "whisper output parsed");

        Ok(parsed.segments.into_iter().map(Segment::from).collect())
    }
}
