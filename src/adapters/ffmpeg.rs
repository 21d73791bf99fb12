//! ffmpeg/ffprobe adapter.
//!
//! All media mechanics are delegated here: the long-running capture copy,
//! the remux that fixes a truncated capture into a seekable snapshot,
//! audio extraction for transcription, the clip encode with progress
//! reporting, thumbnail grabs, and duration probing.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace, warn};

use super::{AudioExtractor, ClipEncoder, Remuxer, ToolError};
use crate::domain::ResolvedStream;

/// Concrete ffmpeg/ffprobe invocations.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegTool {
    pub fn new() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }

    pub fn with_binaries(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Spawn the long-running capture process copying the live stream
    /// into `output` as MPEG-TS. The caller owns the child and is
    /// responsible for supervising its exit.
    pub fn spawn_capture(
        &self,
        stream: &ResolvedStream,
        output: &Path,
    ) -> Result<Child, ToolError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-i", stream.video_url()]);
        if let Some(audio) = stream.audio_url() {
            cmd.args(["-i", audio]);
        }
        cmd.args(["-c", "copy", "-f", "mpegts", "-y"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd.spawn().map_err(|source| ToolError::Spawn {
            tool: "ffmpeg",
            source,
        })
    }

    /// Run a short-lived ffmpeg invocation to completion, mapping a
    /// non-zero exit to a `ToolError` carrying the stderr tail.
    async fn run_ffmpeg(&self, args: Vec<String>) -> Result<(), ToolError> {
        trace!(?args, "running ffmpeg");

        let output = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                tool: "ffmpeg",
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::from_exit("ffmpeg", output.status, &output.stderr));
        }
        Ok(())
    }

    /// Verify ffmpeg and ffprobe are installed and runnable.
    pub async fn health_check(&self) -> Result<(), ToolError> {
        for binary in [&self.ffmpeg, &self.ffprobe] {
            let output = Command::new(binary)
                .arg("-version")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(|source| ToolError::Spawn {
                    tool: "ffmpeg",
                    source,
                })?;

            if !output.status.success() {
                return Err(ToolError::from_exit("ffmpeg", output.status, &output.stderr));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Remuxer for FfmpegTool {
    async fn remux_copy(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        self.run_ffmpeg(vec![
            "-y".into(),
            "-i".into(),
            input.display().to_string(),
            "-c".into(),
            "copy".into(),
            output.display().to_string(),
        ])
        .await
    }
}

#[async_trait]
impl AudioExtractor for FfmpegTool {
    async fn extract_audio(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        self.run_ffmpeg(vec![
            "-y".into(),
            "-i".into(),
            input.display().to_string(),
            "-vn".into(),
            "-acodec".into(),
            "pcm_s16le".into(),
            "-ar".into(),
            "16000".into(),
            "-ac".into(),
            "1".into(),
            output.display().to_string(),
        ])
        .await?;

        // ffmpeg can exit 0 with an empty file when the source has no audio yet
        let size = tokio::fs::metadata(output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(ToolError::BadOutput {
                tool: "ffmpeg",
                message: "audio extraction produced an empty or missing file".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ClipEncoder for FfmpegTool {
    async fn probe_duration(&self, path: &Path) -> Result<f64, ToolError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ToolError::Spawn {
                tool: "ffprobe",
                source,
            })?;

        if !output.status.success() {
            return Err(ToolError::from_exit("ffprobe", output.status, &output.stderr));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse::<f64>()
            .map_err(|_| ToolError::BadOutput {
                tool: "ffprobe",
                message: format!("unparseable duration: {:?}", text.trim()),
            })
    }

    async fn encode_clip(
        &self,
        source: &Path,
        output: &Path,
        start: f64,
        duration: f64,
        preset: &str,
        progress: tokio::sync::mpsc::Sender<f64>,
    ) -> Result<(), ToolError> {
        debug!(
            start,
            duration,
            preset,
            output = %output.display(),
            "encoding clip"
        );

        let mut child = Command::new(&self.ffmpeg)
            .arg("-i")
            .arg(source)
            .arg("-ss")
            .arg(start.to_string())
            .arg("-t")
            .arg(duration.to_string())
            .args(["-c:v", "libx264"])
            .args(["-preset", preset])
            .args(["-c:a", "aac"])
            .args(["-progress", "pipe:1", "-nostats"])
            .arg("-y")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ToolError::Spawn {
                tool: "ffmpeg",
                source,
            })?;

        // The -progress stream is key=value lines; out_time_us is the
        // encoded position in microseconds.
        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(us) = parse_progress_micros(&line) {
                    let fraction = (us as f64 / 1_000_000.0) / duration;
                    if progress.send(fraction).await.is_err() {
                        // Consumer gone; keep encoding, stop reporting
                        break;
                    }
                }
            }
        }

        let output_result = child
            .wait_with_output()
            .await
            .map_err(|source| ToolError::Io {
                tool: "ffmpeg",
                source,
            })?;

        if !output_result.status.success() {
            return Err(ToolError::from_exit(
                "ffmpeg",
                output_result.status,
                &output_result.stderr,
            ));
        }
        Ok(())
    }

    async fn thumbnail(&self, video: &Path, output: &Path, offset: f64) -> Result<(), ToolError> {
        self.run_ffmpeg(vec![
            "-ss".into(),
            offset.to_string(),
            "-i".into(),
            video.display().to_string(),
            "-vframes".into(),
            "1".into(),
            "-vf".into(),
            "scale=320:-1".into(),
            "-y".into(),
            output.display().to_string(),
        ])
        .await
    }
}

/// Parse one `-progress` line into encoded microseconds, if it carries a
/// position. `out_time_ms` is also microseconds (long-standing ffmpeg
/// quirk), so both keys are handled identically.
fn parse_progress_micros(line: &str) -> Option<u64> {
    let value = line
        .strip_prefix("out_time_us=")
        .or_else(|| line.strip_prefix("out_time_ms="))?;
    match value.trim().parse::<i64>() {
        Ok(us) if us >= 0 => Some(us as u64),
        Ok(_) => Some(0),
        Err(_) => {
            warn!(line, "unparseable ffmpeg progress line");
            None
        }
    }
}

/// Drain a capture child's stderr, logging each line and keeping a short
/// tail for the exit report.
pub async fn drain_stderr_tail(
    stderr: tokio::process::ChildStderr,
    keep_lines: usize,
) -> Vec<String> {
    let mut tail: Vec<String> = Vec::new();
    let mut lines = BufReader::new(stderr).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        trace!(target: "streamscribe::capture", "{}", line);
        if tail.len() == keep_lines {
            tail.remove(0);
        }
        tail.push(line);
    }
    tail
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_micros() {
        assert_eq!(parse_progress_micros("out_time_us=1500000"), Some(1_500_000));
        assert_eq!(parse_progress_micros("out_time_ms=1500000"), Some(1_500_000));
        assert_eq!(parse_progress_micros("out_time_us=-9223372036854775808"), Some(0));
        assert_eq!(parse_progress_micros("frame=42"), None);
        assert_eq!(parse_progress_micros("progress=continue"), None);
        assert_eq!(parse_progress_micros("out_time_us=garbage"), None);
    }

    #[test]
    fn test_capture_args_shape() {
        // Split streams produce two -i inputs; combined produces one.
        let split = ResolvedStream::Split {
            video: "v".to_string(),
            audio: "a".to_string(),
        };
        assert_eq!(split.video_url(), "v");
        assert_eq!(split.audio_url(), Some("a"));

        let combined = ResolvedStream::Combined("u".to_string());
        assert!(combined.audio_url().is_none());
    }
}
