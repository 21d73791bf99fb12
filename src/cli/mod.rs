//! Command-line interface.
//!
//! Thin bootstrapping layer: parses arguments, builds a session, and
//! prints core events as JSON lines (the same payloads a transport layer
//! would forward). No pipeline logic lives here.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::adapters::{FfmpegTool, Language, WhisperModel, WhisperTranscriber, YtDlp};
use crate::config::ResolvedConfig;
use crate::core::Session;
use crate::domain::{ClipQuality, CoreEvent, EventKind, EventSink};

#[derive(Debug, Parser)]
#[command(name = "streamscribe", version, about = "Live-stream capture, transcription, and clipping")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture and transcribe a live stream until interrupted
    Run {
        /// YouTube live/watch URL or direct .m3u8/.mpd manifest URL
        url: String,

        /// Whisper model (fastest to most accurate)
        #[arg(long, value_enum, default_value_t)]
        model: WhisperModel,

        /// Transcription language
        #[arg(long, value_enum, default_value_t)]
        language: Language,
    },

    /// Cut a clip from the current snapshot
    Clip {
        /// Clip start in seconds
        start: f64,

        /// Clip end in seconds
        end: f64,

        /// Encode quality tier
        #[arg(long, value_enum, default_value_t = ClipQuality::High)]
        quality: ClipQuality,
    },

    /// Verify the external tools are installed
    Check,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = ResolvedConfig::load()?;

        match self.command {
            Command::Run {
                url,
                model,
                language,
            } => run_capture(config, &url, model, language).await,
            Command::Clip {
                start,
                end,
                quality,
            } => run_clip(config, start, end, quality).await,
            Command::Check => run_check(config).await,
        }
    }
}

async fn run_capture(
    config: ResolvedConfig,
    url: &str,
    model: WhisperModel,
    language: Language,
) -> Result<()> {
    let (events, mut rx) = EventSink::channel(256);
    let session = Session::create(config.layout, config.settings, events).await?;

    // Events go to stdout as JSON lines; a terminal SessionEnded event
    // ends the printer.
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
            if matches!(event.kind, EventKind::SessionEnded { .. }) {
                break;
            }
        }
    });

    session
        .start(url, model, language)
        .await
        .context("Failed to start capture")?;

    info!("capture running; press Ctrl-C to stop");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, stopping session");
        }
        _ = printer => {
            info!("capture ended");
        }
    }

    session.stop().await;
    Ok(())
}

async fn run_clip(config: ResolvedConfig, start: f64, end: f64, quality: ClipQuality) -> Result<()> {
    let (events, mut rx) = EventSink::channel(256);
    let session = Session::create(config.layout, config.settings, events).await?;

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let artifact = session
        .create_clip_blocking(start, end, quality)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    drop(session);
    let _ = printer.await;

    println!("clip: {}", artifact.clip_path.display());
    println!("thumbnail: {}", artifact.thumbnail_path.display());
    Ok(())
}

async fn run_check(config: ResolvedConfig) -> Result<()> {
    let ffmpeg = FfmpegTool::new();
    let ytdlp = YtDlp::new();
    let whisper = WhisperTranscriber::new(
        WhisperModel::default(),
        Language::default(),
        config.layout.audio_dir(),
    );

    let mut failures = Vec::new();

    match ffmpeg.health_check().await {
        Ok(()) => println!("ffmpeg/ffprobe: ok"),
        Err(e) => {
            println!("ffmpeg/ffprobe: UNAVAILABLE ({})", e);
            failures.push("ffmpeg");
        }
    }
    match ytdlp.health_check().await {
        Ok(()) => println!("yt-dlp: ok"),
        Err(e) => {
            println!("yt-dlp: UNAVAILABLE ({})", e);
            failures.push("yt-dlp");
        }
    }
    match whisper.health_check().await {
        Ok(()) => println!("whisper: ok"),
        Err(e) => {
            println!("whisper: UNAVAILABLE ({})", e);
            failures.push("whisper");
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("missing tools: {}", failures.join(", "))
    }
}

fn print_event(event: &CoreEvent) {
    match serde_json::to_string(event) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::warn!("could not serialize event: {}", e),
    }
}
