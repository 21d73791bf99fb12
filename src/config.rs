//! Configuration for streamscribe paths and pipeline timings.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variable (STREAMSCRIBE_HOME)
//! 2. Config file (.streamscribe/config.yaml)
//! 3. Defaults (~/.streamscribe)
//!
//! Config file discovery:
//! - Searches current directory and parents for .streamscribe/config.yaml
//! - Paths in config file are relative to the config file's parent directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Work directory (relative to config file unless absolute)
    pub home: Option<String>,

    /// Pipeline timing overrides
    #[serde(default)]
    pub pipeline: PipelineFileSettings,
}

/// Optional timing overrides in the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineFileSettings {
    pub fixation_interval_secs: Option<u64>,
    pub fixation_staleness_secs: Option<u64>,
    pub cycle_interval_secs: Option<u64>,
    pub snapshot_wait_timeout_secs: Option<u64>,
    pub min_first_cycle_bytes: Option<u64>,
}

/// Pipeline timing knobs with their production defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// How often the ingestor drives a fixation pass
    pub fixation_interval: Duration,

    /// Maximum snapshot staleness before a fixation runs even without growth
    pub fixation_staleness: Duration,

    /// How often the transcription engine requests a cycle
    pub cycle_interval: Duration,

    /// How long one cycle waits for the snapshot to become ready
    pub snapshot_wait_timeout: Duration,

    /// Delay between snapshot readiness polls
    pub snapshot_poll_interval: Duration,

    /// Minimum snapshot size before the very first cycle runs
    pub min_first_cycle_bytes: u64,

    /// Consecutive equal-size polls before a non-growing snapshot is
    /// accepted anyway (stream stall tolerance)
    pub max_stable_polls: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fixation_interval: Duration::from_secs(10),
            fixation_staleness: Duration::from_secs(30),
            cycle_interval: Duration::from_secs(3),
            snapshot_wait_timeout: Duration::from_secs(30),
            snapshot_poll_interval: Duration::from_secs(1),
            min_first_cycle_bytes: 32 * 1024,
            max_stable_polls: 5,
        }
    }
}

impl PipelineSettings {
    fn apply(mut self, file: &PipelineFileSettings) -> Self {
        if let Some(secs) = file.fixation_interval_secs {
            self.fixation_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.fixation_staleness_secs {
            self.fixation_staleness = Duration::from_secs(secs);
        }
        if let Some(secs) = file.cycle_interval_secs {
            self.cycle_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.snapshot_wait_timeout_secs {
            self.snapshot_wait_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = file.min_first_cycle_bytes {
            self.min_first_cycle_bytes = bytes;
        }
        self
    }
}

/// Canonical file layout inside the work directory.
///
/// Single source of truth - components take a `WorkLayout` instead of
/// hardcoding file names.
///
/// ```text
/// capture.ts          raw append-only capture (ffmpeg writer only)
/// snapshot.ts         seekable snapshot (fixator writer, atomic replace)
/// snapshot.ts.part    fixator scratch file
/// audio/              transient extraction output
/// clips/              one clip + one thumbnail per completed request
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkLayout {
    root: PathBuf,
}

impl WorkLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The work directory root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw append-only capture file (sole writer: the capture process)
    pub fn capture(&self) -> PathBuf {
        self.root.join("capture.ts")
    }

    /// Seekable snapshot readers open (sole writer: the fixator)
    pub fn snapshot(&self) -> PathBuf {
        self.root.join("snapshot.ts")
    }

    /// Fixator scratch file, renamed over the snapshot on success
    pub fn snapshot_part(&self) -> PathBuf {
        self.root.join("snapshot.ts.part")
    }

    /// Transient audio extraction directory
    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    /// Extracted audio slice for the current transcription cycle
    pub fn cycle_audio(&self) -> PathBuf {
        self.audio_dir().join("segment.wav")
    }

    /// Clip artifact directory
    pub fn clips_dir(&self) -> PathBuf {
        self.root.join("clips")
    }

    /// Create the directory tree (idempotent)
    pub async fn ensure(&self) -> Result<()> {
        for dir in [self.root.clone(), self.audio_dir(), self.clips_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Resolved configuration with absolute paths and effective timings.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Work directory layout
    pub layout: WorkLayout,

    /// Effective pipeline timings
    pub settings: PipelineSettings,

    /// Path to config file (if one was found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self> {
        let config_path = find_config_file();
        let file = match &config_path {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };

        let home = resolve_home(&file, config_path.as_deref())?;
        let settings = PipelineSettings::default().apply(&file.pipeline);

        Ok(Self {
            layout: WorkLayout::new(home),
            settings,
            config_file: config_path,
        })
    }
}

/// Default work directory (~/.streamscribe)
pub fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".streamscribe")
}

fn resolve_home(file: &ConfigFile, config_path: Option<&Path>) -> Result<PathBuf> {
    if let Ok(home) = std::env::var("STREAMSCRIBE_HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }

    if let (Some(home), Some(config_path)) = (&file.home, config_path) {
        let path = PathBuf::from(home);
        if path.is_absolute() {
            return Ok(path);
        }
        // Relative to the directory holding .streamscribe/config.yaml
        let base = config_path
            .parent()
            .and_then(|p| p.parent())
            .context("Config file has no parent directory")?;
        return Ok(base.join(path));
    }

    Ok(default_home())
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".streamscribe").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = WorkLayout::new("/var/lib/streamscribe");

        assert_eq!(
            layout.capture(),
            PathBuf::from("/var/lib/streamscribe/capture.ts")
        );
        assert_eq!(
            layout.snapshot(),
            PathBuf::from("/var/lib/streamscribe/snapshot.ts")
        );
        assert!(layout
            .snapshot_part()
            .to_string_lossy()
            .ends_with("snapshot.ts.part"));
        assert_eq!(
            layout.cycle_audio(),
            PathBuf::from("/var/lib/streamscribe/audio/segment.wav")
        );
    }

    #[test]
    fn test_default_settings() {
        let settings = PipelineSettings::default();

        assert_eq!(settings.fixation_interval, Duration::from_secs(10));
        assert_eq!(settings.fixation_staleness, Duration::from_secs(30));
        assert_eq!(settings.cycle_interval, Duration::from_secs(3));
        assert_eq!(settings.min_first_cycle_bytes, 32 * 1024);
        assert_eq!(settings.max_stable_polls, 5);
    }

    #[test]
    fn test_file_overrides() {
        let yaml = r#"
home: work
pipeline:
  fixation_interval_secs: 5
  cycle_interval_secs: 1
"#;
        let file: ConfigFile = serde_yaml::from_str(yaml).unwrap();
        let settings = PipelineSettings::default().apply(&file.pipeline);

        assert_eq!(settings.fixation_interval, Duration::from_secs(5));
        assert_eq!(settings.cycle_interval, Duration::from_secs(1));
        // Untouched knobs keep their defaults
        assert_eq!(settings.fixation_staleness, Duration::from_secs(30));
    }
}
