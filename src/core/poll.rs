//! Snapshot readiness polling.
//!
//! The capture writer is an opaque external process with no notification
//! hook, so growth detection is deliberately poll-based: compare sizes on
//! an interval instead of waiting for an event that will never come.
//! Stat access goes through `StatSource` so tests can script a fake
//! filesystem, and all sleeping uses tokio time so tests can run under a
//! paused clock.

use std::path::Path;

use async_trait::async_trait;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, trace};

use crate::config::PipelineSettings;

/// Source of file sizes. `Ok(None)` means the file does not exist.
#[async_trait]
pub trait StatSource: Send + Sync {
    async fn file_size(&self, path: &Path) -> std::io::Result<Option<u64>>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStats;

#[async_trait]
impl StatSource for FsStats {
    async fn file_size(&self, path: &Path) -> std::io::Result<Option<u64>> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Result of waiting for the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The snapshot holds enough data to slice
    Ready,

    /// The deadline passed without the snapshot becoming ready. Not an
    /// error: the caller retries on its next cycle.
    TimedOut,
}

/// Poll-with-backoff gate in front of each transcription cycle.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotGate {
    /// Delay between polls
    pub poll_interval: Duration,

    /// Total time allowed for one wait
    pub timeout: Duration,

    /// Minimum size before the very first cycle may run
    pub min_first_bytes: u64,

    /// Equal-size polls after which a stalled snapshot is accepted anyway
    pub max_stable_polls: u32,
}

impl From<&PipelineSettings> for SnapshotGate {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            poll_interval: settings.snapshot_poll_interval,
            timeout: settings.snapshot_wait_timeout,
            min_first_bytes: settings.min_first_cycle_bytes,
            max_stable_polls: settings.max_stable_polls,
        }
    }
}

impl SnapshotGate {
    /// Wait until the snapshot is ready for a cycle.
    ///
    /// Readiness rules:
    /// - the file must exist and be non-empty
    /// - the very first cycle additionally requires `min_first_bytes`
    /// - growth since the previous poll is ready immediately
    /// - `max_stable_polls` consecutive equal sizes is ready too (the
    ///   stream may be stalled but the data is still worth transcribing)
    pub async fn wait_until_ready(
        &self,
        stats: &dyn StatSource,
        path: &Path,
        first_cycle: bool,
    ) -> WaitOutcome {
        let deadline = Instant::now() + self.timeout;
        let mut last_size: u64 = 0;
        let mut stable_polls: u32 = 0;

        loop {
            if Instant::now() >= deadline {
                debug!(path = %path.display(), "timed out waiting for snapshot");
                return WaitOutcome::TimedOut;
            }

            match stats.file_size(path).await {
                Ok(Some(0)) | Ok(None) => {
                    trace!(path = %path.display(), "snapshot missing or empty");
                }
                Ok(Some(size)) if first_cycle && size < self.min_first_bytes => {
                    trace!(
                        size,
                        need = self.min_first_bytes,
                        "snapshot below first-cycle threshold"
                    );
                }
                Ok(Some(size)) if size > last_size => {
                    debug!(size, "snapshot is growing, ready");
                    return WaitOutcome::Ready;
                }
                Ok(Some(size)) => {
                    stable_polls += 1;
                    trace!(
                        size,
                        stable_polls,
                        max = self.max_stable_polls,
                        "snapshot size stable"
                    );
                    if stable_polls >= self.max_stable_polls {
                        debug!(size, "snapshot stable, accepting");
                        return WaitOutcome::Ready;
                    }
                    last_size = size;
                }
                Err(e) => {
                    trace!("stat error while polling snapshot: {}", e);
                }
            }

            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stat source that replays a scripted sequence of sizes, repeating
    /// the last entry forever.
    struct ScriptedStats {
        sizes: Vec<Option<u64>>,
        polls: AtomicUsize,
    }

    impl ScriptedStats {
        fn new(sizes: Vec<Option<u64>>) -> Self {
            Self {
                sizes,
                polls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StatSource for ScriptedStats {
        async fn file_size(&self, _path: &Path) -> std::io::Result<Option<u64>> {
            let i = self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(*self.sizes.get(i).or(self.sizes.last()).unwrap_or(&None))
        }
    }

    fn gate() -> SnapshotGate {
        SnapshotGate {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            min_first_bytes: 32 * 1024,
            max_stable_polls: 5,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_start_waits_for_threshold() {
        // 10KB is below the 32KB first-cycle floor; once the snapshot
        // grows to 40KB the gate opens.
        let stats = ScriptedStats::new(vec![
            Some(10 * 1024),
            Some(10 * 1024),
            Some(40 * 1024),
        ]);

        let outcome = gate()
            .wait_until_ready(&stats, &PathBuf::from("snapshot.ts"), true)
            .await;

        assert_eq!(outcome, WaitOutcome::Ready);
        assert_eq!(stats.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_snapshot_times_out_without_failing() {
        let stats = ScriptedStats::new(vec![Some(10 * 1024)]);

        let outcome = gate()
            .wait_until_ready(&stats, &PathBuf::from("snapshot.ts"), true)
            .await;

        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_growth_is_ready_immediately() {
        let stats = ScriptedStats::new(vec![Some(100 * 1024)]);

        let outcome = gate()
            .wait_until_ready(&stats, &PathBuf::from("snapshot.ts"), false)
            .await;

        assert_eq!(outcome, WaitOutcome::Ready);
        assert_eq!(stats.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_file_times_out() {
        let stats = ScriptedStats::new(vec![None]);

        let outcome = gate()
            .wait_until_ready(&stats, &PathBuf::from("snapshot.ts"), false)
            .await;

        assert_eq!(outcome, WaitOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_threshold_ignored_later() {
        // 10KB would block the first cycle but not subsequent ones
        let stats = ScriptedStats::new(vec![Some(10 * 1024)]);

        let outcome = gate()
            .wait_until_ready(&stats, &PathBuf::from("snapshot.ts"), false)
            .await;

        assert_eq!(outcome, WaitOutcome::Ready);
    }
}
