//! Fixation Integration Tests
//!
//! Tests for the mtime watermark, remux-count idempotence, and the
//! size/staleness gate, using a counting fake remuxer and backdated
//! file mtimes.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use filetime::FileTime;
use tempfile::TempDir;

use streamscribe::adapters::{Remuxer, ToolError};
use streamscribe::core::{FixateOutcome, SnapshotFixator};

/// Remuxer that copies the input and counts invocations
struct CountingRemuxer {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingRemuxer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: None,
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Remuxer for CountingRemuxer {
    async fn remux_copy(&self, input: &Path, output: &Path) -> Result<(), ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        tokio::fs::copy(input, output)
            .await
            .map_err(|source| ToolError::Io {
                tool: "ffmpeg",
                source,
            })?;
        Ok(())
    }
}

struct Fixture {
    temp: TempDir,
    remuxer: Arc<CountingRemuxer>,
    fixator: Arc<SnapshotFixator>,
}

impl Fixture {
    fn new(remuxer: Arc<CountingRemuxer>) -> Self {
        let temp = TempDir::new().unwrap();
        let fixator = Arc::new(SnapshotFixator::new(
            temp.path().join("capture.ts"),
            temp.path().join("snapshot.ts"),
            temp.path().join("snapshot.ts.part"),
            remuxer.clone(),
        ));
        Self {
            temp,
            remuxer,
            fixator,
        }
    }

    fn capture_path(&self) -> std::path::PathBuf {
        self.temp.path().join("capture.ts")
    }

    async fn write_capture(&self, content: &[u8], mtime_unix: i64) {
        tokio::fs::write(self.capture_path(), content).await.unwrap();
        filetime::set_file_mtime(self.capture_path(), FileTime::from_unix_time(mtime_unix, 0))
            .unwrap();
    }
}

#[tokio::test]
async fn test_fixation_is_idempotent_for_unchanged_mtime() {
    let fx = Fixture::new(CountingRemuxer::new());
    fx.write_capture(b"mpegts data", 1_700_000_000).await;

    assert_eq!(fx.fixator.fixate().await.unwrap(), FixateOutcome::Fixed);
    // Same mtime: at most one remux across both calls
    assert_eq!(fx.fixator.fixate().await.unwrap(), FixateOutcome::Unchanged);
    assert_eq!(fx.remuxer.call_count(), 1);
}

#[tokio::test]
async fn test_advanced_mtime_triggers_refixation() {
    let fx = Fixture::new(CountingRemuxer::new());
    fx.write_capture(b"mpegts data", 1_700_000_000).await;
    fx.fixator.fixate().await.unwrap();

    fx.write_capture(b"mpegts data and more", 1_700_000_010).await;

    assert_eq!(fx.fixator.fixate().await.unwrap(), FixateOutcome::Fixed);
    assert_eq!(fx.remuxer.call_count(), 2);
}

#[tokio::test]
async fn test_backdated_mtime_is_still_a_noop() {
    let fx = Fixture::new(CountingRemuxer::new());
    fx.write_capture(b"mpegts data", 1_700_000_000).await;
    fx.fixator.fixate().await.unwrap();

    // Rewrite with an older mtime: not "advanced", so no remux
    fx.write_capture(b"rewound", 1_699_999_000).await;

    assert_eq!(fx.fixator.fixate().await.unwrap(), FixateOutcome::Unchanged);
    assert_eq!(fx.remuxer.call_count(), 1);
}

#[tokio::test]
async fn test_snapshot_content_tracks_capture() {
    let fx = Fixture::new(CountingRemuxer::new());
    fx.write_capture(b"first", 1_700_000_000).await;
    fx.fixator.fixate().await.unwrap();

    fx.write_capture(b"second generation", 1_700_000_020).await;
    fx.fixator.fixate().await.unwrap();

    let snapshot = tokio::fs::read(fx.temp.path().join("snapshot.ts"))
        .await
        .unwrap();
    assert_eq!(snapshot, b"second generation");
}

#[tokio::test]
async fn test_size_staleness_gate_skips_fresh_unchanged_capture() {
    let fx = Fixture::new(CountingRemuxer::new());
    fx.write_capture(b"mpegts data", 1_700_000_000).await;

    let staleness = Duration::from_secs(30);
    assert_eq!(
        fx.fixator.fixate_if_due(staleness).await.unwrap(),
        FixateOutcome::Fixed
    );

    // Size unchanged and snapshot still fresh: the gate skips before
    // even looking at mtimes
    assert_eq!(
        fx.fixator.fixate_if_due(staleness).await.unwrap(),
        FixateOutcome::Skipped
    );
    assert_eq!(fx.remuxer.call_count(), 1);
}

#[tokio::test]
async fn test_size_change_reopens_the_gate() {
    let fx = Fixture::new(CountingRemuxer::new());
    fx.write_capture(b"mpegts data", 1_700_000_000).await;

    let staleness = Duration::from_secs(30);
    fx.fixator.fixate_if_due(staleness).await.unwrap();

    fx.write_capture(b"mpegts data grown past before", 1_700_000_010)
        .await;

    assert_eq!(
        fx.fixator.fixate_if_due(staleness).await.unwrap(),
        FixateOutcome::Fixed
    );
    assert_eq!(fx.remuxer.call_count(), 2);
}

#[tokio::test]
async fn test_concurrent_fixates_remux_once() {
    let fx = Fixture::new(CountingRemuxer::slow(Duration::from_millis(50)));
    fx.write_capture(b"mpegts data", 1_700_000_000).await;

    let a = fx.fixator.clone();
    let b = fx.fixator.clone();
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { a.fixate().await.unwrap() }),
        tokio::spawn(async move { b.fixate().await.unwrap() }),
    );
    let outcomes = [ra.unwrap(), rb.unwrap()];

    // One caller fixates, the other serializes behind the mutex and
    // observes an unchanged mtime
    assert_eq!(fx.remuxer.call_count(), 1);
    assert!(outcomes.contains(&FixateOutcome::Fixed));
    assert!(outcomes.contains(&FixateOutcome::Unchanged));
}
