//! Health-fact driven recovery.
//!
//! The monitor that probes disk space, tool availability, and capture
//! health lives outside the core; it reports what it saw as
//! `HealthFacts`. This supervisor turns facts into recovery actions and
//! applies them through the session's public entry points.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{EventKind, EventSink};

use super::session::Session;

/// Free space below which transient artifacts get pruned
pub const MIN_FREE_DISK_BYTES: u64 = 500 * 1024 * 1024;

/// A snapshot of externally-observed system health.
#[derive(Debug, Clone, Default)]
pub struct HealthFacts {
    /// Free bytes on the volume holding the work dir, if measured
    pub free_disk_bytes: Option<u64>,

    /// Size of the raw capture file; `None` when it does not exist
    pub capture_size: Option<u64>,

    /// Whether the raw capture grew since the previous observation
    pub capture_advancing: bool,

    /// External tools that failed their availability check
    pub missing_tools: Vec<String>,
}

/// What the supervisor decided to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Capture is corrupt (zero-byte or stuck): stop, purge, start again
    RestartCapture,

    /// Disk pressure: delete transient audio artifacts
    PruneTransientAudio,

    /// Dependencies are missing; nothing to recover automatically
    ReportMissingTools(Vec<String>),
}

/// Decide recovery actions from facts. Pure so the policy is testable
/// without a session.
pub fn plan(facts: &HealthFacts, capture_active: bool) -> Vec<RecoveryAction> {
    let mut actions = Vec::new();

    if let Some(free) = facts.free_disk_bytes {
        if free < MIN_FREE_DISK_BYTES {
            actions.push(RecoveryAction::PruneTransientAudio);
        }
    }

    if !facts.missing_tools.is_empty() {
        actions.push(RecoveryAction::ReportMissingTools(
            facts.missing_tools.clone(),
        ));
    }

    // Corruption only means anything while a capture should be writing
    if capture_active {
        let corrupt = matches!(facts.capture_size, Some(0))
            || (facts.capture_size.is_some() && !facts.capture_advancing);
        if corrupt {
            actions.push(RecoveryAction::RestartCapture);
        }
    }

    actions
}

/// Applies recovery actions to a session.
pub struct RecoverySupervisor {
    session: Arc<Session>,
    events: EventSink,
}

impl RecoverySupervisor {
    pub fn new(session: Arc<Session>, events: EventSink) -> Self {
        Self { session, events }
    }

    /// Evaluate one batch of facts and apply whatever they call for.
    pub async fn observe(&self, facts: HealthFacts) {
        let capture_active = self.session.is_active().await;
        for action in plan(&facts, capture_active) {
            self.apply(action).await;
        }
    }

    async fn apply(&self, action: RecoveryAction) {
        match action {
            RecoveryAction::RestartCapture => {
                warn!("corrupt capture detected, restarting session");
                self.events
                    .emit(EventKind::CaptureStatus {
                        message: "Corrupt capture detected. Restarting capture...".to_string(),
                    });
                match self.session.restart(true).await {
                    Ok(true) => info!("capture restarted"),
                    Ok(false) => warn!("no previous start parameters, cannot restart"),
                    Err(e) => {
                        self.events
                            .emit(EventKind::CaptureStatus {
                                message: format!("Restart failed: {}", e),
                            });
                    }
                }
            }
            RecoveryAction::PruneTransientAudio => {
                self.events
                    .emit(EventKind::CaptureStatus {
                        message: "Low disk space. Cleaning up transient audio files..."
                            .to_string(),
                    });
                self.prune_audio_dir().await;
            }
            RecoveryAction::ReportMissingTools(tools) => {
                self.events
                    .emit(EventKind::CaptureStatus {
                        message: format!("Missing dependencies: {}", tools.join(", ")),
                    });
            }
        }
    }

    /// Delete everything in the transient audio dir; extraction recreates
    /// what the next cycle needs.
    async fn prune_audio_dir(&self) {
        let dir = self.session.layout().audio_dir();
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                warn!("could not prune {}: {}", entry.path().display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> HealthFacts {
        HealthFacts {
            free_disk_bytes: Some(10 * 1024 * 1024 * 1024),
            capture_size: Some(1024),
            capture_advancing: true,
            missing_tools: Vec::new(),
        }
    }

    #[test]
    fn test_healthy_facts_plan_nothing() {
        assert!(plan(&healthy(), true).is_empty());
        assert!(plan(&healthy(), false).is_empty());
    }

    #[test]
    fn test_zero_byte_capture_restarts_when_active() {
        let facts = HealthFacts {
            capture_size: Some(0),
            ..healthy()
        };
        assert!(plan(&facts, true).contains(&RecoveryAction::RestartCapture));
        // Not active: nothing is writing, nothing to restart
        assert!(!plan(&facts, false).contains(&RecoveryAction::RestartCapture));
    }

    #[test]
    fn test_stuck_capture_restarts() {
        let facts = HealthFacts {
            capture_advancing: false,
            ..healthy()
        };
        assert!(plan(&facts, true).contains(&RecoveryAction::RestartCapture));
    }

    #[test]
    fn test_missing_capture_file_is_not_corruption() {
        let facts = HealthFacts {
            capture_size: None,
            capture_advancing: false,
            ..healthy()
        };
        assert!(!plan(&facts, true).contains(&RecoveryAction::RestartCapture));
    }

    #[test]
    fn test_low_disk_prunes() {
        let facts = HealthFacts {
            free_disk_bytes: Some(MIN_FREE_DISK_BYTES - 1),
            ..healthy()
        };
        assert_eq!(plan(&facts, false), vec![RecoveryAction::PruneTransientAudio]);
    }

    #[test]
    fn test_missing_tools_reported() {
        let facts = HealthFacts {
            missing_tools: vec!["yt-dlp".to_string(), "whisper".to_string()],
            ..healthy()
        };
        let actions = plan(&facts, false);
        assert_eq!(
            actions,
            vec![RecoveryAction::ReportMissingTools(vec![
                "yt-dlp".to_string(),
                "whisper".to_string()
            ])]
        );
    }
}
