//! Sync run outcomes and batch statistics.
//!
//! Pure types with no I/O; the orchestrator produces [`SyncOutcome`]s and
//! the worker and CLI aggregate them into [`SyncStats`].

use std::fmt;

use crate::models::FileStatus;

/// Outcome of one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A fresh extract with `rows` rows was stored.
    Available { rows: u64 },
    /// The export held no rows; nothing was stored.
    Unavailable,
    /// The run failed; the reason was recorded on the file.
    Failed { reason: String },
    /// Another run held the file's lock. Nothing was touched.
    Skipped,
}

impl SyncOutcome {
    /// Status persisted for this outcome, `None` when the run was skipped.
    pub fn status(&self) -> Option<FileStatus> {
        match self {
            SyncOutcome::Available { .. } => Some(FileStatus::Available),
            SyncOutcome::Unavailable => Some(FileStatus::Unavailable),
            SyncOutcome::Failed { .. } => Some(FileStatus::SyncFailed),
            SyncOutcome::Skipped => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed { .. })
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Available { rows } => write!(f, "available ({} rows)", rows),
            SyncOutcome::Unavailable => write!(f, "unavailable (empty export)"),
            SyncOutcome::Failed { reason } => write!(f, "failed: {}", reason),
            SyncOutcome::Skipped => write!(f, "skipped (already running)"),
        }
    }
}

/// Result of a manual sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequest {
    /// A one-shot run was queued.
    Enqueued,
    /// The file is already queued or syncing; nothing was queued.
    AlreadyInProgress,
}

/// Counters over a batch of runs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub available: usize,
    pub unavailable: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Rows across all stored extracts.
    pub rows: u64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Available { rows } => {
                self.available += 1;
                self.rows += rows;
            }
            SyncOutcome::Unavailable => self.unavailable += 1,
            SyncOutcome::Failed { .. } => self.failed += 1,
            SyncOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.available + self.unavailable + self.failed + self.skipped
    }

    /// Runs that completed without error, empty exports included.
    pub fn successful(&self) -> usize {
        self.available + self.unavailable
    }
}
