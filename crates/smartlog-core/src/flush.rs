//! Flush decision: should the buffered entries of a finished run be emitted?

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{FlushTrigger, SmartLogOptions};

/// Final status of a run as reported by the test framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    Failed,
    Skipped,
    TimedOut,
    /// The run was expected to fail and did
    ExpectedFailure,
    /// The run was aborted before producing a verdict
    Interrupted,
}

impl RunStatus {
    /// Trigger that corresponds to this status, if any.
    pub fn trigger(&self) -> Option<FlushTrigger> {
        match self {
            RunStatus::Passed => Some(FlushTrigger::Pass),
            RunStatus::Failed => Some(FlushTrigger::Fail),
            RunStatus::Skipped => Some(FlushTrigger::Skip),
            RunStatus::TimedOut => Some(FlushTrigger::Timeout),
            RunStatus::ExpectedFailure => Some(FlushTrigger::Fixme),
            RunStatus::Interrupted => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Skipped => "skipped",
            RunStatus::TimedOut => "timed_out",
            RunStatus::ExpectedFailure => "expected_failure",
            RunStatus::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// What the framework knows about a run once its body has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// Retry attempt number; 0 for the first attempt
    pub retry: u32,
}

impl RunOutcome {
    pub fn new(status: RunStatus) -> Self {
        Self { status, retry: 0 }
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    /// `Ok` → passed, `Err` → failed.
    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::new(RunStatus::Passed),
            Err(_) => Self::new(RunStatus::Failed),
        }
    }
}

/// Flush state of a logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPhase {
    /// Entries are accumulating
    #[default]
    Idle,
    /// An emission is in progress
    Flushing,
}

/// Decide whether a finished run should be flushed.
///
/// A retry attempt flushes whenever `retry` is configured, regardless of
/// the status. Otherwise the status is mapped to its trigger and checked
/// against the configured set.
pub fn should_flush(options: &SmartLogOptions, outcome: &RunOutcome) -> bool {
    if outcome.retry > 0 && options.flushes_on(FlushTrigger::Retry) {
        return true;
    }
    outcome
        .status
        .trigger()
        .is_some_and(|trigger| options.flushes_on(trigger))
}
