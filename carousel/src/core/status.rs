//! Stage and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The display status of a single pipeline stage.
///
/// Statuses only move forward during a run:
/// `Waiting -> Running -> (AwaitingHuman -> Running)* -> Done`.
/// Catch-up emission may jump a stage straight from `Waiting` to `Done`
/// or `AwaitingHuman`. Only an abort resets stages to `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not started.
    #[default]
    Waiting,
    /// Stage is executing.
    Running,
    /// Stage is paused on a human approval.
    AwaitingHuman,
    /// Stage has been acknowledged as complete.
    Done,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Running => write!(f, "running"),
            Self::AwaitingHuman => write!(f, "awaiting"),
            Self::Done => write!(f, "done"),
        }
    }
}

impl StageStatus {
    /// Returns true if moving from `self` to `next` keeps the status monotonic.
    ///
    /// Resetting to `Waiting` is never a forward transition; aborts bypass this check.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Waiting, Self::Running | Self::AwaitingHuman | Self::Done)
            | (Self::Running, Self::AwaitingHuman | Self::Done)
            | (Self::AwaitingHuman, Self::Running) => true,
            _ => false,
        }
    }

    /// Returns true once the stage has been acknowledged.
    #[must_use]
    pub fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }
}

/// The lifecycle status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run has been started.
    #[default]
    Idle,
    /// A run is in flight.
    Running,
    /// Every stage finished.
    Completed,
    /// A stage executor failed.
    Failed,
    /// The operator cancelled the run.
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl RunStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// Returns true if the run is in flight.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running)
    }
}
