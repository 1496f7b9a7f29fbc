//! Run-level records: handles, results, snapshots and progress updates.

use super::{RunStatus, StageStatus};
use crate::utils::iso_timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one accepted run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunHandle {
    /// The run identifier.
    pub run_id: Uuid,
}

impl RunHandle {
    pub(crate) fn new(run_id: Uuid) -> Self {
        Self { run_id }
    }
}

/// A single stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Human-readable label.
    pub name: String,
    /// Position in the pipeline.
    pub index: usize,
    /// Current status.
    pub status: StageStatus,
}

impl Stage {
    /// Creates a waiting stage.
    #[must_use]
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            status: StageStatus::Waiting,
        }
    }
}

/// A status change for one stage, as delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    /// Index of the stage.
    pub stage_index: usize,
    /// New status.
    pub status: StageStatus,
}

impl StageProgress {
    /// Creates a progress update.
    #[must_use]
    pub fn new(stage_index: usize, status: StageStatus) -> Self {
        Self { stage_index, status }
    }
}

/// The terminal outcome of a run. Exactly one is produced per accepted `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// The run this result belongs to.
    pub run_id: Uuid,
    /// The terminal status.
    pub status: RunStatus,
    /// Whether every stage completed.
    pub success: bool,
    /// Error or abort message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the result was produced (ISO 8601).
    pub finished_at: String,
}

impl RunResult {
    /// Creates a successful result.
    #[must_use]
    pub fn completed(run_id: Uuid) -> Self {
        Self {
            run_id,
            status: RunStatus::Completed,
            success: true,
            error_message: None,
            finished_at: iso_timestamp(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(run_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            success: false,
            error_message: Some(message.into()),
            finished_at: iso_timestamp(),
        }
    }

    /// Creates an aborted result.
    #[must_use]
    pub fn aborted(run_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            run_id,
            status: RunStatus::Aborted,
            success: false,
            error_message: Some(reason.into()),
            finished_at: iso_timestamp(),
        }
    }
}

/// Point-in-time view of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// The run identifier.
    pub run_id: Uuid,
    /// Stages in pipeline order.
    pub stages: Vec<Stage>,
    /// Lifecycle status.
    pub run_status: RunStatus,
    /// Index of the stage the runner considers current.
    pub current_index: usize,
}

impl PipelineRun {
    /// Returns the stage currently awaiting a human, if any.
    #[must_use]
    pub fn awaiting_stage(&self) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|stage| stage.status == StageStatus::AwaitingHuman)
    }

    /// Returns the statuses in stage order.
    #[must_use]
    pub fn statuses(&self) -> Vec<StageStatus> {
        self.stages.iter().map(|stage| stage.status).collect()
    }
}
