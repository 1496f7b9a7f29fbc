//! Error types for the carousel coordinator.
//!
//! Every failure the coordinator can surface falls in one of these groups:
//! stage execution errors (terminal for the run), gate misuse (logged and
//! rejected), input/config validation, and runner command errors.

use serde_json::json;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned by runner commands (`start`, `respond`, `cancel`, `wait`).
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A run is already active.
    #[error("Pipeline already running (run_id: {active_run_id})")]
    Conflict {
        /// The run that is currently active.
        active_run_id: Uuid,
    },

    /// The handle does not belong to the active or last run.
    #[error("Unknown run: {0}")]
    UnknownRun(Uuid),

    /// No run has ever been started on this runner.
    #[error("No run has been started")]
    NoRun,

    /// The run inputs failed validation.
    #[error("{0}")]
    InvalidInputs(#[from] InputError),

    /// The runner configuration failed validation.
    #[error("{0}")]
    InvalidConfig(#[from] ConfigError),

    /// A gate command was rejected.
    #[error("{0}")]
    Gate(#[from] GateError),
}

impl RunnerError {
    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(active_run_id: Uuid) -> Self {
        Self::Conflict { active_run_id }
    }

    /// Returns true for the "run already active" rejection.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::Conflict { active_run_id } => {
                map.insert("active_run_id".to_string(), json!(active_run_id.to_string()));
                "RunConflict"
            }
            Self::UnknownRun(run_id) => {
                map.insert("run_id".to_string(), json!(run_id.to_string()));
                "UnknownRun"
            }
            Self::NoRun => "NoRun",
            Self::InvalidInputs(_) => "InvalidInputs",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::Gate(err) => return err.to_dict(),
        };
        map.insert("type".to_string(), json!(kind));
        map.insert("message".to_string(), json!(self.to_string()));
        map
    }
}

/// Misuse or interruption of the human approval gate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// A second request arrived while one is outstanding.
    #[error("A human approval request is already outstanding for stage {stage_index}")]
    RequestOutstanding {
        /// Stage index of the request that is still waiting.
        stage_index: usize,
    },

    /// A response arrived with nothing waiting for it.
    #[error("No human approval request is outstanding")]
    NoOutstandingRequest,

    /// The pending request was voided before a response arrived.
    #[error("Human approval request was abandoned")]
    Abandoned,

    /// The run was cancelled while waiting.
    #[error("Human approval request cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },

    /// A custom response was blank.
    #[error("Response required: provide guidance or choose an approval option")]
    ResponseRequired,

    /// Quick-approve found no trigger phrase and the policy forbids guessing.
    #[error("Prompt has no recognised approval phrase; a typed response is required")]
    UnhandledPrompt,
}

impl GateError {
    /// Returns true for errors that end the waiting side of the rendezvous.
    #[must_use]
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Abandoned | Self::Cancelled { .. })
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::RequestOutstanding { stage_index } => {
                map.insert("stage_index".to_string(), json!(stage_index));
                "GateRequestOutstanding"
            }
            Self::NoOutstandingRequest => "GateNoOutstandingRequest",
            Self::Abandoned => "GateAbandoned",
            Self::Cancelled { reason } => {
                map.insert("reason".to_string(), json!(reason));
                "GateCancelled"
            }
            Self::ResponseRequired => "GateResponseRequired",
            Self::UnhandledPrompt => "GateUnhandledPrompt",
        };
        map.insert("type".to_string(), json!(kind));
        map.insert("message".to_string(), json!(self.to_string()));
        map
    }
}

/// Failure raised by an opaque stage executor.
#[derive(Debug, Error)]
pub enum StageError {
    /// The executor returned an error.
    #[error("Stage '{stage}' failed: {source}")]
    Failed {
        /// Label of the failing stage.
        stage: String,
        /// The underlying error.
        #[source]
        source: anyhow::Error,
    },

    /// The executor panicked.
    #[error("Stage '{stage}' panicked: {message}")]
    Panicked {
        /// Label of the failing stage.
        stage: String,
        /// The panic payload, if it was a string.
        message: String,
    },

    /// The executor gave up because a gate request could not complete.
    #[error("Stage '{stage}' interrupted: {source}")]
    Gate {
        /// Label of the interrupted stage.
        stage: String,
        /// The gate error.
        #[source]
        source: GateError,
    },
}

impl StageError {
    /// Creates a failure from any error type.
    pub fn failed(stage: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Failed {
            stage: stage.into(),
            source: source.into(),
        }
    }

    /// Creates a failure from a plain message.
    pub fn message(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            stage: stage.into(),
            source: anyhow::anyhow!(message.into()),
        }
    }

    /// Returns the label of the stage that failed.
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::Failed { stage, .. } | Self::Panicked { stage, .. } | Self::Gate { stage, .. } => {
                stage
            }
        }
    }

    /// Returns true when the failure was caused by an interrupted gate request.
    #[must_use]
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Gate { source, .. } if source.is_interruption())
    }
}

/// Validation failure for run inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// The topic was empty after trimming.
    #[error("Missing topic: provide a topic before launching the pipeline")]
    MissingTopic,

    /// The stage count was outside the accepted range.
    #[error("Stage count {value} out of range ({min}..={max})")]
    StageCountOutOfRange {
        /// The rejected value.
        value: u32,
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
    },

    /// The aspect ratio is not supported.
    #[error("Unsupported aspect ratio '{0}'. Choose from 16:9, 9:16, 1:1")]
    UnsupportedAspectRatio(String),
}

/// Validation failure for runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The stage registry has no stages.
    #[error("Stage registry is empty")]
    EmptyRegistry,

    /// Two stages share the same label.
    #[error("Duplicate stage label: {0}")]
    DuplicateStage(String),

    /// The prompt-to-stage table has no entries.
    #[error("Prompt stage map is empty")]
    EmptyPromptMap,

    /// The prompt-to-stage table references a missing stage.
    #[error("Prompt stage map entry {position} points to stage {stage_index}, but only {stage_count} stages exist")]
    PromptMapOutOfRange {
        /// Position of the bad entry in the table.
        position: usize,
        /// The referenced stage index.
        stage_index: usize,
        /// Number of configured stages.
        stage_count: usize,
    },
}
