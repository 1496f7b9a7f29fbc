//! Channel-backed observer for front ends running on their own task or thread.

use super::PipelineObserver;
use crate::core::{RunResult, StageProgress, StageStatus};
use crate::gate::HumanPrompt;
use crate::logging::LogLine;
use serde::Serialize;
use tokio::sync::mpsc;

/// A notification, as an owned value that can cross task boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObserverEvent {
    /// A sanitized log line.
    Log {
        /// Line text.
        text: String,
    },
    /// A human response is required.
    Prompt {
        /// The outstanding prompt.
        prompt: HumanPrompt,
    },
    /// A prompt was voided by cancellation.
    PromptAbandoned {
        /// The voided prompt.
        prompt: HumanPrompt,
    },
    /// A stage changed status.
    Progress {
        /// Stage index.
        stage_index: usize,
        /// New status.
        status: StageStatus,
    },
    /// The run reached a terminal state.
    Finished {
        /// The single result of the run.
        result: RunResult,
    },
    /// A stage executor failed.
    Error {
        /// The error message.
        message: String,
    },
}

impl ObserverEvent {
    /// Returns a dotted event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Log { .. } => "pipeline.log",
            Self::Prompt { .. } => "pipeline.prompt",
            Self::PromptAbandoned { .. } => "pipeline.prompt_abandoned",
            Self::Progress { .. } => "stage.progress",
            Self::Finished { .. } => "pipeline.finished",
            Self::Error { .. } => "pipeline.error",
        }
    }

    /// Returns true for the terminal notification of a run.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }

    /// Serializes the event to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            serde_json::json!({ "type": "serialization_error", "message": err.to_string() })
        })
    }
}

impl From<StageProgress> for ObserverEvent {
    fn from(progress: StageProgress) -> Self {
        Self::Progress {
            stage_index: progress.stage_index,
            status: progress.status,
        }
    }
}

/// Forwards notifications into an unbounded channel.
///
/// Sending never blocks the execution context. Events sent after the
/// receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ObserverEvent>,
}

impl ChannelObserver {
    /// Creates an observer and the receiving end of its channel.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ObserverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: ObserverEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Observer channel closed; dropping event");
        }
    }

    /// Returns true once the receiver has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PipelineObserver for ChannelObserver {
    fn on_log(&self, line: &LogLine) {
        self.send(ObserverEvent::Log {
            text: line.text.clone(),
        });
    }

    fn on_prompt(&self, prompt: &HumanPrompt) {
        self.send(ObserverEvent::Prompt {
            prompt: prompt.clone(),
        });
    }

    fn on_prompt_abandoned(&self, prompt: &HumanPrompt) {
        self.send(ObserverEvent::PromptAbandoned {
            prompt: prompt.clone(),
        });
    }

    fn on_progress(&self, progress: StageProgress) {
        self.send(ObserverEvent::from(progress));
    }

    fn on_finished(&self, result: &RunResult) {
        self.send(ObserverEvent::Finished {
            result: result.clone(),
        });
    }

    fn on_error(&self, message: &str) {
        self.send(ObserverEvent::Error {
            message: message.to_string(),
        });
    }
}
