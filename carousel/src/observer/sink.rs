//! Observer trait and in-process implementations.

use super::ObserverEvent;
use crate::core::{RunResult, StageProgress};
use crate::gate::HumanPrompt;
use crate::logging::LogLine;
use parking_lot::RwLock;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn, Level};

/// Consumer of runner notifications.
///
/// Callbacks are invoked from the execution context and must return
/// promptly: the runner never waits on an observer, and an observer must
/// never wait on the runner from inside a callback.
#[cfg_attr(test, mockall::automock)]
pub trait PipelineObserver: Send + Sync {
    /// A sanitized log line was produced.
    fn on_log(&self, line: &LogLine);

    /// A stage is waiting for a human response.
    fn on_prompt(&self, prompt: &HumanPrompt);

    /// A previously delivered prompt will never receive a response.
    fn on_prompt_abandoned(&self, prompt: &HumanPrompt) {
        let _ = prompt;
    }

    /// A stage changed status.
    fn on_progress(&self, progress: StageProgress);

    /// The run reached a terminal state.
    fn on_finished(&self, result: &RunResult);

    /// A stage executor failed.
    fn on_error(&self, message: &str);
}

/// An observer that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl PipelineObserver for NoOpObserver {
    fn on_log(&self, _line: &LogLine) {}
    fn on_prompt(&self, _prompt: &HumanPrompt) {}
    fn on_progress(&self, _progress: StageProgress) {}
    fn on_finished(&self, _result: &RunResult) {}
    fn on_error(&self, _message: &str) {}
}

/// An observer that writes notifications to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    level: Level,
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingObserver {
    /// Creates a logging observer emitting routine events at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn routine(&self, event: &ObserverEvent) {
        if self.level == Level::DEBUG {
            tracing::debug!(event_type = event.event_type(), event = ?event, "Pipeline event");
        } else {
            info!(event_type = event.event_type(), event = ?event, "Pipeline event");
        }
    }
}

impl PipelineObserver for LoggingObserver {
    fn on_log(&self, line: &LogLine) {
        self.routine(&ObserverEvent::Log {
            text: line.text.clone(),
        });
    }

    fn on_prompt(&self, prompt: &HumanPrompt) {
        info!(stage_index = prompt.stage_index, "Awaiting human response: {}", prompt.text);
    }

    fn on_prompt_abandoned(&self, prompt: &HumanPrompt) {
        warn!(stage_index = prompt.stage_index, "Pending prompt abandoned");
    }

    fn on_progress(&self, progress: StageProgress) {
        self.routine(&ObserverEvent::from(progress));
    }

    fn on_finished(&self, result: &RunResult) {
        info!(run_id = %result.run_id, status = %result.status, success = result.success, "Run finished");
    }

    fn on_error(&self, message: &str) {
        error!(error = message, "Run failed");
    }
}

/// An observer that records every notification, for tests and late inspection.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: RwLock<Vec<ObserverEvent>>,
    changed: Notify,
}

impl CollectingObserver {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ObserverEvent) {
        self.events.write().push(event);
        self.changed.notify_waiters();
    }

    /// Returns all recorded events in delivery order.
    #[must_use]
    pub fn events(&self) -> Vec<ObserverEvent> {
        self.events.read().clone()
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all recorded events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns recorded log lines.
    #[must_use]
    pub fn logs(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                ObserverEvent::Log { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns recorded progress updates.
    #[must_use]
    pub fn progress(&self) -> Vec<StageProgress> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                ObserverEvent::Progress { stage_index, status } => {
                    Some(StageProgress::new(*stage_index, *status))
                }
                _ => None,
            })
            .collect()
    }

    /// Returns recorded prompts.
    #[must_use]
    pub fn prompts(&self) -> Vec<HumanPrompt> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                ObserverEvent::Prompt { prompt } => Some(prompt.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns recorded terminal results.
    #[must_use]
    pub fn results(&self) -> Vec<RunResult> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                ObserverEvent::Finished { result } => Some(result.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns recorded error messages.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                ObserverEvent::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Waits until `predicate` holds for the recorded events.
    ///
    /// Returns false if `timeout` elapses first.
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[ObserverEvent]) -> bool,
    {
        let check = async {
            loop {
                let notified = self.changed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if predicate(&self.events.read()) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, check).await.is_ok()
    }
}

impl PipelineObserver for CollectingObserver {
    fn on_log(&self, line: &LogLine) {
        self.push(ObserverEvent::Log {
            text: line.text.clone(),
        });
    }

    fn on_prompt(&self, prompt: &HumanPrompt) {
        self.push(ObserverEvent::Prompt {
            prompt: prompt.clone(),
        });
    }

    fn on_prompt_abandoned(&self, prompt: &HumanPrompt) {
        self.push(ObserverEvent::PromptAbandoned {
            prompt: prompt.clone(),
        });
    }

    fn on_progress(&self, progress: StageProgress) {
        self.push(ObserverEvent::from(progress));
    }

    fn on_finished(&self, result: &RunResult) {
        self.push(ObserverEvent::Finished {
            result: result.clone(),
        });
    }

    fn on_error(&self, message: &str) {
        self.push(ObserverEvent::Error {
            message: message.to_string(),
        });
    }
}
