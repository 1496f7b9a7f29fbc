//! Per-stage execution context.

use super::ports::{ApprovalPort, AutoApprove};
use crate::cancellation::CancellationToken;
use crate::core::RunInputs;
use crate::errors::StageError;
use crate::gate::HumanResponse;
use crate::logging::{LogFallback, LogSink, LogWriter};
use crate::observer::NoOpObserver;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a stage executor may use while it runs.
///
/// Output goes through [`log`](Self::log) or [`log_line`](Self::log_line);
/// approvals go through [`request_human`](Self::request_human). Executors
/// that run for a long time should check [`is_cancelled`](Self::is_cancelled)
/// between steps.
#[derive(Clone)]
pub struct StageContext {
    run_id: Uuid,
    stage_index: usize,
    label: String,
    inputs: Arc<RunInputs>,
    log: LogSink,
    approvals: Arc<dyn ApprovalPort>,
    cancel_token: Arc<CancellationToken>,
}

impl StageContext {
    /// Creates a context for one stage of a run.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        stage_index: usize,
        label: impl Into<String>,
        inputs: Arc<RunInputs>,
        log: LogSink,
        approvals: Arc<dyn ApprovalPort>,
        cancel_token: Arc<CancellationToken>,
    ) -> Self {
        Self {
            run_id,
            stage_index,
            label: label.into(),
            inputs,
            log,
            approvals,
            cancel_token,
        }
    }

    /// Creates a context not attached to any run: logs are discarded and
    /// approvals are granted immediately.
    #[must_use]
    pub fn detached(label: impl Into<String>, inputs: RunInputs) -> Self {
        Self::new(
            Uuid::nil(),
            0,
            label,
            Arc::new(inputs),
            LogSink::new(Arc::new(NoOpObserver), LogFallback::Discard),
            Arc::new(AutoApprove),
            Arc::new(CancellationToken::new()),
        )
    }

    /// Returns the run this stage belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the stage's position in the registry.
    #[must_use]
    pub fn stage_index(&self) -> usize {
        self.stage_index
    }

    /// Returns the stage label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the validated run inputs.
    #[must_use]
    pub fn inputs(&self) -> &RunInputs {
        &self.inputs
    }

    /// Returns the inputs as template variables.
    #[must_use]
    pub fn template_vars(&self) -> HashMap<String, serde_json::Value> {
        self.inputs.to_template_vars()
    }

    /// Returns a line-buffered writer into the run log.
    #[must_use]
    pub fn log(&self) -> LogWriter {
        self.log.writer()
    }

    /// Writes `text` to the run log.
    pub fn log_line(&self, text: &str) {
        self.log.line(text);
    }

    /// Asks a human to respond to `text`.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Gate`] if the request is rejected or the run is
    /// cancelled while waiting.
    pub async fn request_human(&self, text: &str) -> Result<HumanResponse, StageError> {
        self.approvals
            .request_human(text)
            .await
            .map_err(|source| StageError::Gate {
                stage: self.label.clone(),
                source,
            })
    }

    /// Returns true once the run has been asked to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Completes once the run has been asked to stop.
    pub async fn cancelled(&self) {
        self.cancel_token.cancelled().await;
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("run_id", &self.run_id)
            .field("stage_index", &self.stage_index)
            .field("label", &self.label)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
