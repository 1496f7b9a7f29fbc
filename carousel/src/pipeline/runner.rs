//! The pipeline runner: one background execution context per run.

use super::board::{ApprovalRouter, StageBoard};
use super::RunnerConfig;
use crate::cancellation::{CancelOutcome, CancellationController, CancellationToken};
use crate::core::{PipelineRun, RunHandle, RunInputs, RunResult, RunStatus};
use crate::errors::{GateError, RunnerError, StageError};
use crate::gate::{GateMode, HumanGate, HumanPrompt, ResponseCommand};
use crate::logging::LogSink;
use crate::observer::PipelineObserver;
use crate::stages::{StageContext, StageRegistry};
use crate::utils::{generate_run_id, panic_message};
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const ABORT_REASON: &str = "Run aborted by user";

/// Everything the runner keeps about the active (or most recent) run.
#[derive(Clone)]
struct RunSlot {
    run_id: Uuid,
    board: Arc<StageBoard>,
    gate: Arc<HumanGate>,
    controller: Arc<CancellationController>,
}

/// Drives the stages of a [`StageRegistry`] in order, one run at a time.
///
/// `start` spawns a tokio task that runs every stage sequentially. Status
/// changes, log lines, prompts and the single terminal result of each run
/// are delivered to the observer. Commands (`respond`, `cancel`) may be
/// issued from any task while the run is in flight.
///
/// # Example
///
/// ```rust,ignore
/// let runner = PipelineRunner::new(registry, RunnerConfig::default(), observer)?;
/// let handle = runner.start(RunInputs::new("Sustainable aviation fuel"), true)?;
/// // ... observer shows prompts, operator answers ...
/// runner.respond(ResponseCommand::Approve)?;
/// let result = runner.wait(handle).await?;
/// ```
pub struct PipelineRunner {
    registry: StageRegistry,
    config: Arc<RunnerConfig>,
    observer: Arc<dyn PipelineObserver>,
    current: Mutex<Option<RunSlot>>,
}

impl PipelineRunner {
    /// Creates a runner after validating the registry and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::InvalidConfig`] if the registry is empty, has
    /// duplicate labels, or the prompt table points past the last stage.
    pub fn new(
        registry: StageRegistry,
        config: RunnerConfig,
        observer: Arc<dyn PipelineObserver>,
    ) -> Result<Self, RunnerError> {
        registry.validate()?;
        config.validate(registry.len())?;
        Ok(Self {
            registry,
            config: Arc::new(config),
            observer,
            current: Mutex::new(None),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Returns the stage labels in order.
    #[must_use]
    pub fn stage_labels(&self) -> Vec<String> {
        self.registry.labels()
    }

    /// Starts a new run.
    ///
    /// `require_human_feedback` fixes the gate mode for the whole run.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::InvalidInputs`] for bad inputs and
    /// [`RunnerError::Conflict`] if a run is already active. Neither has any
    /// effect on the active run.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(
        &self,
        inputs: RunInputs,
        require_human_feedback: bool,
    ) -> Result<RunHandle, RunnerError> {
        let inputs = Arc::new(inputs.validated()?);

        let mut current = self.current.lock();
        if let Some(active) = current.as_ref().filter(|slot| slot.board.run_status().is_active()) {
            warn!(active_run_id = %active.run_id, "Rejecting start: pipeline already running");
            return Err(RunnerError::conflict(active.run_id));
        }

        let run_id = generate_run_id();
        let token = Arc::new(CancellationToken::new());
        let log = LogSink::new(self.observer.clone(), self.config.log_fallback);
        let board = Arc::new(StageBoard::new(
            run_id,
            &self.registry.labels(),
            self.observer.clone(),
            log.clone(),
        ));
        let gate = Arc::new(HumanGate::new(
            GateMode::from_feedback_toggle(require_human_feedback),
            self.observer.clone(),
            token.clone(),
        ));
        let abandon_on_cancel = Arc::downgrade(&gate);
        token.on_cancel(move || {
            if let Some(gate) = abandon_on_cancel.upgrade() {
                gate.abandon();
            }
        });
        let router = Arc::new(ApprovalRouter::new(
            board.clone(),
            gate.clone(),
            self.config.clone(),
            token.clone(),
        ));

        let worker = Worker {
            run_id,
            registry: self.registry.clone(),
            inputs,
            board: board.clone(),
            log,
            router,
        };
        let controller = Arc::new(CancellationController::spawn(
            token,
            self.config.grace_period(),
            move |token| worker.run(token),
        ));

        info!(%run_id, require_human_feedback, "Pipeline run accepted");
        *current = Some(RunSlot {
            run_id,
            board,
            gate,
            controller,
        });
        Ok(RunHandle::new(run_id))
    }

    /// Answers the outstanding prompt.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Gate`] if nothing is waiting, or if the command
    /// cannot be resolved (blank text, unmatched quick-approve under
    /// [`UnmatchedPromptPolicy::Unhandled`](crate::gate::UnmatchedPromptPolicy::Unhandled)).
    /// A rejected command leaves the prompt outstanding.
    pub fn respond(&self, command: ResponseCommand) -> Result<(), RunnerError> {
        let Some(slot) = self.current_slot() else {
            warn!(?command, "Response received with no run");
            return Err(GateError::NoOutstandingRequest.into());
        };
        let prompt = slot
            .gate
            .respond_command(&command, self.config.unmatched_prompt)?;
        debug!(run_id = %slot.run_id, stage_index = prompt.stage_index, "Response delivered");
        Ok(())
    }

    /// Cancels the run identified by `handle`.
    ///
    /// The execution context is asked to stop and given the configured grace
    /// period before it is aborted. Either way every stage is reset to
    /// waiting, the outstanding prompt (if any) is abandoned, and an aborted
    /// result is reported. Cancelling a finished run does nothing.
    ///
    /// Concurrent calls wait for the same stop and report the same outcome;
    /// the run is only reported aborted once its execution context is gone.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::NoRun`] or [`RunnerError::UnknownRun`] if the
    /// handle does not identify the current run.
    pub async fn cancel(&self, handle: RunHandle) -> Result<CancelOutcome, RunnerError> {
        let slot = self.slot_for(handle)?;
        if slot.board.is_terminal() {
            return Ok(CancelOutcome::AlreadyFinished);
        }

        info!(run_id = %slot.run_id, "Cancelling pipeline run");
        let outcome = slot.controller.cancel(ABORT_REASON).await;

        if slot.board.abort(ABORT_REASON) || slot.board.run_status() == RunStatus::Aborted {
            Ok(outcome)
        } else {
            Ok(CancelOutcome::AlreadyFinished)
        }
    }

    /// Waits for the run identified by `handle` to report its result.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::NoRun`] or [`RunnerError::UnknownRun`] if the
    /// handle does not identify the current run.
    pub async fn wait(&self, handle: RunHandle) -> Result<RunResult, RunnerError> {
        let slot = self.slot_for(handle)?;
        Ok(slot.board.wait_finished().await)
    }

    /// Returns true while a run is in progress.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current_slot()
            .is_some_and(|slot| slot.board.run_status().is_active())
    }

    /// Returns the handle of the current or most recent run.
    #[must_use]
    pub fn current_handle(&self) -> Option<RunHandle> {
        self.current_slot().map(|slot| RunHandle::new(slot.run_id))
    }

    /// Returns a view of the current or most recent run.
    #[must_use]
    pub fn snapshot(&self) -> Option<PipelineRun> {
        self.current_slot().map(|slot| slot.board.snapshot())
    }

    /// Returns the prompt currently waiting for a response.
    #[must_use]
    pub fn pending_prompt(&self) -> Option<HumanPrompt> {
        self.current_slot().and_then(|slot| slot.gate.pending_prompt())
    }

    fn current_slot(&self) -> Option<RunSlot> {
        self.current.lock().clone()
    }

    fn slot_for(&self, handle: RunHandle) -> Result<RunSlot, RunnerError> {
        let slot = self.current_slot().ok_or(RunnerError::NoRun)?;
        if slot.run_id == handle.run_id {
            Ok(slot)
        } else {
            Err(RunnerError::UnknownRun(handle.run_id))
        }
    }
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("stages", &self.registry.labels())
            .field("config", &self.config)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// The body of the execution context.
struct Worker {
    run_id: Uuid,
    registry: StageRegistry,
    inputs: Arc<RunInputs>,
    board: Arc<StageBoard>,
    log: LogSink,
    router: Arc<ApprovalRouter>,
}

impl Worker {
    async fn run(self, token: Arc<CancellationToken>) {
        let run_id = self.run_id;
        self.log.line(&format!(
            "Launching pipeline for '{}' ({} slides, {}, {})",
            self.inputs.topic, self.inputs.stage_count, self.inputs.aspect_ratio, self.inputs.persona
        ));
        info!(%run_id, stages = self.registry.len(), "Pipeline started");

        for (index, executor) in self.registry.iter().enumerate() {
            if token.is_cancelled() {
                debug!(%run_id, stage_index = index, "Cancellation observed at stage boundary");
                return;
            }

            self.board.begin_stage(index);
            debug!(%run_id, stage = executor.name(), stage_index = index, "Stage started");

            let ctx = StageContext::new(
                run_id,
                index,
                executor.name(),
                self.inputs.clone(),
                self.log.clone(),
                self.router.clone(),
                token.clone(),
            );
            let outcome = AssertUnwindSafe(executor.execute(&ctx))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(StageError::Panicked {
                        stage: executor.name().to_string(),
                        message: panic_message(payload.as_ref()),
                    })
                });

            if let Err(err) = outcome {
                if token.is_cancelled() {
                    debug!(%run_id, stage = executor.name(), error = %err, "Stage stopped by cancellation");
                    return;
                }
                error!(%run_id, stage = executor.name(), stage_index = index, error = %err, "Stage failed");
                self.board.fail(err.to_string());
                return;
            }

            self.board.complete_stage(index);
            debug!(%run_id, stage = executor.name(), stage_index = index, "Stage finished");
        }

        if token.is_cancelled() {
            return;
        }
        self.board.complete();
    }
}
