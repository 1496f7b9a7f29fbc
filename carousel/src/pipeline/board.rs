//! Stage status tracking and approval routing for one run.
//!
//! [`StageBoard`] is the single writer of stage statuses. Every change goes
//! through [`StageStatus::can_advance_to`], so observers only ever see
//! forward transitions; a status that is already at or past the requested
//! one is left alone and nothing is emitted. The one exception is an abort,
//! which resets every stage to `Waiting`. Once a terminal result has been
//! reported the board is frozen: late writes from an execution context that
//! outlived its cancellation are dropped.
//!
//! Notifications are collected under the lock and delivered after it is
//! released, so observers may call back into the runner.

use crate::cancellation::CancellationToken;
use crate::core::{PipelineRun, RunResult, RunStatus, Stage, StageProgress, StageStatus};
use crate::errors::GateError;
use crate::gate::{HumanGate, HumanPrompt, HumanResponse};
use crate::logging::LogSink;
use crate::observer::PipelineObserver;
use crate::pipeline::RunnerConfig;
use crate::stages::ApprovalPort;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct BoardState {
    stages: Vec<Stage>,
    run_status: RunStatus,
    current_index: usize,
    approvals_requested: usize,
}

impl BoardState {
    fn is_frozen(&self) -> bool {
        self.run_status.is_terminal()
    }

    fn advance(&mut self, index: usize, status: StageStatus, emitted: &mut Vec<StageProgress>) {
        if self.is_frozen() {
            return;
        }
        let Some(stage) = self.stages.get_mut(index) else {
            return;
        };
        if stage.status.can_advance_to(status) {
            stage.status = status;
            emitted.push(StageProgress::new(index, status));
        }
    }

    /// Marks every stage from the current index up to (not including)
    /// `target` as done, then moves the current index forward.
    fn catch_up(&mut self, target: usize, emitted: &mut Vec<StageProgress>) {
        if self.is_frozen() {
            return;
        }
        for index in self.current_index..target {
            self.advance(index, StageStatus::Done, emitted);
        }
        self.current_index = self.current_index.max(target);
    }

    fn last_index(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    fn awaiting_index(&self) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.status == StageStatus::AwaitingHuman)
    }
}

/// The stage an approval request was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalSlot {
    /// Stage the prompt is attributed to.
    pub stage_index: usize,
    /// Whether that stage was moved to `AwaitingHuman`.
    pub paused: bool,
}

/// Status board for one run.
pub struct StageBoard {
    run_id: Uuid,
    state: Mutex<BoardState>,
    observer: Arc<dyn PipelineObserver>,
    log: LogSink,
    result_tx: watch::Sender<Option<RunResult>>,
}

impl StageBoard {
    /// Creates a running board with every stage waiting.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        labels: &[String],
        observer: Arc<dyn PipelineObserver>,
        log: LogSink,
    ) -> Self {
        let stages = labels
            .iter()
            .enumerate()
            .map(|(index, label)| Stage::new(label.clone(), index))
            .collect();
        let (result_tx, _) = watch::channel(None);
        Self {
            run_id,
            state: Mutex::new(BoardState {
                stages,
                run_status: RunStatus::Running,
                current_index: 0,
                approvals_requested: 0,
            }),
            observer,
            log,
            result_tx,
        }
    }

    /// Returns the run status.
    #[must_use]
    pub fn run_status(&self) -> RunStatus {
        self.state.lock().run_status
    }

    /// Returns true once a terminal result has been reported.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.run_status().is_terminal()
    }

    /// Returns the index the board considers current.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.state.lock().current_index
    }

    /// Returns a copy of the board.
    #[must_use]
    pub fn snapshot(&self) -> PipelineRun {
        let state = self.state.lock();
        PipelineRun {
            run_id: self.run_id,
            stages: state.stages.clone(),
            run_status: state.run_status,
            current_index: state.current_index,
        }
    }

    /// Marks `index` running, first acknowledging every earlier stage.
    pub fn begin_stage(&self, index: usize) {
        let mut emitted = Vec::new();
        {
            let mut state = self.state.lock();
            state.catch_up(index, &mut emitted);
            state.advance(index, StageStatus::Running, &mut emitted);
        }
        self.emit(emitted);
    }

    /// Marks `index` done.
    pub fn complete_stage(&self, index: usize) {
        let mut emitted = Vec::new();
        self.state
            .lock()
            .advance(index, StageStatus::Done, &mut emitted);
        self.emit(emitted);
    }

    /// Routes the next approval request and pauses its stage.
    ///
    /// `stage_for` maps the request ordinal (0-based, counted across the run)
    /// to a stage index. Stages between the current index and the target are
    /// acknowledged first. A stage that is already done receives the prompt
    /// without changing status.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::RequestOutstanding`] if a stage is already
    /// awaiting a human; the ordinal is not consumed. Returns
    /// [`GateError::Abandoned`] once the run has reported its result.
    pub fn pause_for_approval<F>(&self, stage_for: F) -> Result<ApprovalSlot, GateError>
    where
        F: FnOnce(usize) -> Option<usize>,
    {
        let mut emitted = Vec::new();
        let slot = {
            let mut state = self.state.lock();
            if state.is_frozen() {
                debug!(run_id = %self.run_id, "Approval requested after the run finished");
                return Err(GateError::Abandoned);
            }
            if let Some(stage_index) = state.awaiting_index() {
                return Err(GateError::RequestOutstanding { stage_index });
            }

            let ordinal = state.approvals_requested;
            state.approvals_requested += 1;
            let target = stage_for(ordinal)
                .unwrap_or(state.current_index)
                .min(state.last_index());

            state.catch_up(target, &mut emitted);
            state.advance(target, StageStatus::AwaitingHuman, &mut emitted);
            let paused = state.stages[target].status == StageStatus::AwaitingHuman;
            debug!(
                run_id = %self.run_id,
                ordinal,
                stage_index = target,
                paused,
                "Routed approval request"
            );
            ApprovalSlot {
                stage_index: target,
                paused,
            }
        };
        self.emit(emitted);
        Ok(slot)
    }

    /// Completes a paused stage after its response arrived and moves on to
    /// the next one.
    pub fn resume_after_approval(&self, slot: ApprovalSlot) {
        if !slot.paused {
            return;
        }
        let mut emitted = Vec::new();
        {
            let mut state = self.state.lock();
            if state.is_frozen() {
                return;
            }
            let target = slot.stage_index;
            state.advance(target, StageStatus::Running, &mut emitted);
            state.advance(target, StageStatus::Done, &mut emitted);

            let next = (target + 1).min(state.last_index());
            state.current_index = state.current_index.max(next);
            if next != target {
                state.advance(next, StageStatus::Running, &mut emitted);
            }
        }
        self.emit(emitted);
    }

    /// Returns a paused stage to running without acknowledging it.
    pub fn withdraw_approval(&self, slot: ApprovalSlot) {
        if !slot.paused {
            return;
        }
        let mut emitted = Vec::new();
        self.state
            .lock()
            .advance(slot.stage_index, StageStatus::Running, &mut emitted);
        self.emit(emitted);
    }

    /// Reports a successful run. Returns false if a result was already reported.
    pub fn complete(&self) -> bool {
        self.finish(RunResult::completed(self.run_id))
    }

    /// Reports a failed run. Returns false if a result was already reported.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.finish(RunResult::failed(self.run_id, message))
    }

    /// Reports an aborted run and resets every stage to waiting.
    /// Returns false if a result was already reported.
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        self.finish(RunResult::aborted(self.run_id, reason))
    }

    /// Waits for the run's result.
    pub async fn wait_finished(&self) -> RunResult {
        let mut rx = self.result_tx.subscribe();
        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                warn!(run_id = %self.run_id, "Result channel closed without a result");
                return RunResult::failed(self.run_id, "Run ended without reporting a result");
            }
        }
    }

    fn finish(&self, result: RunResult) -> bool {
        let mut emitted = Vec::new();
        {
            let mut state = self.state.lock();
            if state.run_status.is_terminal() {
                debug!(
                    run_id = %self.run_id,
                    reported = %state.run_status,
                    ignored = %result.status,
                    "Run already reported a result"
                );
                return false;
            }
            state.run_status = result.status;
            if result.status == RunStatus::Aborted {
                state.current_index = 0;
                for stage in &mut state.stages {
                    stage.status = StageStatus::Waiting;
                    emitted.push(StageProgress::new(stage.index, StageStatus::Waiting));
                }
            }
        }

        self.emit(emitted);
        match result.status {
            RunStatus::Completed => {
                info!(run_id = %self.run_id, "Pipeline completed");
                self.log.line("Pipeline completed.");
            }
            RunStatus::Failed => {
                let message = result.error_message.clone().unwrap_or_default();
                warn!(run_id = %self.run_id, error = %message, "Pipeline failed");
                self.log.line(&format!("Pipeline failed: {message}"));
                self.observer.on_error(&message);
            }
            RunStatus::Aborted => {
                info!(run_id = %self.run_id, "Pipeline aborted");
                self.log.line("Run aborted by user.");
            }
            RunStatus::Idle | RunStatus::Running => {}
        }
        self.observer.on_finished(&result);
        self.log.close();
        self.result_tx.send_replace(Some(result));
        true
    }

    fn emit(&self, emitted: Vec<StageProgress>) {
        for progress in emitted {
            self.observer.on_progress(progress);
        }
    }
}

impl std::fmt::Debug for StageBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StageBoard")
            .field("run_id", &self.run_id)
            .field("run_status", &state.run_status)
            .field("current_index", &state.current_index)
            .finish_non_exhaustive()
    }
}

/// The [`ApprovalPort`] handed to stage executors during a run.
///
/// Interactive requests are routed to a stage by ordinal, pause it on the
/// board, and suspend on the gate. In bypass mode the gate answers at once
/// and the board is not touched.
pub struct ApprovalRouter {
    board: Arc<StageBoard>,
    gate: Arc<HumanGate>,
    config: Arc<RunnerConfig>,
    cancel_token: Arc<CancellationToken>,
}

impl ApprovalRouter {
    /// Creates a router for one run.
    #[must_use]
    pub fn new(
        board: Arc<StageBoard>,
        gate: Arc<HumanGate>,
        config: Arc<RunnerConfig>,
        cancel_token: Arc<CancellationToken>,
    ) -> Self {
        Self {
            board,
            gate,
            config,
            cancel_token,
        }
    }

    fn release(&self, slot: ApprovalSlot) {
        if !self.cancel_token.is_cancelled() {
            self.board.withdraw_approval(slot);
        }
    }
}

/// Voids a routed request whose future was dropped before it completed.
struct PendingApproval<'a> {
    router: &'a ApprovalRouter,
    slot: ApprovalSlot,
    armed: bool,
}

impl Drop for PendingApproval<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.router.gate.abandon();
            self.router.release(self.slot);
        }
    }
}

#[async_trait]
impl ApprovalPort for ApprovalRouter {
    async fn request_human(&self, text: &str) -> Result<HumanResponse, GateError> {
        if self.gate.is_bypassed() {
            let prompt = HumanPrompt::new(text, self.board.current_index());
            return self.gate.request(prompt).await;
        }

        let slot = self
            .board
            .pause_for_approval(|ordinal| self.config.stage_for_request(ordinal))?;
        let mut pending = PendingApproval {
            router: self,
            slot,
            armed: true,
        };
        let result = self
            .gate
            .request(HumanPrompt::new(text, slot.stage_index))
            .await;
        pending.armed = false;

        match result {
            Ok(response) => {
                self.board.resume_after_approval(slot);
                Ok(response)
            }
            Err(err) => {
                self.release(slot);
                Err(err)
            }
        }
    }
}
