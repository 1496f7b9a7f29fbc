//! Single-slot human approval rendezvous.

use super::heuristic::{resolve_command, UnmatchedPromptPolicy};
use super::{HumanPrompt, HumanResponse, ResponseCommand};
use crate::cancellation::CancellationToken;
use crate::errors::GateError;
use crate::observer::PipelineObserver;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Whether the gate waits for a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateMode {
    /// Requests suspend until the observer responds.
    Interactive,
    /// Requests return an empty response immediately.
    Bypass,
}

impl GateMode {
    /// Picks the mode from the per-run "require human feedback" toggle.
    #[must_use]
    pub fn from_feedback_toggle(require_human_feedback: bool) -> Self {
        if require_human_feedback {
            Self::Interactive
        } else {
            Self::Bypass
        }
    }
}

struct PendingRequest {
    prompt: HumanPrompt,
    response_tx: oneshot::Sender<HumanResponse>,
}

/// Connects one approval request from the execution context to one
/// response from the observer.
///
/// The slot holds at most one request. A second request while one is
/// outstanding fails fast; a response with nothing outstanding is logged
/// and rejected. The mode is fixed at construction, so it cannot change
/// under an in-flight request.
pub struct HumanGate {
    mode: GateMode,
    slot: Mutex<Option<PendingRequest>>,
    observer: Arc<dyn PipelineObserver>,
    cancel_token: Arc<CancellationToken>,
}

impl HumanGate {
    /// Creates a gate for one run.
    #[must_use]
    pub fn new(
        mode: GateMode,
        observer: Arc<dyn PipelineObserver>,
        cancel_token: Arc<CancellationToken>,
    ) -> Self {
        Self {
            mode,
            slot: Mutex::new(None),
            observer,
            cancel_token,
        }
    }

    /// Returns the gate mode.
    #[must_use]
    pub fn mode(&self) -> GateMode {
        self.mode
    }

    /// Returns true when requests are answered without a human.
    #[must_use]
    pub fn is_bypassed(&self) -> bool {
        self.mode == GateMode::Bypass
    }

    /// Returns the outstanding prompt, if any.
    #[must_use]
    pub fn pending_prompt(&self) -> Option<HumanPrompt> {
        self.slot.lock().as_ref().map(|pending| pending.prompt.clone())
    }

    /// Registers `prompt` and waits for the matching response.
    ///
    /// The observer is told about the prompt only after the slot is
    /// occupied, so an immediate response always finds it.
    pub async fn request(&self, prompt: HumanPrompt) -> Result<HumanResponse, GateError> {
        if self.is_bypassed() {
            debug!(stage_index = prompt.stage_index, "Gate bypassed; answering blank");
            return Ok(HumanResponse::default());
        }

        if self.cancel_token.is_cancelled() {
            return Err(self.cancelled_error());
        }

        let response_rx = {
            let mut slot = self.slot.lock();
            if let Some(pending) = slot.as_ref() {
                warn!(
                    outstanding_stage = pending.prompt.stage_index,
                    rejected_stage = prompt.stage_index,
                    "Rejecting concurrent human request"
                );
                return Err(GateError::RequestOutstanding {
                    stage_index: pending.prompt.stage_index,
                });
            }
            let (response_tx, response_rx) = oneshot::channel();
            *slot = Some(PendingRequest {
                prompt: prompt.clone(),
                response_tx,
            });
            response_rx
        };

        self.observer.on_prompt(&prompt);

        tokio::select! {
            response = response_rx => response.map_err(|_| GateError::Abandoned),
            () = self.cancel_token.cancelled() => {
                self.abandon();
                Err(self.cancelled_error())
            }
        }
    }

    /// Delivers `response` to the outstanding request.
    ///
    /// Returns the prompt that was answered.
    pub fn respond(&self, response: HumanResponse) -> Result<HumanPrompt, GateError> {
        let Some(pending) = self.slot.lock().take() else {
            warn!("Response received with no outstanding human request");
            return Err(GateError::NoOutstandingRequest);
        };
        self.deliver(pending, response)
    }

    /// Resolves an observer command against the outstanding prompt and
    /// delivers the result.
    ///
    /// A command that fails validation leaves the request outstanding.
    pub fn respond_command(
        &self,
        command: &ResponseCommand,
        policy: UnmatchedPromptPolicy,
    ) -> Result<HumanPrompt, GateError> {
        let pending = {
            let mut slot = self.slot.lock();
            let Some(pending) = slot.as_ref() else {
                warn!(?command, "Command received with no outstanding human request");
                return Err(GateError::NoOutstandingRequest);
            };
            let response = resolve_command(command, &pending.prompt.text, policy)?;
            slot.take().map(|pending| (pending, response))
        };

        match pending {
            Some((pending, response)) => self.deliver(pending, response),
            None => Err(GateError::NoOutstandingRequest),
        }
    }

    /// Voids the outstanding request without answering it.
    ///
    /// The observer is notified that its prompt is void. Returns the
    /// abandoned prompt, if there was one.
    pub fn abandon(&self) -> Option<HumanPrompt> {
        let pending = self.slot.lock().take()?;
        debug!(stage_index = pending.prompt.stage_index, "Abandoning human request");
        self.observer.on_prompt_abandoned(&pending.prompt);
        Some(pending.prompt)
    }

    fn deliver(
        &self,
        pending: PendingRequest,
        response: HumanResponse,
    ) -> Result<HumanPrompt, GateError> {
        let PendingRequest { prompt, response_tx } = pending;
        if response_tx.send(response).is_err() {
            warn!(stage_index = prompt.stage_index, "Requester is gone; response dropped");
            self.observer.on_prompt_abandoned(&prompt);
            return Err(GateError::Abandoned);
        }
        Ok(prompt)
    }

    fn cancelled_error(&self) -> GateError {
        GateError::Cancelled {
            reason: self.cancel_token.reason().unwrap_or_default(),
        }
    }
}

impl std::fmt::Debug for HumanGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanGate")
            .field("mode", &self.mode)
            .field("pending", &self.pending_prompt())
            .finish_non_exhaustive()
    }
}
