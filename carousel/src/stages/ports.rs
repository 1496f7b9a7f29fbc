//! Capabilities injected into stage executors.

use crate::errors::GateError;
use crate::gate::HumanResponse;
use async_trait::async_trait;

/// Where a stage sends human approval requests.
///
/// The runner implements this by routing each request to a stage and
/// suspending on the gate. Executors only see the text they asked with and
/// the response they got back.
#[async_trait]
pub trait ApprovalPort: Send + Sync {
    /// Asks a human to respond to `text` and waits for the answer.
    async fn request_human(&self, text: &str) -> Result<HumanResponse, GateError>;
}

/// An approval port that answers every request with a blank approval.
///
/// Used for contexts built outside a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalPort for AutoApprove {
    async fn request_human(&self, _text: &str) -> Result<HumanResponse, GateError> {
        Ok(HumanResponse::default())
    }
}
