//! Prompt, response and command types exchanged through the gate.

use crate::errors::GateError;
use serde::{Deserialize, Serialize};

/// A request for human input, alive while the request is outstanding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanPrompt {
    /// Text shown to the human.
    pub text: String,
    /// Stage the request was mapped to.
    pub stage_index: usize,
}

impl HumanPrompt {
    /// Creates a prompt.
    #[must_use]
    pub fn new(text: impl Into<String>, stage_index: usize) -> Self {
        Self {
            text: text.into(),
            stage_index,
        }
    }
}

/// The answer delivered to a waiting stage executor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HumanResponse {
    /// Text handed back to the executor.
    pub payload: String,
    /// True when an empty payload is an explicit "press enter" approval.
    pub is_blank_approval: bool,
}

impl HumanResponse {
    /// An explicit empty approval.
    #[must_use]
    pub fn blank() -> Self {
        Self {
            payload: String::new(),
            is_blank_approval: true,
        }
    }

    /// A literal payload, passed through unchanged.
    #[must_use]
    pub fn literal(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            is_blank_approval: false,
        }
    }

    /// A typed response from the operator.
    ///
    /// `y` and `n` pass through untouched; anything else is trimmed and must
    /// not end up empty.
    pub fn typed(text: &str) -> Result<Self, GateError> {
        if matches!(text, "y" | "n") {
            return Ok(Self::literal(text));
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(GateError::ResponseRequired);
        }
        Ok(Self::literal(trimmed))
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A command the observer issues in reply to a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum ResponseCommand {
    /// Quick-approve: answer inferred from the prompt text.
    Approve,
    /// Quick-reject: always `n`.
    Reject,
    /// A typed response.
    Text(String),
}

impl ResponseCommand {
    /// Creates a typed response command.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}
