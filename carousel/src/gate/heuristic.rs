//! Quick-approve heuristic.
//!
//! An ordered table of trigger-phrase sets, evaluated first match wins
//! against the lowercased prompt text. Blank-submission phrases come first,
//! then literal keywords.

use super::{HumanResponse, ResponseCommand};
use crate::errors::GateError;
use serde::{Deserialize, Serialize};

/// What a matched rule answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickReply {
    /// Submit nothing, explicitly allowed.
    Blank,
    /// Submit this literal keyword.
    Keyword(&'static str),
}

impl QuickReply {
    /// Converts the reply into a gate response.
    #[must_use]
    pub fn into_response(self) -> HumanResponse {
        match self {
            Self::Blank => HumanResponse::blank(),
            Self::Keyword(keyword) => HumanResponse::literal(keyword),
        }
    }
}

/// One row of the heuristic table.
#[derive(Debug, Clone, Copy)]
pub struct ApprovalRule {
    /// Lowercase substrings, any of which selects this rule.
    pub triggers: &'static [&'static str],
    /// The reply when selected.
    pub reply: QuickReply,
}

impl ApprovalRule {
    fn matches(&self, lowered: &str) -> bool {
        self.triggers.iter().any(|trigger| lowered.contains(trigger))
    }
}

/// The ordered quick-approve table.
pub const APPROVAL_RULES: &[ApprovalRule] = &[
    ApprovalRule {
        triggers: &[
            "press enter",
            "hit enter",
            "just press enter",
            "simply press enter",
            "press the enter key",
            "press enter to continue",
            "press enter to approve",
            "press enter without typing",
            "press enter without any text",
            "press enter with no text",
            "hit enter without typing",
            "hit enter without any text",
            "hit enter without typing anything",
            "simply hit enter",
        ],
        reply: QuickReply::Blank,
    },
    ApprovalRule {
        triggers: &[
            "type \"continue\"",
            "type 'continue'",
            "type continue",
            "enter continue",
            "respond continue",
        ],
        reply: QuickReply::Keyword("continue"),
    },
    ApprovalRule {
        triggers: &["type \"yes\"", "type 'yes'", "type yes", "enter yes", "respond yes"],
        reply: QuickReply::Keyword("yes"),
    },
    ApprovalRule {
        triggers: &["type \"approve\"", "type 'approve'", "type approve", "enter approve"],
        reply: QuickReply::Keyword("approve"),
    },
    ApprovalRule {
        triggers: &["type \"y\"", "type 'y'", "type y", "enter y"],
        reply: QuickReply::Keyword("y"),
    },
    ApprovalRule {
        triggers: &["type ok", "enter ok", "respond ok"],
        reply: QuickReply::Keyword("ok"),
    },
    ApprovalRule {
        triggers: &["type proceed", "enter proceed"],
        reply: QuickReply::Keyword("proceed"),
    },
];

/// Answer used when no rule matches and the policy allows guessing.
pub const FALLBACK_APPROVAL: &str = "y";

/// Answer for quick-reject.
pub const REJECT_RESPONSE: &str = "n";

/// What quick-approve does with a prompt no rule recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPromptPolicy {
    /// Answer `y`.
    #[default]
    AssumeYes,
    /// Refuse, so the operator has to type a response.
    Unhandled,
}

/// Returns the first rule reply matching `prompt`, if any.
#[must_use]
pub fn match_quick_approve(prompt: &str) -> Option<QuickReply> {
    let lowered = prompt.to_lowercase();
    APPROVAL_RULES
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| rule.reply)
}

/// Resolves quick-approve for `prompt`, falling back to `y`.
#[must_use]
pub fn resolve_quick_approve(prompt: &str) -> HumanResponse {
    match_quick_approve(prompt).map_or_else(
        || HumanResponse::literal(FALLBACK_APPROVAL),
        QuickReply::into_response,
    )
}

/// Resolves quick-reject. The prompt text is irrelevant.
#[must_use]
pub fn quick_reject() -> HumanResponse {
    HumanResponse::literal(REJECT_RESPONSE)
}

/// Turns an observer command into the response for `prompt`.
pub fn resolve_command(
    command: &ResponseCommand,
    prompt: &str,
    policy: UnmatchedPromptPolicy,
) -> Result<HumanResponse, GateError> {
    match command {
        ResponseCommand::Approve => match (match_quick_approve(prompt), policy) {
            (Some(reply), _) => Ok(reply.into_response()),
            (None, UnmatchedPromptPolicy::AssumeYes) => Ok(HumanResponse::literal(FALLBACK_APPROVAL)),
            (None, UnmatchedPromptPolicy::Unhandled) => Err(GateError::UnhandledPrompt),
        },
        ResponseCommand::Reject => Ok(quick_reject()),
        ResponseCommand::Text(text) => HumanResponse::typed(text),
    }
}
