//! Human-in-the-loop approval.
//!
//! - [`HumanGate`]: the single-slot rendezvous between a stage executor and
//!   the observer
//! - Quick-approve / quick-reject heuristic as a declarative rule table
//! - Prompt, response and command types

mod heuristic;
mod rendezvous;
mod response;

pub use heuristic::{
    match_quick_approve, quick_reject, resolve_command, resolve_quick_approve, ApprovalRule,
    QuickReply, UnmatchedPromptPolicy, APPROVAL_RULES, FALLBACK_APPROVAL, REJECT_RESPONSE,
};
pub use rendezvous::{GateMode, HumanGate};
pub use response::{HumanPrompt, HumanResponse, ResponseCommand};
