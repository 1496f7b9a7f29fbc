//! Testing utilities for carousel pipelines.
//!
//! This module provides:
//! - Mock stage executors (scripted, failing, approving, panicking, stalling)
//! - Status timeline helpers for checking progress sequences

mod mocks;
mod timeline;

pub use mocks::{ApprovalStage, FailingStage, PanickingStage, ScriptedStage, StallingStage};
pub use timeline::{
    assert_monotonic, is_monotonic, max_concurrently_awaiting, observed_timeline, status_timeline,
};
