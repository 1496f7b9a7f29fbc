//! Pipeline configuration and execution.
//!
//! This module provides:
//! - Runner configuration
//! - The stage board, which owns stage statuses and routes approvals
//! - The pipeline runner and its execution context

mod board;
mod config;
mod integration_tests;
mod runner;

pub use config::{RunnerConfig, DEFAULT_PROMPT_STAGE_MAP};
pub use runner::PipelineRunner;
