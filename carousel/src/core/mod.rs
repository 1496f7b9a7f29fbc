//! Core domain model types.
//!
//! - Stage and run status enums
//! - Run inputs
//! - Run handles, results, snapshots and progress updates

mod inputs;
mod run;
mod status;

pub use inputs::{AspectRatio, RunInputs, DEFAULT_PERSONA, DEFAULT_STAGE_COUNT, STAGE_COUNT_RANGE};
pub use run::{PipelineRun, RunHandle, RunResult, Stage, StageProgress};
pub use status::{RunStatus, StageStatus};
