//! # Carousel
//!
//! A staged-execution coordinator for report generation pipelines.
//!
//! Carousel runs a fixed, ordered list of content-generation stages in one
//! background tokio task, with support for:
//!
//! - **Sequential stages**: opaque [`stages::StageExecutor`]s driven in order
//! - **Human approval**: a single-slot rendezvous that pauses a stage until
//!   the observer answers, with a quick-approve heuristic
//! - **Live progress**: per-stage status changes, sanitized log lines and one
//!   terminal result per run, delivered through [`observer::PipelineObserver`]
//! - **Cancellation**: cooperative first, forced abort after a grace period
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use carousel::prelude::*;
//!
//! let registry = StageRegistry::new()
//!     .with_stage(ResearchStage::new())
//!     .with_stage(DesignStage::new())
//!     .with_stage(NarrativeStage::new())
//!     .with_stage(LayoutStage::new())
//!     .with_stage(PdfStage::new());
//!
//! let (observer, mut events) = ChannelObserver::new();
//! let runner = PipelineRunner::new(registry, RunnerConfig::default(), Arc::new(observer))?;
//!
//! let handle = runner.start(RunInputs::new("Future of sustainable aviation fuel"), true)?;
//! while let Some(event) = events.recv().await {
//!     if let ObserverEvent::Prompt { .. } = event {
//!         runner.respond(ResponseCommand::Approve)?;
//!     }
//!     if event.is_finished() {
//!         break;
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod artifacts;
pub mod cancellation;
pub mod core;
pub mod errors;
pub mod gate;
pub mod logging;
pub mod observer;
pub mod pipeline;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::artifacts::ArtifactCheck;
    pub use crate::cancellation::{CancelOutcome, CancellationToken};
    pub use crate::core::{
        AspectRatio, PipelineRun, RunHandle, RunInputs, RunResult, RunStatus, StageProgress,
        StageStatus,
    };
    pub use crate::errors::{GateError, RunnerError, StageError};
    pub use crate::gate::{HumanPrompt, HumanResponse, ResponseCommand, UnmatchedPromptPolicy};
    pub use crate::logging::{init_tracing, LogFallback, LogLine, LogSink};
    pub use crate::observer::{
        ChannelObserver, CollectingObserver, LoggingObserver, NoOpObserver, ObserverEvent,
        PipelineObserver,
    };
    pub use crate::pipeline::{PipelineRunner, RunnerConfig};
    pub use crate::stages::{FnStage, StageContext, StageExecutor, StageRegistry};
    pub use crate::utils::{generate_run_id, iso_timestamp};
    pub use std::sync::Arc;
}
