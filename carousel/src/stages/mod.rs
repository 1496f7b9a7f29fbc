//! Stage executor trait and the registry of stages.
//!
//! Stage executors are opaque: the runner only knows their label, that they
//! may log, that they may ask a human, and whether they returned an error.

mod context;
mod ports;
mod registry;

pub use context::StageContext;
pub use ports::{ApprovalPort, AutoApprove};
pub use registry::{StageRegistry, CAROUSEL_STAGE_LABELS};

use crate::errors::StageError;
use async_trait::async_trait;
use std::fmt::Debug;

/// One unit of work in the pipeline.
#[async_trait]
pub trait StageExecutor: Send + Sync + Debug {
    /// Returns the stage label.
    fn name(&self) -> &str;

    /// Runs the stage to completion.
    ///
    /// # Errors
    ///
    /// Any error ends the run as failed.
    async fn execute(&self, ctx: &StageContext) -> Result<(), StageError>;
}

/// A stage backed by a synchronous closure.
pub struct FnStage<F>
where
    F: Fn(&StageContext) -> Result<(), StageError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext) -> Result<(), StageError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext) -> Result<(), StageError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> StageExecutor for FnStage<F>
where
    F: Fn(&StageContext) -> Result<(), StageError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        (self.func)(ctx)
    }
}

/// A stage that does nothing.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl StageExecutor for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> Result<(), StageError> {
        Ok(())
    }
}
