//! Mock stage executors for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::StageError;
use crate::gate::HumanResponse;
use crate::stages::{StageContext, StageExecutor};

/// A stage that writes scripted lines to the run log and records its calls.
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    lines: Vec<String>,
    call_count: AtomicUsize,
}

impl ScriptedStage {
    /// Creates a stage that logs nothing.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lines: Vec::new(),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Adds a line to print when the stage runs.
    #[must_use]
    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    /// Returns the number of times the stage ran.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageExecutor for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let mut out = ctx.log();
        for line in &self.lines {
            writeln!(out, "{line}").map_err(|e| StageError::failed(&self.name, e))?;
        }
        Ok(())
    }
}

/// A stage that always fails.
#[derive(Debug, Clone)]
pub struct FailingStage {
    name: String,
    message: String,
}

impl FailingStage {
    /// Creates a failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl StageExecutor for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> Result<(), StageError> {
        Err(StageError::message(&self.name, &self.message))
    }
}

/// A stage that asks for human approval once per prompt and records the answers.
#[derive(Debug)]
pub struct ApprovalStage {
    name: String,
    prompts: Vec<String>,
    responses: Mutex<Vec<HumanResponse>>,
}

impl ApprovalStage {
    /// Creates a stage asking `prompt`.
    #[must_use]
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompts: vec![prompt.into()],
            responses: Mutex::new(Vec::new()),
        }
    }

    /// Adds another prompt, asked after the previous one is answered.
    #[must_use]
    pub fn then_ask(mut self, prompt: impl Into<String>) -> Self {
        self.prompts.push(prompt.into());
        self
    }

    /// Returns the responses received so far.
    #[must_use]
    pub fn responses(&self) -> Vec<HumanResponse> {
        self.responses.lock().clone()
    }
}

#[async_trait]
impl StageExecutor for ApprovalStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        for prompt in &self.prompts {
            ctx.log_line(prompt);
            let response = ctx.request_human(prompt).await?;
            self.responses.lock().push(response);
        }
        Ok(())
    }
}

/// A stage that panics.
#[derive(Debug, Clone)]
pub struct PanickingStage {
    name: String,
}

impl PanickingStage {
    /// Creates a panicking stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl StageExecutor for PanickingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext) -> Result<(), StageError> {
        panic!("{} crashed", self.name);
    }
}

/// A stage that runs for a long time.
///
/// A cooperative stall ends early when the run is cancelled; a stubborn
/// one ignores cancellation and has to be aborted.
#[derive(Debug, Clone)]
pub struct StallingStage {
    name: String,
    duration: Duration,
    cooperative: bool,
}

impl StallingStage {
    /// Creates a stage that stops as soon as the run is cancelled.
    #[must_use]
    pub fn cooperative(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            cooperative: true,
        }
    }

    /// Creates a stage that ignores cancellation.
    #[must_use]
    pub fn stubborn(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            cooperative: false,
        }
    }
}

#[async_trait]
impl StageExecutor for StallingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext) -> Result<(), StageError> {
        if self.cooperative {
            tokio::select! {
                () = tokio::time::sleep(self.duration) => Ok(()),
                () = ctx.cancelled() => Err(StageError::message(&self.name, "cancelled")),
            }
        } else {
            tokio::time::sleep(self.duration).await;
            Ok(())
        }
    }
}
