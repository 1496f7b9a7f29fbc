//! Ordered, labelled list of stages for one pipeline.

use super::{NoOpStage, StageExecutor};
use crate::errors::ConfigError;
use std::collections::HashSet;
use std::sync::Arc;

/// Labels of the report carousel pipeline, in execution order.
pub const CAROUSEL_STAGE_LABELS: [&str; 5] = [
    "Research briefing",
    "Visual design direction",
    "Narrative structuring",
    "HTML layout",
    "PDF rendering",
];

/// The stages a runner drives, in order.
///
/// Each executor's [`name`](StageExecutor::name) is its label. Ordering is
/// fixed once the registry is handed to a runner.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    stages: Vec<Arc<dyn StageExecutor>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default carousel labels.
    #[must_use]
    pub fn carousel_labels() -> Vec<String> {
        CAROUSEL_STAGE_LABELS.iter().map(|s| (*s).to_string()).collect()
    }

    /// Creates a registry of no-op stages with the given labels.
    #[must_use]
    pub fn placeholders<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        labels
            .into_iter()
            .fold(Self::new(), |registry, label| registry.with_stage(NoOpStage::new(label)))
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl StageExecutor + 'static) -> Self {
        self.register(Arc::new(stage));
        self
    }

    /// Appends a shared stage.
    pub fn register(&mut self, stage: Arc<dyn StageExecutor>) {
        self.stages.push(stage);
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if no stages are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the stage at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Arc<dyn StageExecutor>> {
        self.stages.get(index)
    }

    /// Iterates over the stages in order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn StageExecutor>> {
        self.stages.iter()
    }

    /// Returns the labels in order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }

    /// Checks that the registry is non-empty and labels are unique.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyRegistry`] or [`ConfigError::DuplicateStage`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name()) {
                return Err(ConfigError::DuplicateStage(stage.name().to_string()));
            }
        }
        Ok(())
    }
}
