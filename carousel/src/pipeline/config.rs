//! Runner configuration.

use crate::cancellation::DEFAULT_GRACE_PERIOD;
use crate::errors::ConfigError;
use crate::gate::UnmatchedPromptPolicy;
use crate::logging::LogFallback;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default ordinal table: the first three approval requests pause stages 0, 1 and 3.
pub const DEFAULT_PROMPT_STAGE_MAP: [usize; 3] = [0, 1, 3];

/// Configuration for a [`super::PipelineRunner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Stage paused by the Nth approval request of a run. Requests past the
    /// end of the table reuse the last entry.
    pub prompt_stage_map: Vec<usize>,
    /// How long a cancelled run may take to stop before it is aborted.
    pub grace_period_ms: u64,
    /// What quick-approve does when the prompt has no trigger phrase.
    pub unmatched_prompt: UnmatchedPromptPolicy,
    /// Where run log text goes when it cannot be forwarded.
    pub log_fallback: LogFallback,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            prompt_stage_map: DEFAULT_PROMPT_STAGE_MAP.to_vec(),
            grace_period_ms: u64::try_from(DEFAULT_GRACE_PERIOD.as_millis()).unwrap_or(2000),
            unmatched_prompt: UnmatchedPromptPolicy::default(),
            log_fallback: LogFallback::default(),
        }
    }
}

impl RunnerConfig {
    /// Creates the default config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the prompt-to-stage ordinal table.
    #[must_use]
    pub fn with_prompt_stage_map(mut self, map: impl Into<Vec<usize>>) -> Self {
        self.prompt_stage_map = map.into();
        self
    }

    /// Sets the cancellation grace period.
    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the unmatched quick-approve policy.
    #[must_use]
    pub fn with_unmatched_prompt(mut self, policy: UnmatchedPromptPolicy) -> Self {
        self.unmatched_prompt = policy;
        self
    }

    /// Sets the log fallback destination.
    #[must_use]
    pub fn with_log_fallback(mut self, fallback: LogFallback) -> Self {
        self.log_fallback = fallback;
        self
    }

    /// Returns the grace period as a duration.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Returns the stage index for the `ordinal`-th approval request.
    #[must_use]
    pub fn stage_for_request(&self, ordinal: usize) -> Option<usize> {
        let last = self.prompt_stage_map.len().checked_sub(1)?;
        self.prompt_stage_map.get(ordinal.min(last)).copied()
    }

    /// Checks the ordinal table against the number of stages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyPromptMap`] or
    /// [`ConfigError::PromptMapOutOfRange`].
    pub fn validate(&self, stage_count: usize) -> Result<(), ConfigError> {
        if self.prompt_stage_map.is_empty() {
            return Err(ConfigError::EmptyPromptMap);
        }
        for (position, &stage_index) in self.prompt_stage_map.iter().enumerate() {
            if stage_index >= stage_count {
                return Err(ConfigError::PromptMapOutOfRange {
                    position,
                    stage_index,
                    stage_count,
                });
            }
        }
        Ok(())
    }
}
