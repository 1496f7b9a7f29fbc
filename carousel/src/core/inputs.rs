//! Run inputs handed to stage executors.

use crate::errors::InputError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Persona used when none is supplied.
pub const DEFAULT_PERSONA: &str = "General executive audience";

/// Default number of insight stages (slides) per report.
pub const DEFAULT_STAGE_COUNT: u32 = 5;

/// Accepted range for the stage count.
pub const STAGE_COUNT_RANGE: std::ops::RangeInclusive<u32> = 1..=12;

/// Target aspect ratio for generated visuals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    /// Landscape.
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    /// Portrait.
    #[serde(rename = "9:16")]
    Portrait,
    /// Square.
    #[serde(rename = "1:1")]
    Square,
}

impl AspectRatio {
    /// All supported ratios, in display order.
    pub const ALL: [Self; 3] = [Self::Landscape, Self::Portrait, Self::Square];

    /// Returns the `w:h` form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Square => "1:1",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| InputError::UnsupportedAspectRatio(trimmed.to_string()))
    }
}

/// Inputs for a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInputs {
    /// Primary topic of the report.
    pub topic: String,
    /// Number of insight pages to produce.
    pub stage_count: u32,
    /// Aspect ratio for visuals.
    pub aspect_ratio: AspectRatio,
    /// Audience persona guiding tone and layout.
    pub persona: String,
}

impl RunInputs {
    /// Creates inputs for a topic with default settings.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            stage_count: DEFAULT_STAGE_COUNT,
            aspect_ratio: AspectRatio::default(),
            persona: DEFAULT_PERSONA.to_string(),
        }
    }

    /// Sets the stage count.
    #[must_use]
    pub fn with_stage_count(mut self, stage_count: u32) -> Self {
        self.stage_count = stage_count;
        self
    }

    /// Sets the aspect ratio.
    #[must_use]
    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    /// Sets the audience persona.
    #[must_use]
    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    /// Validates and normalizes the inputs.
    ///
    /// Trims the topic and persona, substitutes the default persona when
    /// blank, and checks the stage count range.
    pub fn validated(self) -> Result<Self, InputError> {
        let topic = self.topic.trim().to_string();
        if topic.is_empty() {
            return Err(InputError::MissingTopic);
        }

        if !STAGE_COUNT_RANGE.contains(&self.stage_count) {
            return Err(InputError::StageCountOutOfRange {
                value: self.stage_count,
                min: *STAGE_COUNT_RANGE.start(),
                max: *STAGE_COUNT_RANGE.end(),
            });
        }

        let persona = match self.persona.trim() {
            "" => DEFAULT_PERSONA.to_string(),
            trimmed => trimmed.to_string(),
        };

        Ok(Self {
            topic,
            stage_count: self.stage_count,
            aspect_ratio: self.aspect_ratio,
            persona,
        })
    }

    /// Returns the template variables stage executors interpolate.
    #[must_use]
    pub fn to_template_vars(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("topic_content".to_string(), serde_json::json!(self.topic)),
            ("pages_numbers".to_string(), serde_json::json!(self.stage_count)),
            ("aspect_ratio".to_string(), serde_json::json!(self.aspect_ratio.as_str())),
            ("audience_persona".to_string(), serde_json::json!(self.persona)),
        ])
    }
}
