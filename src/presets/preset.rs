//! Preset types: operation categories and their governed parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Result, VordrError};

/// Highest temperature any provider accepts.
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Named category of LLM call, each with its own governed preset.
///
/// The well-known variants cover the operations of a video-generation
/// pipeline. `Custom(String)` handles anything else; custom operations
/// resolve to the registry's fallback preset unless configured.
///
/// Serializes as a flat snake_case string (e.g. `"scene_analysis"`), so it
/// works as a TOML table key. Parsing is lenient about case and separators:
/// `"SceneAnalysis"`, `"scene-analysis"` and `"scene_analysis"` are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationType {
    PlanScaffolding,
    SceneAnalysis,
    VisualPrompt,
    CreativeScripting,
    NarrationRefinement,
    Summarization,
    Extraction,
    Classification,
    Translation,
    /// Operation category not in the well-known set.
    Custom(String),
}

impl OperationType {
    /// Every well-known operation type, in declaration order.
    pub const WELL_KNOWN: [OperationType; 9] = [
        Self::PlanScaffolding,
        Self::SceneAnalysis,
        Self::VisualPrompt,
        Self::CreativeScripting,
        Self::NarrationRefinement,
        Self::Summarization,
        Self::Extraction,
        Self::Classification,
        Self::Translation,
    ];

    /// Canonical snake_case name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::PlanScaffolding => "plan_scaffolding",
            Self::SceneAnalysis => "scene_analysis",
            Self::VisualPrompt => "visual_prompt",
            Self::CreativeScripting => "creative_scripting",
            Self::NarrationRefinement => "narration_refinement",
            Self::Summarization => "summarization",
            Self::Extraction => "extraction",
            Self::Classification => "classification",
            Self::Translation => "translation",
            Self::Custom(s) => s.as_str(),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        Ok(match folded.as_str() {
            "planscaffolding" | "planning" => Self::PlanScaffolding,
            "sceneanalysis" => Self::SceneAnalysis,
            "visualprompt" => Self::VisualPrompt,
            "creativescripting" | "scripting" => Self::CreativeScripting,
            "narrationrefinement" => Self::NarrationRefinement,
            "summarization" => Self::Summarization,
            "extraction" => Self::Extraction,
            "classification" => Self::Classification,
            "translation" => Self::Translation,
            _ => Self::Custom(s.trim().to_string()),
        })
    }
}

impl From<&str> for OperationType {
    fn from(s: &str) -> Self {
        // FromStr is infallible for OperationType
        match s.parse() {
            Ok(op) => op,
            Err(never) => match never {},
        }
    }
}

impl Serialize for OperationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OperationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(OperationType::from(s.as_str()))
    }
}

/// Governed default parameters for one operation type.
///
/// Immutable once constructed: every constructor validates, and the
/// `with_*` methods return a new validated copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationPreset {
    operation_type: OperationType,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    timeout_seconds: u64,
    max_retries: u32,
}

impl OperationPreset {
    /// Create a validated preset.
    ///
    /// Fails with `InvalidRequest` when `temperature` is outside `[0, 2]`,
    /// `top_p` outside `(0, 1]`, or `max_tokens`/`timeout_seconds` is zero.
    pub fn new(
        operation_type: OperationType,
        temperature: f32,
        top_p: f32,
        max_tokens: u32,
        timeout_seconds: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let preset = Self {
            operation_type,
            temperature,
            top_p,
            max_tokens,
            timeout_seconds,
            max_retries,
        };
        preset.validate()?;
        Ok(preset)
    }

    /// Construct from constants known to satisfy the invariants.
    pub(crate) fn from_trusted(
        operation_type: OperationType,
        temperature: f32,
        top_p: f32,
        max_tokens: u32,
        timeout_seconds: u64,
        max_retries: u32,
    ) -> Self {
        Self {
            operation_type,
            temperature,
            top_p,
            max_tokens,
            timeout_seconds,
            max_retries,
        }
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(VordrError::InvalidRequest(format!(
                "temperature {} for '{}' must be within [0, {MAX_TEMPERATURE}]",
                self.temperature, self.operation_type
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(VordrError::InvalidRequest(format!(
                "top_p {} for '{}' must be within (0, 1]",
                self.top_p, self.operation_type
            )));
        }
        if self.max_tokens == 0 {
            return Err(VordrError::InvalidRequest(format!(
                "max_tokens for '{}' must be positive",
                self.operation_type
            )));
        }
        if self.timeout_seconds == 0 {
            return Err(VordrError::InvalidRequest(format!(
                "timeout_seconds for '{}' must be positive",
                self.operation_type
            )));
        }
        Ok(())
    }

    pub fn operation_type(&self) -> &OperationType {
        &self.operation_type
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn top_p(&self) -> f32 {
        self.top_p
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    /// Provider call timeout as a `Duration`.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Copy of this preset for another operation type.
    pub fn for_operation(&self, operation_type: OperationType) -> Self {
        Self {
            operation_type,
            ..self.clone()
        }
    }

    /// Copy with a different temperature.
    pub fn with_temperature(&self, temperature: f32) -> Result<Self> {
        self.apply(&PresetOverrides {
            temperature: Some(temperature),
            ..Default::default()
        })
    }

    /// Copy with a different retry limit.
    pub fn with_max_retries(&self, max_retries: u32) -> Result<Self> {
        self.apply(&PresetOverrides {
            max_retries: Some(max_retries),
            ..Default::default()
        })
    }

    /// Copy with every set override applied, validated.
    ///
    /// Unset override fields keep this preset's values.
    pub fn apply(&self, overrides: &PresetOverrides) -> Result<Self> {
        let preset = Self {
            operation_type: self.operation_type.clone(),
            temperature: overrides.temperature.unwrap_or(self.temperature),
            top_p: overrides.top_p.unwrap_or(self.top_p),
            max_tokens: overrides.max_tokens.unwrap_or(self.max_tokens),
            timeout_seconds: overrides.timeout_seconds.unwrap_or(self.timeout_seconds),
            max_retries: overrides.max_retries.unwrap_or(self.max_retries),
        };
        preset.validate()?;
        Ok(preset)
    }
}

/// Partial preset: only set fields replace the base preset's values.
///
/// Used both for per-request overrides and for `[presets.<operation>]`
/// configuration tables, where a partial entry merges over the built-in
/// default for that operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresetOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl PresetOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no fields are set.
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.max_tokens.is_none()
            && self.timeout_seconds.is_none()
            && self.max_retries.is_none()
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = Some(secs);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> OperationPreset {
        OperationPreset::new(OperationType::SceneAnalysis, 0.2, 0.9, 1500, 45, 2).unwrap()
    }

    #[test]
    fn operation_type_parses_leniently() {
        assert_eq!(
            "SceneAnalysis".parse::<OperationType>().unwrap(),
            OperationType::SceneAnalysis
        );
        assert_eq!(
            OperationType::from("scene-analysis"),
            OperationType::SceneAnalysis
        );
        assert_eq!(
            OperationType::from("storyboard"),
            OperationType::Custom("storyboard".into())
        );
    }

    #[test]
    fn operation_type_serializes_as_snake_case() {
        let json = serde_json::to_string(&OperationType::VisualPrompt).unwrap();
        assert_eq!(json, r#""visual_prompt""#);
        let back: OperationType = serde_json::from_str(r#""CreativeScripting""#).unwrap();
        assert_eq!(back, OperationType::CreativeScripting);
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        assert!(OperationPreset::new(OperationType::Extraction, 2.5, 1.0, 100, 10, 0).is_err());
        assert!(OperationPreset::new(OperationType::Extraction, -0.1, 1.0, 100, 10, 0).is_err());
        assert!(OperationPreset::new(OperationType::Extraction, 2.0, 1.0, 100, 10, 0).is_ok());
    }

    #[test]
    fn rejects_zero_top_p_and_tokens() {
        assert!(OperationPreset::new(OperationType::Extraction, 0.0, 0.0, 100, 10, 0).is_err());
        assert!(OperationPreset::new(OperationType::Extraction, 0.0, 1.0, 0, 10, 0).is_err());
        assert!(OperationPreset::new(OperationType::Extraction, 0.0, 1.0, 10, 0, 0).is_err());
    }

    #[test]
    fn apply_returns_new_value_and_leaves_base_untouched() {
        let preset = base();
        let custom = preset
            .apply(&PresetOverrides::new().temperature(0.8).max_retries(5))
            .unwrap();
        assert_eq!(custom.temperature(), 0.8);
        assert_eq!(custom.max_retries(), 5);
        assert_eq!(custom.max_tokens(), 1500);
        assert_eq!(preset.temperature(), 0.2);
        assert_eq!(preset.max_retries(), 2);
    }

    #[test]
    fn apply_validates_result() {
        assert!(base().with_temperature(3.0).is_err());
    }

    #[test]
    fn overrides_is_empty() {
        assert!(PresetOverrides::default().is_empty());
        assert!(!PresetOverrides::new().top_p(0.5).is_empty());
    }

    #[test]
    fn overrides_reject_unknown_fields() {
        let err = toml::from_str::<PresetOverrides>("temprature = 0.3").unwrap_err();
        assert!(err.to_string().contains("temprature"));
    }
}
