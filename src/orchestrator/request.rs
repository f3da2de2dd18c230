//! Request and response types for governed operations.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ErrorKind, VordrError};
use crate::presets::{OperationPreset, OperationType, PresetOverrides};
use crate::telemetry::OperationTelemetry;
use crate::validation::{OutputSchema, ValidationError};

/// One operation to run through the orchestrator.
///
/// ```rust
/// # use vordr::{OperationRequest, OperationType};
/// let request = OperationRequest::new(
///     "job-42",
///     OperationType::SceneAnalysis,
///     "openai",
///     "gpt-4",
///     "describe scene 1",
/// )
/// .system_prompt("You are a film analyst.")
/// .temperature(0.1);
/// ```
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub session_id: String,
    pub operation_type: OperationType,
    /// Provider name; selects the circuit breaker.
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    /// Full preset replacing the registry default for this call.
    pub preset: Option<OperationPreset>,
    /// Per-field overrides applied on top of the resolved preset.
    pub overrides: PresetOverrides,
    /// Schema the response must satisfy. `None` accepts any text.
    pub output_schema: Option<OutputSchema>,
    /// Provider-specific parameters, included in the cache key.
    pub extra: BTreeMap<String, Value>,
}

impl OperationRequest {
    pub fn new(
        session_id: impl Into<String>,
        operation_type: impl Into<OperationType>,
        provider: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            operation_type: operation_type.into(),
            provider: provider.into(),
            model: model.into(),
            prompt: prompt.into(),
            system_prompt: None,
            preset: None,
            overrides: PresetOverrides::default(),
            output_schema: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn preset(mut self, preset: OperationPreset) -> Self {
        self.preset = Some(preset);
        self
    }

    pub fn overrides(mut self, overrides: PresetOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Shorthand for a temperature override.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.overrides.temperature = Some(temperature);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.overrides.max_retries = Some(max_retries);
        self
    }

    pub fn output_schema(mut self, schema: OutputSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// Failure details carried on an unsuccessful [`OperationResponse`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Rule violations from the final attempt, for validation failures.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<ValidationError>,
}

impl From<&VordrError> for OperationError {
    fn from(error: &VordrError) -> Self {
        let validation_errors = match error {
            VordrError::ValidationFailure { errors, .. } => errors.clone(),
            _ => Vec::new(),
        };
        Self {
            kind: error.kind(),
            message: error.to_string(),
            retry_after_ms: error.retry_after().map(|d| d.as_millis() as u64),
            validation_errors,
        }
    }
}

/// Outcome of one governed operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationResponse {
    pub operation_id: Uuid,
    pub success: bool,
    /// Response text; for structured operations, the extracted JSON document.
    pub content: Option<String>,
    pub was_cached: bool,
    /// Provider invocations made (0 for cache hits and rejections).
    pub attempts: u32,
    /// Budget notices surfaced without blocking the call.
    pub warnings: Vec<String>,
    pub error: Option<OperationError>,
    /// Effective preset, once resolved.
    pub preset: Option<OperationPreset>,
    /// Telemetry for the operation; `None` when it was rejected before
    /// reaching a provider.
    pub telemetry: Option<OperationTelemetry>,
}

impl OperationResponse {
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}
