//! Vordr error types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Vordr error types
#[derive(Debug, thiserror::Error)]
pub enum VordrError {
    // Governance rejections (provider never called)
    #[error("budget exceeded for session '{session_id}': {}", .reasons.join("; "))]
    BudgetExceeded {
        session_id: String,
        reasons: Vec<String>,
    },

    #[error("circuit open for provider '{provider}'")]
    CircuitOpen {
        provider: String,
        /// Time remaining until the circuit becomes eligible for a trial call.
        retry_after: Option<Duration>,
    },

    // Output errors
    #[error("structured output failed validation after {attempts} attempt(s): {}", summarize(.errors))]
    ValidationFailure {
        attempts: u32,
        errors: Vec<ValidationError>,
    },

    // Provider errors
    #[error("provider timed out after {0:?}")]
    ProviderTimeout(Duration),

    #[error("provider call cancelled")]
    ProviderCancelled,

    #[error("provider error: {0}")]
    Provider(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Coarse error category carried on failed responses and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BudgetExceeded,
    CircuitOpen,
    ValidationFailure,
    ProviderTimeout,
    ProviderCancelled,
    ProviderError,
    InvalidRequest,
    Configuration,
}

impl ErrorKind {
    /// Stable label used for metrics and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BudgetExceeded => "budget_exceeded",
            Self::CircuitOpen => "circuit_open",
            Self::ValidationFailure => "validation_failure",
            Self::ProviderTimeout => "provider_timeout",
            Self::ProviderCancelled => "provider_cancelled",
            Self::ProviderError => "provider_error",
            Self::InvalidRequest => "invalid_request",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VordrError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BudgetExceeded { .. } => ErrorKind::BudgetExceeded,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::ValidationFailure { .. } | Self::Json(_) => ErrorKind::ValidationFailure,
            Self::ProviderTimeout(_) => ErrorKind::ProviderTimeout,
            Self::ProviderCancelled => ErrorKind::ProviderCancelled,
            Self::Provider(_) => ErrorKind::ProviderError,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Whether this error counts against a provider's health.
    ///
    /// Timeouts, cancellations and invoker failures are recorded as circuit
    /// breaker failures. Governance rejections and validation failures are
    /// not: the provider either was never called or answered.
    pub fn counts_as_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::ProviderTimeout(_) | Self::ProviderCancelled | Self::Provider(_)
        )
    }

    /// Whether the caller may reasonably retry the same request unchanged.
    ///
    /// Vordr never retries these itself; the decision belongs to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ProviderTimeout(_) | Self::Provider(_) | Self::CircuitOpen { .. }
        )
    }

    /// Hint for how long to wait before retrying, if known.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for Vordr operations
pub type Result<T> = std::result::Result<T, VordrError>;
