//! Operation telemetry and metric name constants.
//!
//! [`TelemetryCollector`] keeps an in-memory record of every governed
//! operation and computes aggregate statistics on demand. Independently, the
//! crate emits `metrics` counters and histograms under the names below.
//! Consumers install their own `metrics` recorder (e.g. prometheus, statsd);
//! without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `vordr_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name (e.g. "openai", "anthropic")
//! - `operation`: operation type (e.g. "scene_analysis")
//! - `status`: outcome: "ok" or "error"
//! - `direction`: token direction: "input" or "output"
//! - `reason`: rejection reason: "budget_exceeded" or "circuit_open"

pub mod collector;
pub mod stats;

pub use collector::{OperationTelemetry, TelemetryCollector};
pub use stats::{ProviderStatistics, TelemetryStatistics};

/// Total operations executed through the orchestrator (cache hits included).
///
/// Labels: `provider`, `operation`, `status` ("ok" | "error").
pub const OPERATIONS_TOTAL: &str = "vordr_operations_total";

/// Operation duration in seconds.
///
/// Labels: `provider`, `operation`.
pub const OPERATION_DURATION_SECONDS: &str = "vordr_operation_duration_seconds";

/// Total tokens consumed.
///
/// Labels: `provider`, `direction` ("input" | "output").
pub const TOKENS_TOTAL: &str = "vordr_tokens_total";

/// Total response cache hits.
pub const CACHE_HITS_TOTAL: &str = "vordr_cache_hits_total";

/// Total response cache misses (expired entries included).
pub const CACHE_MISSES_TOTAL: &str = "vordr_cache_misses_total";

/// Total entries dropped from the response cache.
///
/// Labels: `cause` ("size" | "expired").
pub const CACHE_EVICTIONS_TOTAL: &str = "vordr_cache_evictions_total";

/// Total repair attempts (not counting the initial request).
///
/// Labels: `provider`, `operation`.
pub const RETRIES_TOTAL: &str = "vordr_retries_total";

/// Operations refused before reaching a provider.
///
/// Labels: `provider`, `reason` ("budget_exceeded" | "circuit_open").
pub const REJECTIONS_TOTAL: &str = "vordr_rejections_total";

/// Circuit breaker state transitions.
///
/// Labels: `provider`, `to` ("closed" | "open" | "half_open").
pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "vordr_circuit_transitions_total";
