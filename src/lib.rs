//! Vordr - Governance layer for LLM operations
//!
//! Vordr sits between an application and its LLM providers. Every call goes
//! through a single [`Orchestrator`] that applies, in order:
//!
//! - **presets**: per-operation defaults for temperature, sampling, token
//!   limits, timeouts and retry policy;
//! - **budgets**: per-operation and per-session token and cost ceilings,
//!   enforced before the provider is called;
//! - **caching**: deterministic (low-temperature) responses are served from
//!   a TTL-aware LRU cache;
//! - **circuit breaking**: unhealthy providers are failed fast until they
//!   recover;
//! - **validation**: structured output is checked against a schema and
//!   repaired by re-prompting;
//! - **telemetry**: every operation leaves a record and `metrics` counters.
//!
//! Providers are plugged in through the [`ProviderInvoker`] trait; Vordr
//! never talks HTTP itself.
//!
//! # Example
//!
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use vordr::{
//!     BudgetConfig, InvocationRequest, OperationRequest, OperationType, ProviderOutput, Vordr,
//!     invoker_fn,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> vordr::Result<()> {
//!     let vordr = Vordr::builder()
//!         .budget_config(BudgetConfig::new().max_tokens_per_session(50_000))
//!         .build()?;
//!
//!     let provider = invoker_fn(|request: InvocationRequest, _cancel| async move {
//!         Ok(ProviderOutput::new(format!("echo: {}", request.prompt), 12, 4))
//!     });
//!
//!     let request = OperationRequest::new(
//!         "session-1",
//!         OperationType::Summarization,
//!         "echo",
//!         "echo-1",
//!         "Summarize the quarterly report.",
//!     );
//!     let response = vordr
//!         .execute(request, &provider, &CancellationToken::new())
//!         .await;
//!
//!     assert!(response.success);
//!     assert_eq!(response.content(), Some("echo: Summarize the quarterly report."));
//!     Ok(())
//! }
//! ```

pub mod breaker;
pub mod budget;
pub mod cache;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod presets;
pub mod providers;
pub mod telemetry;
pub mod validation;
pub mod version;

// Re-export main types at crate root
pub use error::{ErrorKind, Result, VordrError};
pub use orchestrator::{
    OperationError, OperationRequest, OperationResponse, Orchestrator, Vordr, VordrBuilder,
};
pub use version::{PKG_VERSION, version_string};

pub use breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitSnapshot, CircuitState,
};
pub use budget::{
    BudgetCheck, BudgetConfig, BudgetManager, CostModel, SessionBudget, TokenPricing,
    estimate_tokens,
};
pub use cache::{CacheConfig, CacheKey, CacheStats, KeyInput, ResponseCache, generate_key};
pub use config::Config;
pub use presets::{OperationPreset, OperationType, PresetOverrides, PresetRegistry};
pub use providers::{
    InvocationParameters, InvocationRequest, ProviderInvoker, ProviderOutput, invoker_fn,
};
pub use telemetry::{OperationTelemetry, TelemetryCollector, TelemetryStatistics};
pub use validation::{
    FieldKind, FieldRule, OutputSchema, StructuredOutput, ValidationError, ValidationResult,
    ValidationRule, validate_and_deserialize,
};
