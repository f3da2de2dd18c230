//! The governed execution path.
//!
//! [`Orchestrator::execute`] runs one operation through every guard in
//! order:
//!
//! 1. resolve the effective preset (registry default, request preset,
//!    per-field overrides);
//! 2. check the session budget against an estimate, refusing the call under
//!    hard enforcement;
//! 3. serve deterministic operations from the response cache;
//! 4. gate the provider call on its circuit breaker;
//! 5. validate structured output, re-asking with a repair prompt up to the
//!    preset's retry limit;
//! 6. record telemetry, then (successful, validated responses only) charge
//!    the budget and populate the cache.
//!
//! Failures never surface as `Err`: every outcome is an
//! [`OperationResponse`] carrying an [`OperationError`] when unsuccessful,
//! so callers can decide whether to retry, fall back to another provider,
//! or abort the session.

mod attempt;
pub mod builder;
pub mod request;

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use attempt::Attempt;
pub use builder::{Vordr, VordrBuilder};
pub use request::{OperationError, OperationRequest, OperationResponse};

use crate::breaker::{CircuitBreakerRegistry, CircuitSnapshot};
use crate::budget::{BudgetManager, CostModel, SessionBudget, estimate_tokens};
use crate::cache::{CacheKey, CacheStats, KeyInput, ResponseCache, spawn_expiry_sweeper};
use crate::presets::{OperationPreset, PresetRegistry};
use crate::providers::{InvocationParameters, InvocationRequest, ProviderInvoker, ProviderOutput};
use crate::telemetry::{self, OperationTelemetry, TelemetryCollector, TelemetryStatistics};
use crate::validation::{
    OutputSchema, StructuredOutput, ValidationResult, extract_json, validate_as, validate_text,
};
use crate::{Result, VordrError};

/// Prompt sent by [`Orchestrator::health_check`].
const HEALTH_PROBE_PROMPT: &str = "ping";

/// Decides whether raw model output satisfies a request's schema.
type OutputCheck = fn(&OutputSchema, &str) -> ValidationResult;

fn schema_check(schema: &OutputSchema, text: &str) -> ValidationResult {
    validate_text(schema, text).0
}

fn typed_check<T: StructuredOutput>(schema: &OutputSchema, text: &str) -> ValidationResult {
    validate_as::<T>(schema, text).0
}

/// Single entry point composing presets, budgets, cache, circuit breakers,
/// validation and telemetry.
///
/// Construct with [`Vordr::builder()`]. All shared services are `Arc`s, so
/// one orchestrator can serve any number of concurrent sessions.
pub struct Orchestrator {
    presets: Arc<PresetRegistry>,
    cache: Arc<ResponseCache>,
    budgets: Arc<BudgetManager>,
    breakers: Arc<CircuitBreakerRegistry>,
    telemetry: Arc<TelemetryCollector>,
    costs: CostModel,
}

/// Tokens consumed across every invocation of one operation.
#[derive(Debug, Default, Clone, Copy)]
struct Usage {
    tokens_in: u64,
    tokens_out: u64,
}

impl Usage {
    fn add(&mut self, output: &ProviderOutput) {
        self.tokens_in += output.tokens_in;
        self.tokens_out += output.tokens_out;
    }

    fn total(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }
}

impl Orchestrator {
    pub(crate) fn from_parts(
        presets: Arc<PresetRegistry>,
        cache: Arc<ResponseCache>,
        budgets: Arc<BudgetManager>,
        breakers: Arc<CircuitBreakerRegistry>,
        telemetry: Arc<TelemetryCollector>,
        costs: CostModel,
    ) -> Self {
        Self {
            presets,
            cache,
            budgets,
            breakers,
            telemetry,
            costs,
        }
    }

    /// Run one governed operation.
    pub async fn execute(
        &self,
        request: OperationRequest,
        invoker: &dyn ProviderInvoker,
        cancel: &CancellationToken,
    ) -> OperationResponse {
        self.run(request, invoker, cancel, schema_check).await
    }

    /// Run an operation whose output must deserialize into `T`.
    ///
    /// The request's schema is replaced by `T::schema()`. Output that fits
    /// the schema but not `T` is repaired like any other validation
    /// failure. The value is `Some` exactly when the response is successful.
    pub async fn execute_structured<T: StructuredOutput>(
        &self,
        request: OperationRequest,
        invoker: &dyn ProviderInvoker,
        cancel: &CancellationToken,
    ) -> (OperationResponse, Option<T>) {
        let request = request.output_schema(T::schema());
        let response = self.run(request, invoker, cancel, typed_check::<T>).await;
        let value = match response.content.as_deref() {
            Some(content) if response.success => serde_json::from_str(content).ok(),
            _ => None,
        };
        (response, value)
    }

    #[instrument(name = "execute", skip_all, fields(
        session = %request.session_id,
        operation = %request.operation_type,
        provider = %request.provider,
    ))]
    async fn run(
        &self,
        request: OperationRequest,
        invoker: &dyn ProviderInvoker,
        cancel: &CancellationToken,
        check: OutputCheck,
    ) -> OperationResponse {
        let operation_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        let preset = match self.resolve_preset(&request) {
            Ok(preset) => preset,
            Err(e) => {
                warn!(error = %e, "rejecting request with invalid preset");
                return rejected(operation_id, None, Vec::new(), &e);
            }
        };

        let estimated_in = estimate_tokens(&request.prompt)
            + request.system_prompt.as_deref().map_or(0, estimate_tokens);
        let estimated_out = u64::from(preset.max_tokens());
        let estimated_cost = self.costs.cost(&request.model, estimated_in, estimated_out);
        let budget = self.budgets.check_budget(
            &request.session_id,
            estimated_in + estimated_out,
            estimated_cost,
        );
        let warnings = budget.warnings.clone();
        if !budget.is_within_budget && self.budgets.config().enforce_hard_limits {
            let error = VordrError::BudgetExceeded {
                session_id: request.session_id.clone(),
                reasons: budget.violations,
            };
            record_rejection(&request.provider, &error);
            return rejected(operation_id, Some(preset), warnings, &error);
        }

        let cache_key = self
            .cache
            .config()
            .is_cacheable(preset.temperature())
            .then(|| cache_key(&request, &preset));

        if let Some(key) = &cache_key
            && let Some(payload) = self.cache.get(key)
            && passes_check(&request, check, &payload)
        {
            debug!(key = %key, "serving from response cache");
            let record = OperationTelemetry {
                operation_id,
                session_id: request.session_id.clone(),
                operation_type: request.operation_type.clone(),
                provider: request.provider.clone(),
                model: request.model.clone(),
                tokens_in: 0,
                tokens_out: 0,
                retry_count: 0,
                latency_ms: started.elapsed().as_millis() as u64,
                success: true,
                cache_hit: true,
                estimated_cost: 0.0,
                started_at,
                completed_at: Utc::now(),
                error_kind: None,
            };
            self.telemetry.record(record.clone());
            return OperationResponse {
                operation_id,
                success: true,
                content: Some(payload),
                was_cached: true,
                attempts: 0,
                warnings,
                error: None,
                preset: Some(preset),
                telemetry: Some(record),
            };
        }

        let breaker = self.breakers.get_or_register(&request.provider);
        let mut usage = Usage::default();
        let mut attempt = Attempt::first(&request.prompt);

        let outcome: Result<String> = loop {
            let invocation = invocation_request(&request, &preset, &attempt.prompt);
            let output = match breaker
                .execute(|| invoke_with_limits(invoker, &invocation, &preset, cancel))
                .await
            {
                Ok(output) => output,
                Err(e) => break Err(e),
            };
            usage.add(&output);

            let Some(schema) = &request.output_schema else {
                break Ok(output.content);
            };
            let result = check(schema, &output.content);
            if result.is_valid {
                break Ok(extract_json(&output.content).to_string());
            }
            if !attempt.can_repair(preset.max_retries()) {
                debug!(
                    attempts = attempt.number,
                    earlier_errors = attempt.errors.len(),
                    "repair limit reached"
                );
                break Err(VordrError::ValidationFailure {
                    attempts: attempt.number,
                    errors: result.errors,
                });
            }

            warn!(
                attempt = attempt.number,
                max_retries = preset.max_retries(),
                errors = result.errors.len(),
                "structured output invalid, requesting repair"
            );
            metrics::counter!(telemetry::RETRIES_TOTAL,
                "provider" => request.provider.clone(),
                "operation" => request.operation_type.as_str().to_owned(),
            )
            .increment(1);
            attempt = attempt.repair(
                &request.prompt,
                &output.content,
                result.errors,
                &schema.definition(),
            );
        };

        // Rejected before any invocation reached the provider.
        if let Err(e @ VordrError::CircuitOpen { .. }) = &outcome
            && attempt.number == 1
        {
            record_rejection(&request.provider, e);
            return rejected(operation_id, Some(preset), warnings, e);
        }

        let cost = self.costs.cost(&request.model, usage.tokens_in, usage.tokens_out);
        let record = OperationTelemetry {
            operation_id,
            session_id: request.session_id.clone(),
            operation_type: request.operation_type.clone(),
            provider: request.provider.clone(),
            model: request.model.clone(),
            tokens_in: usage.tokens_in,
            tokens_out: usage.tokens_out,
            retry_count: attempt.retries(),
            latency_ms: started.elapsed().as_millis() as u64,
            success: outcome.is_ok(),
            cache_hit: false,
            estimated_cost: cost,
            started_at,
            completed_at: Utc::now(),
            error_kind: outcome.as_ref().err().map(VordrError::kind),
        };
        self.telemetry.record(record.clone());

        match outcome {
            Ok(content) => {
                self.budgets
                    .record_usage(&request.session_id, usage.total(), cost);
                if let Some(key) = cache_key {
                    self.cache.set_default(key, content.clone());
                }
                info!(
                    attempts = attempt.number,
                    tokens = usage.total(),
                    latency_ms = record.latency_ms,
                    "operation completed"
                );
                OperationResponse {
                    operation_id,
                    success: true,
                    content: Some(content),
                    was_cached: false,
                    attempts: attempt.number,
                    warnings,
                    error: None,
                    preset: Some(preset),
                    telemetry: Some(record),
                }
            }
            Err(e) => {
                warn!(error = %e, attempts = attempt.number, "operation failed");
                OperationResponse {
                    operation_id,
                    success: false,
                    content: None,
                    was_cached: false,
                    attempts: attempt.number,
                    warnings,
                    error: Some(OperationError::from(&e)),
                    preset: Some(preset),
                    telemetry: Some(record),
                }
            }
        }
    }

    /// Probe a provider outside the request path.
    ///
    /// Sends a minimal request (prompt `"ping"` to `model`, one output
    /// token) through `invoker`. On an open circuit a successful probe moves
    /// the breaker to half-open; see [`CircuitBreaker::health_check`](crate::CircuitBreaker::health_check).
    pub async fn health_check(
        &self,
        provider: &str,
        model: &str,
        invoker: &dyn ProviderInvoker,
    ) -> bool {
        let breaker = self.breakers.get_or_register(provider);
        let probe = InvocationRequest {
            prompt: HEALTH_PROBE_PROMPT.to_string(),
            system_prompt: None,
            parameters: InvocationParameters {
                model: model.to_string(),
                temperature: 0.0,
                top_p: 1.0,
                max_tokens: 1,
                extra: Default::default(),
            },
        };
        let cancel = CancellationToken::new();
        breaker
            .health_check(|| async {
                invoker.invoke(&probe, &cancel).await.map(|_| ())
            })
            .await
    }

    /// Start the periodic cache expiry sweep, if the cache config sets an
    /// interval. Must be called within a tokio runtime.
    pub fn spawn_cache_sweeper(&self, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let interval = self.cache.config().sweep_interval?;
        Some(spawn_expiry_sweeper(Arc::clone(&self.cache), interval, shutdown))
    }

    pub fn cache_statistics(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Remove every cache entry. Returns the number removed.
    pub fn clear_cache(&self) -> u64 {
        self.cache.clear()
    }

    pub fn evict_expired_cache_entries(&self) -> u64 {
        self.cache.evict_expired()
    }

    pub fn session_budget(&self, session_id: &str) -> Option<SessionBudget> {
        self.budgets.session_budget(session_id)
    }

    /// Forget a session's budget. Callers must do this when a unit of work
    /// ends; sessions are never expired automatically.
    pub fn clear_session(&self, session_id: &str) -> bool {
        self.budgets.clear_session(session_id)
    }

    pub fn telemetry_statistics(&self) -> TelemetryStatistics {
        self.telemetry.statistics()
    }

    pub fn session_telemetry_statistics(&self, session_id: &str) -> TelemetryStatistics {
        self.telemetry.session_statistics(session_id)
    }

    /// Per-provider breaker state, for health dashboards.
    pub fn circuit_states(&self) -> Vec<CircuitSnapshot> {
        self.breakers.snapshot()
    }

    pub fn presets(&self) -> &PresetRegistry {
        &self.presets
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn budgets(&self) -> &Arc<BudgetManager> {
        &self.budgets
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn telemetry(&self) -> &Arc<TelemetryCollector> {
        &self.telemetry
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.costs
    }

    /// Key `request` would be cached under, after preset resolution.
    ///
    /// Computed regardless of whether the resolved temperature is cacheable.
    pub fn cache_key_for(&self, request: &OperationRequest) -> Result<CacheKey> {
        let preset = self.resolve_preset(request)?;
        Ok(cache_key(request, &preset))
    }

    fn resolve_preset(&self, request: &OperationRequest) -> Result<OperationPreset> {
        let base = match &request.preset {
            Some(preset) => preset.for_operation(request.operation_type.clone()),
            None => self.presets.get(&request.operation_type),
        };
        base.apply(&request.overrides)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("presets", &self.presets.len())
            .field("cache", &self.cache)
            .field("breakers", &self.breakers.providers())
            .finish_non_exhaustive()
    }
}

/// Call the provider, bounded by the preset timeout and the caller's token.
async fn invoke_with_limits(
    invoker: &dyn ProviderInvoker,
    request: &InvocationRequest,
    preset: &OperationPreset,
    cancel: &CancellationToken,
) -> Result<ProviderOutput> {
    let timeout = preset.timeout();
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(VordrError::ProviderCancelled),
        result = tokio::time::timeout(timeout, invoker.invoke(request, cancel)) => {
            result.unwrap_or(Err(VordrError::ProviderTimeout(timeout)))
        }
    }
}

fn invocation_request(
    request: &OperationRequest,
    preset: &OperationPreset,
    prompt: &str,
) -> InvocationRequest {
    InvocationRequest {
        prompt: prompt.to_string(),
        system_prompt: request.system_prompt.clone(),
        parameters: InvocationParameters {
            model: request.model.clone(),
            temperature: preset.temperature(),
            top_p: preset.top_p(),
            max_tokens: preset.max_tokens(),
            extra: request.extra.clone(),
        },
    }
}

fn cache_key(request: &OperationRequest, preset: &OperationPreset) -> CacheKey {
    let mut input = KeyInput::new(
        &request.provider,
        &request.model,
        request.operation_type.as_str(),
        &request.prompt,
    )
    .system_prompt(request.system_prompt.as_deref())
    .temperature(preset.temperature())
    .max_tokens(preset.max_tokens())
    .param("top_p", preset.top_p().to_string());
    if let Some(schema) = &request.output_schema {
        input = input.param("output_schema", schema.definition());
    }
    for (name, value) in &request.extra {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        input = input.param(name, rendered);
    }
    input.key()
}

/// Whether a cached payload still satisfies the request's output check.
fn passes_check(request: &OperationRequest, check: OutputCheck, payload: &str) -> bool {
    request
        .output_schema
        .as_ref()
        .is_none_or(|schema| check(schema, payload).is_valid)
}

fn rejected(
    operation_id: Uuid,
    preset: Option<OperationPreset>,
    warnings: Vec<String>,
    error: &VordrError,
) -> OperationResponse {
    OperationResponse {
        operation_id,
        success: false,
        content: None,
        was_cached: false,
        attempts: 0,
        warnings,
        error: Some(OperationError::from(error)),
        preset,
        telemetry: None,
    }
}

fn record_rejection(provider: &str, error: &VordrError) {
    info!(provider, reason = error.kind().as_str(), "operation rejected");
    metrics::counter!(telemetry::REJECTIONS_TOTAL,
        "provider" => provider.to_owned(),
        "reason" => error.kind().as_str(),
    )
    .increment(1);
}
