//! End-to-end tests for the governed execution path.
//!
//! Providers are stubbed with `invoker_fn` closures that count their calls,
//! so each test can assert exactly how often the provider was reached.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use vordr::validation::{FieldKind, FieldRule, OutputSchema, StructuredOutput};
use vordr::{
    BudgetConfig, CacheConfig, CircuitBreakerConfig, CircuitState, CostModel, ErrorKind,
    OperationRequest, OperationType, Orchestrator, PresetOverrides, ProviderInvoker,
    ProviderOutput, TokenPricing, Vordr, VordrError, invoker_fn,
};

// ============================================================================
// Stub providers
// ============================================================================

/// Replies with `reply` and counts calls.
fn replying(calls: &Arc<AtomicU32>, reply: &'static str) -> impl ProviderInvoker + use<> {
    let calls = Arc::clone(calls);
    invoker_fn(move |_request, _cancel| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderOutput::new(reply, 10, 5))
        }
    })
}

/// Fails every call with a provider error and counts calls.
fn failing(calls: &Arc<AtomicU32>) -> impl ProviderInvoker + use<> {
    let calls = Arc::clone(calls);
    invoker_fn(move |_request, _cancel| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(VordrError::Provider("upstream unavailable".into()))
        }
    })
}

/// Replies with `replies[n]` on the n-th call, repeating the last reply.
fn scripted(
    calls: &Arc<AtomicU32>,
    replies: &'static [&'static str],
) -> impl ProviderInvoker + use<> {
    let calls = Arc::clone(calls);
    invoker_fn(move |_request, _cancel| {
        let calls = Arc::clone(&calls);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            let reply = replies[n.min(replies.len() - 1)];
            Ok(ProviderOutput::new(reply, 10, 5))
        }
    })
}

fn scene_request(session: &str) -> OperationRequest {
    OperationRequest::new(
        session,
        OperationType::SceneAnalysis,
        "OpenAI",
        "gpt-4",
        "describe scene 1",
    )
    .temperature(0.2)
}

fn creative_request(session: &str) -> OperationRequest {
    OperationRequest::new(
        session,
        OperationType::CreativeScripting,
        "OpenAI",
        "gpt-4",
        "write an opening monologue",
    )
}

fn title_schema() -> OutputSchema {
    OutputSchema::new("Scene")
        .field(FieldRule::required("title", FieldKind::String))
        .field(FieldRule::optional("mood", FieldKind::String))
}

fn default_orchestrator() -> Orchestrator {
    Vordr::builder().build().unwrap()
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn identical_deterministic_calls_hit_the_cache() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, "a quiet street at dawn");
    let cancel = CancellationToken::new();

    let first = vordr.execute(scene_request("s1"), &provider, &cancel).await;
    let second = vordr.execute(scene_request("s1"), &provider, &cancel).await;

    assert!(first.success);
    assert!(!first.was_cached);
    assert_eq!(first.attempts, 1);
    assert!(second.success);
    assert!(second.was_cached);
    assert_eq!(second.attempts, 0);
    assert_eq!(second.content(), Some("a quiet street at dawn"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let hit = second.telemetry.unwrap();
    assert!(hit.cache_hit);
    assert_eq!(hit.total_tokens(), 0);
    assert_eq!(hit.estimated_cost, 0.0);

    // Only the real call is charged.
    assert_eq!(vordr.session_budget("s1").unwrap().total_tokens_used, 15);
    assert_eq!(vordr.cache_statistics().hits, 1);
}

#[tokio::test]
async fn prompt_whitespace_and_case_share_a_cache_entry() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, "ok");
    let cancel = CancellationToken::new();

    let mut shouted = scene_request("s");
    shouted.prompt = "  DESCRIBE   scene 1 ".into();

    vordr.execute(scene_request("s"), &provider, &cancel).await;
    let second = vordr.execute(shouted, &provider, &cancel).await;

    assert!(second.was_cached);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn creative_operations_are_never_cached() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, "Once upon a time");
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let response = vordr.execute(creative_request("s"), &provider, &cancel).await;
        assert!(response.success);
        assert!(!response.was_cached);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let stats = vordr.cache_statistics();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.hits + stats.misses, 0, "cache must not be consulted");
}

#[tokio::test]
async fn disabled_cache_always_calls_provider() {
    let vordr = Vordr::builder()
        .cache_config(CacheConfig::disabled())
        .build()
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, "ok");
    let cancel = CancellationToken::new();

    vordr.execute(scene_request("s"), &provider, &cancel).await;
    vordr.execute(scene_request("s"), &provider, &cancel).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Budgets
// ============================================================================

#[tokio::test]
async fn hard_limit_rejects_before_calling_provider() {
    // Summarization allows 1000 output tokens: worst case 0.10 at 0.1 / 1K.
    let vordr = Vordr::builder()
        .budget_config(BudgetConfig::new().max_cost_per_session(1.00))
        .cost_model(CostModel::new(TokenPricing::new(0.0, 0.1)))
        .build()
        .unwrap();
    vordr.budgets().record_usage("s2", 0, 0.95);

    let check = vordr.budgets().check_budget("s2", 1_000, 0.10);
    assert!(!check.is_within_budget);

    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, "never");
    let request = OperationRequest::new(
        "s2",
        OperationType::Summarization,
        "openai",
        "gpt-4",
        "summarize",
    );
    let response = vordr
        .execute(request, &provider, &CancellationToken::new())
        .await;

    assert!(!response.success);
    assert_eq!(response.error_kind(), Some(ErrorKind::BudgetExceeded));
    assert_eq!(response.attempts, 0);
    assert!(response.telemetry.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(vordr.telemetry().is_empty());

    let budget = vordr.session_budget("s2").unwrap();
    assert_eq!(budget.operation_count, 1);
    assert!((budget.total_cost_accrued - 0.95).abs() < 1e-9);
}

#[tokio::test]
async fn soft_limit_proceeds_with_warnings() {
    let vordr = Vordr::builder()
        .budget_config(
            BudgetConfig::new()
                .max_tokens_per_session(10)
                .enforce_hard_limits(false),
        )
        .build()
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, "ok");

    let response = vordr
        .execute(creative_request("s"), &provider, &CancellationToken::new())
        .await;

    assert!(response.success);
    assert!(!response.warnings.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(vordr.session_budget("s").unwrap().total_tokens_used, 15);
}

#[tokio::test]
async fn usage_is_charged_with_actual_figures() {
    let vordr = Vordr::builder()
        .cost_model(CostModel::new(TokenPricing::new(1.0, 2.0)))
        .build()
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, "ok");
    let cancel = CancellationToken::new();

    vordr.execute(creative_request("s"), &provider, &cancel).await;
    vordr.execute(creative_request("s"), &provider, &cancel).await;

    let budget = vordr.session_budget("s").unwrap();
    assert_eq!(budget.total_tokens_used, 30);
    assert_eq!(budget.operation_count, 2);
    // 10 in at 1.0/1K plus 5 out at 2.0/1K, twice.
    assert!((budget.total_cost_accrued - 0.04).abs() < 1e-9);
}

// ============================================================================
// Circuit breaking
// ============================================================================

#[tokio::test]
async fn consecutive_failures_open_the_circuit() {
    let vordr = Vordr::builder()
        .breaker_config(CircuitBreakerConfig::new().failure_threshold(3))
        .build()
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = failing(&calls);
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        let response = vordr.execute(creative_request("s"), &provider, &cancel).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::ProviderError));
        assert!(response.telemetry.is_some());
    }
    assert_eq!(
        vordr.breakers().state("OpenAI"),
        Some(CircuitState::Open)
    );

    let rejected = vordr.execute(creative_request("s"), &provider, &cancel).await;
    assert_eq!(rejected.error_kind(), Some(ErrorKind::CircuitOpen));
    assert!(rejected.error.as_ref().unwrap().retry_after_ms.is_some());
    assert!(rejected.telemetry.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(vordr.telemetry().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn circuit_recovers_after_open_duration() {
    let vordr = Vordr::builder()
        .breaker_config(
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .open_duration(Duration::from_secs(10)),
        )
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    let failures = Arc::new(AtomicU32::new(0));
    vordr
        .execute(creative_request("s"), &failing(&failures), &cancel)
        .await;
    assert_eq!(vordr.breakers().state("OpenAI"), Some(CircuitState::Open));

    tokio::time::advance(Duration::from_secs(11)).await;
    assert_eq!(
        vordr.breakers().state("OpenAI"),
        Some(CircuitState::HalfOpen)
    );

    let calls = Arc::new(AtomicU32::new(0));
    let response = vordr
        .execute(creative_request("s"), &replying(&calls, "back"), &cancel)
        .await;
    assert!(response.success);
    assert_eq!(vordr.breakers().state("OpenAI"), Some(CircuitState::Closed));
    assert_eq!(
        vordr.breakers().get("OpenAI").unwrap().consecutive_failures(),
        0
    );
}

#[tokio::test]
async fn health_check_half_opens_an_open_circuit() {
    let vordr = Vordr::builder()
        .breaker_config(CircuitBreakerConfig::new().failure_threshold(1))
        .build()
        .unwrap();
    let failures = Arc::new(AtomicU32::new(0));
    vordr
        .execute(
            creative_request("s"),
            &failing(&failures),
            &CancellationToken::new(),
        )
        .await;

    assert!(!vordr.health_check("OpenAI", "gpt-4", &failing(&failures)).await);
    assert_eq!(vordr.breakers().state("OpenAI"), Some(CircuitState::Open));

    let probes = Arc::new(AtomicU32::new(0));
    assert!(vordr.health_check("OpenAI", "gpt-4", &replying(&probes, "pong")).await);
    assert_eq!(
        vordr.breakers().state("OpenAI"),
        Some(CircuitState::HalfOpen)
    );
}

#[tokio::test]
async fn health_check_targets_the_given_model() {
    let vordr = default_orchestrator();
    let models = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&models);
    let provider = invoker_fn(move |request, _cancel| {
        let seen = Arc::clone(&seen);
        async move {
            seen.lock().unwrap().push(request.parameters.model.clone());
            Ok(ProviderOutput::new("pong", 1, 1))
        }
    });

    assert!(vordr.health_check("OpenAI", "gpt-4o-mini", &provider).await);
    assert_eq!(*models.lock().unwrap(), vec!["gpt-4o-mini".to_string()]);
}

#[tokio::test]
async fn breakers_are_per_provider() {
    let vordr = Vordr::builder()
        .breaker_config(CircuitBreakerConfig::new().failure_threshold(1))
        .build()
        .unwrap();
    let cancel = CancellationToken::new();
    let failures = Arc::new(AtomicU32::new(0));
    vordr
        .execute(creative_request("s"), &failing(&failures), &cancel)
        .await;

    let calls = Arc::new(AtomicU32::new(0));
    let mut other = creative_request("s");
    other.provider = "anthropic".into();
    let response = vordr
        .execute(other, &replying(&calls, "fine"), &cancel)
        .await;

    assert!(response.success);
    let states: Vec<_> = vordr
        .circuit_states()
        .into_iter()
        .map(|s| (s.provider, s.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("OpenAI".to_string(), CircuitState::Open),
            ("anthropic".to_string(), CircuitState::Closed),
        ]
    );
}

// ============================================================================
// Structured output
// ============================================================================

#[tokio::test]
async fn invalid_output_is_repaired_once_then_fails() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, r#"{"mood": "calm"}"#);

    let request = scene_request("s")
        .output_schema(title_schema())
        .max_retries(1);
    let response = vordr
        .execute(request, &provider, &CancellationToken::new())
        .await;

    assert!(!response.success);
    assert_eq!(response.error_kind(), Some(ErrorKind::ValidationFailure));
    assert_eq!(response.attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let error = response.error.unwrap();
    assert_eq!(error.validation_errors.len(), 1);
    assert_eq!(error.validation_errors[0].path, "$.title");

    let record = response.telemetry.unwrap();
    assert!(!record.success);
    assert_eq!(record.retry_count, 1);
    assert_eq!(record.tokens_in, 20);

    // Terminal failures are neither cached nor charged.
    assert_eq!(vordr.cache_statistics().entries, 0);
    assert_eq!(vordr.session_budget("s").unwrap().total_tokens_used, 0);
}

#[tokio::test]
async fn repair_prompt_carries_the_failure() {
    let vordr = default_orchestrator();
    let prompts = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&prompts);
    let provider = invoker_fn(move |request, _cancel| {
        let seen = Arc::clone(&seen);
        async move {
            let mut prompts = seen.lock().unwrap();
            prompts.push(request.prompt.clone());
            let reply = if prompts.len() == 1 {
                "Sure! {\"mood\": \"tense\"}"
            } else {
                "```json\n{\"title\": \"Night Rain\", \"mood\": \"tense\"}\n```"
            };
            Ok(ProviderOutput::new(reply, 10, 5))
        }
    });

    let request = scene_request("s").output_schema(title_schema());
    let response = vordr
        .execute(request, &provider, &CancellationToken::new())
        .await;

    assert!(response.success);
    assert_eq!(response.attempts, 2);
    assert_eq!(
        response.content(),
        Some("{\"title\": \"Night Rain\", \"mood\": \"tense\"}")
    );

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts[0], "describe scene 1");
    assert!(prompts[1].contains("describe scene 1"));
    assert!(prompts[1].contains("{\"mood\": \"tense\"}"));
    assert!(prompts[1].contains("$.title"));
    assert!(prompts[1].contains("\"title\""));
}

#[derive(Debug, Deserialize, PartialEq)]
struct SceneSummary {
    title: String,
    shot_count: u32,
}

impl StructuredOutput for SceneSummary {
    fn schema() -> OutputSchema {
        OutputSchema::new("SceneSummary")
            .field(FieldRule::required("title", FieldKind::String))
            .field(FieldRule::required("shot_count", FieldKind::Integer).minimum(0.0))
    }
}

#[tokio::test]
async fn execute_structured_returns_typed_value() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, r#"{"title": "Dawn", "shot_count": 4}"#);

    let (response, value) = vordr
        .execute_structured::<SceneSummary>(
            scene_request("s"),
            &provider,
            &CancellationToken::new(),
        )
        .await;

    assert!(response.success);
    assert_eq!(
        value,
        Some(SceneSummary {
            title: "Dawn".into(),
            shot_count: 4
        })
    );
}

#[derive(Debug, Deserialize, PartialEq)]
struct ShotCount {
    title: String,
    count: u8,
}

impl StructuredOutput for ShotCount {
    fn schema() -> OutputSchema {
        OutputSchema::new("ShotCount")
            .field(FieldRule::required("title", FieldKind::String))
            .field(FieldRule::required("count", FieldKind::Integer))
    }
}

#[tokio::test]
async fn type_rejection_is_repaired() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = scripted(
        &calls,
        &[r#"{"title": "x", "count": 999}"#, r#"{"title": "x", "count": 9}"#],
    );

    let (response, value) = vordr
        .execute_structured::<ShotCount>(
            scene_request("s"),
            &provider,
            &CancellationToken::new(),
        )
        .await;

    assert!(response.success);
    assert_eq!(response.attempts, 2);
    assert_eq!(
        value,
        Some(ShotCount {
            title: "x".into(),
            count: 9
        })
    );
    assert_eq!(vordr.session_budget("s").unwrap().total_tokens_used, 30);
}

#[tokio::test]
async fn type_rejection_has_no_side_effects() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, r#"{"title": "x", "count": 999}"#);
    let cancel = CancellationToken::new();

    let (response, value) = vordr
        .execute_structured::<ShotCount>(scene_request("s"), &provider, &cancel)
        .await;

    assert!(!response.success);
    assert!(value.is_none());
    assert_eq!(response.error_kind(), Some(ErrorKind::ValidationFailure));
    // Scene analysis allows two repairs.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(!response.telemetry.unwrap().success);
    assert_eq!(vordr.cache_statistics().entries, 0);
    assert_eq!(vordr.session_budget("s").unwrap().total_tokens_used, 0);

    let (again, _) = vordr
        .execute_structured::<ShotCount>(scene_request("s"), &provider, &cancel)
        .await;
    assert!(!again.was_cached);
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn cached_output_must_satisfy_the_requested_type() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = scripted(
        &calls,
        &[r#"{"title": "x", "count": 999}"#, r#"{"title": "x", "count": 9}"#],
    );
    let cancel = CancellationToken::new();

    // Schema-only validation accepts and caches the document.
    let plain = vordr
        .execute(
            scene_request("s").output_schema(ShotCount::schema()),
            &provider,
            &cancel,
        )
        .await;
    assert!(plain.success);
    assert_eq!(vordr.cache_statistics().entries, 1);

    let (response, value) = vordr
        .execute_structured::<ShotCount>(scene_request("s"), &provider, &cancel)
        .await;
    assert!(response.success);
    assert!(!response.was_cached);
    assert_eq!(value.map(|v| v.count), Some(9));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn same_named_schemas_do_not_share_cache_entries() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, r#"{"title": "Dawn", "mood": "calm"}"#);
    let cancel = CancellationToken::new();

    let older = OutputSchema::new("Scene").field(FieldRule::required("title", FieldKind::String));
    let newer = OutputSchema::new("Scene").field(FieldRule::required("mood", FieldKind::String));
    let first = scene_request("s").output_schema(older);
    let second = scene_request("s").output_schema(newer);
    assert_ne!(
        vordr.cache_key_for(&first).unwrap(),
        vordr.cache_key_for(&second).unwrap()
    );

    let a = vordr.execute(first.clone(), &provider, &cancel).await;
    let b = vordr.execute(second.clone(), &provider, &cancel).await;
    assert!(a.success && b.success);
    assert!(!a.was_cached);
    assert!(!b.was_cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Each schema still hits its own entry.
    assert!(vordr.execute(first, &provider, &cancel).await.was_cached);
    assert!(vordr.execute(second, &provider, &cancel).await.was_cached);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Timeouts, cancellation, invalid requests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn timeout_records_failure_without_side_effects() {
    let vordr = default_orchestrator();
    let provider = invoker_fn(|_request, _cancel| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(ProviderOutput::new("too late", 10, 5))
    });

    let request = scene_request("s").overrides(
        PresetOverrides::new()
            .temperature(0.0)
            .timeout_seconds(1),
    );
    let response = vordr
        .execute(request, &provider, &CancellationToken::new())
        .await;

    assert!(!response.success);
    assert_eq!(response.error_kind(), Some(ErrorKind::ProviderTimeout));

    let record = response.telemetry.unwrap();
    assert!(!record.success);
    assert_eq!(record.error_kind, Some(ErrorKind::ProviderTimeout));
    assert_eq!(vordr.telemetry().len(), 1);

    assert_eq!(vordr.cache_statistics().entries, 0);
    let budget = vordr.session_budget("s").unwrap();
    assert_eq!(budget.operation_count, 0);
    assert_eq!(budget.total_tokens_used, 0);
    assert_eq!(
        vordr.breakers().get("OpenAI").unwrap().consecutive_failures(),
        1
    );
}

#[tokio::test]
async fn cancelled_operation_reports_cancellation() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, "ok");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let response = vordr.execute(scene_request("s"), &provider, &cancel).await;

    assert_eq!(response.error_kind(), Some(ErrorKind::ProviderCancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(vordr.cache_statistics().entries, 0);
}

#[tokio::test]
async fn invalid_override_is_rejected() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, "ok");

    let response = vordr
        .execute(
            scene_request("s").temperature(5.0),
            &provider,
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(response.error_kind(), Some(ErrorKind::InvalidRequest));
    assert!(response.preset.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Telemetry and concurrency
// ============================================================================

#[tokio::test]
async fn session_statistics_cover_only_that_session() {
    let vordr = default_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    let provider = replying(&calls, "ok");
    let cancel = CancellationToken::new();

    vordr.execute(scene_request("a"), &provider, &cancel).await;
    vordr.execute(scene_request("a"), &provider, &cancel).await;
    vordr.execute(creative_request("b"), &provider, &cancel).await;

    let a = vordr.session_telemetry_statistics("a");
    assert_eq!(a.total_operations, 2);
    assert_eq!(a.cache_hits, 1);
    assert!((a.cache_hit_rate - 0.5).abs() < 1e-9);

    let all = vordr.telemetry_statistics();
    assert_eq!(all.total_operations, 3);
    assert_eq!(all.successful_operations, 3);
    assert_eq!(all.by_provider["OpenAI"].operations, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sessions_are_tracked_independently() {
    let vordr = Arc::new(default_orchestrator());
    let calls = Arc::new(AtomicU32::new(0));
    let provider = Arc::new(replying(&calls, "ok"));

    let mut handles = Vec::new();
    for i in 0..8 {
        let vordr = Arc::clone(&vordr);
        let provider = Arc::clone(&provider);
        handles.push(tokio::spawn(async move {
            let session = format!("session-{i}");
            for _ in 0..5 {
                let response = vordr
                    .execute(
                        creative_request(&session),
                        &*provider,
                        &CancellationToken::new(),
                    )
                    .await;
                assert!(response.success);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 40);
    for i in 0..8 {
        let budget = vordr.session_budget(&format!("session-{i}")).unwrap();
        assert_eq!(budget.operation_count, 5);
        assert_eq!(budget.total_tokens_used, 75);
    }
    assert_eq!(vordr.telemetry().len(), 40);
}
