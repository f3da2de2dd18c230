//! Per-provider circuit breaking.
//!
//! Each provider gets one [`CircuitBreaker`] guarding its calls:
//!
//! - **Closed**: calls pass through. Consecutive failures reaching
//!   `failure_threshold`, or a rolling-window failure rate above
//!   `failure_rate_threshold` (once `minimum_throughput` samples exist),
//!   opens the circuit.
//! - **Open**: calls fail fast with [`VordrError::CircuitOpen`] until
//!   `open_duration` has passed since the circuit opened.
//! - **HalfOpen**: exactly one trial call is admitted. Success closes the
//!   circuit and resets its counters; failure reopens it with a fresh timer.
//!
//! Time is read from `tokio::time::Instant`, so tests can drive the state
//! machine with a paused clock.

mod latency;
pub mod registry;
mod window;

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use latency::ProviderLatency;
pub use registry::CircuitBreakerRegistry;
use window::RollingWindow;

use crate::telemetry;
use crate::{Result, VordrError};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds and timings for a circuit breaker.
///
/// ```rust
/// # use vordr::CircuitBreakerConfig;
/// # use std::time::Duration;
/// let config = CircuitBreakerConfig::new()
///     .failure_threshold(3)
///     .open_duration(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit. Default: 5.
    pub failure_threshold: u32,
    /// Window failure rate (0–1) above which the circuit opens. Default: 0.5.
    pub failure_rate_threshold: f64,
    /// How long the circuit stays open before a trial. Default: 30s.
    pub open_duration: Duration,
    /// Upper bound on a single wrapped call. Default: 120s.
    pub timeout: Duration,
    /// Maximum samples in the rolling window. Default: 100.
    pub rolling_window_size: usize,
    /// Maximum sample age in the rolling window. Default: 5 minutes.
    pub rolling_window: Duration,
    /// Samples required before the failure-rate rule applies. Default: 10.
    pub minimum_throughput: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_rate_threshold: 0.5,
            open_duration: Duration::from_secs(30),
            timeout: Duration::from_secs(120),
            rolling_window_size: 100,
            rolling_window: Duration::from_secs(300),
            minimum_throughput: 10,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = rate;
        self
    }

    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rolling_window_size(mut self, n: usize) -> Self {
        self.rolling_window_size = n;
        self
    }

    pub fn rolling_window(mut self, age: Duration) -> Self {
        self.rolling_window = age;
        self
    }

    pub fn minimum_throughput(mut self, n: usize) -> Self {
        self.minimum_throughput = n;
        self
    }

    /// Reject settings the state machine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(VordrError::Configuration(
                "circuit_breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_rate_threshold) {
            return Err(VordrError::Configuration(format!(
                "circuit_breaker.failure_rate_threshold must be within [0, 1], got {}",
                self.failure_rate_threshold
            )));
        }
        if self.timeout.is_zero() {
            return Err(VordrError::Configuration(
                "circuit_breaker.timeout_seconds must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Point-in-time view of a breaker, for health dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub provider: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub window_samples: usize,
    pub window_failure_rate: f64,
    pub opened_at: Option<DateTime<Utc>>,
    /// Time until an open circuit admits a trial call.
    pub retry_after_ms: Option<u64>,
    pub average_latency_ms: Option<f64>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    window: RollingWindow,
    opened_at: Option<Instant>,
    opened_at_utc: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

/// Health state machine for one provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    latency: ProviderLatency,
}

impl CircuitBreaker {
    pub fn new(provider: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let window = RollingWindow::new(config.rolling_window_size, config.rolling_window);
        Self {
            provider: provider.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                window,
                opened_at: None,
                opened_at_utc: None,
                trial_in_flight: false,
            }),
            latency: ProviderLatency::default(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. An open circuit whose timer has run out reports
    /// `HalfOpen`.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn latency(&self) -> &ProviderLatency {
        &self.latency
    }

    /// Run `operation` through the breaker.
    ///
    /// Fails fast with [`VordrError::CircuitOpen`] without polling the
    /// operation when the circuit rejects the call. Otherwise the operation
    /// runs under the configured timeout, and any error it returns (or the
    /// timeout itself) counts as a failure.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.acquire()?;
        let started = Instant::now();
        let result = match tokio::time::timeout(self.config.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(VordrError::ProviderTimeout(self.config.timeout)),
        };
        match &result {
            Ok(_) => permit.succeed(started.elapsed()),
            Err(e) => {
                debug!(provider = %self.provider, error = %e, "breaker recorded failure");
                permit.fail();
            }
        }
        result
    }

    /// Probe the provider outside the normal request path.
    ///
    /// The probe bypasses the gate and the half-open trial slot. On an open
    /// circuit a successful probe moves it to `HalfOpen`; a failed probe
    /// leaves it open without restarting the timer. Closed and half-open
    /// circuits are not modified. Returns whether the probe succeeded.
    pub async fn health_check<F, Fut>(&self, probe: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let healthy = matches!(
            tokio::time::timeout(self.config.timeout, probe()).await,
            Ok(Ok(()))
        );
        let mut inner = self.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);
        if healthy && inner.state == CircuitState::Open {
            inner.trial_in_flight = false;
            self.transition(&mut inner, CircuitState::HalfOpen, now);
        }
        debug!(provider = %self.provider, healthy, state = %inner.state, "health probe finished");
        healthy
    }

    /// Force the breaker back to a fresh closed state.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let now = Instant::now();
        inner.consecutive_failures = 0;
        inner.window.clear();
        inner.trial_in_flight = false;
        if inner.state != CircuitState::Closed {
            self.transition(&mut inner, CircuitState::Closed, now);
        }
        self.latency.reset();
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let mut inner = self.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);
        inner.window.prune(now);
        let retry_after_ms = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened)) => Some(
                self.config
                    .open_duration
                    .saturating_sub(now.saturating_duration_since(opened))
                    .as_millis() as u64,
            ),
            _ => None,
        };
        CircuitSnapshot {
            provider: self.provider.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            window_samples: inner.window.len(),
            window_failure_rate: inner.window.failure_rate(),
            opened_at: inner.opened_at_utc,
            retry_after_ms,
            average_latency_ms: self.latency.average_ms(),
        }
    }

    fn acquire(&self) -> Result<Permit<'_>> {
        let mut inner = self.lock();
        let now = Instant::now();
        self.refresh(&mut inner, now);
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                debug!(provider = %self.provider, "admitting half-open trial call");
                Ok(Permit::new(self, true))
            }
            CircuitState::HalfOpen => Err(self.rejection(None)),
            CircuitState::Open => {
                let remaining = inner.opened_at.map(|opened| {
                    self.config
                        .open_duration
                        .saturating_sub(now.saturating_duration_since(opened))
                });
                Err(self.rejection(remaining))
            }
        }
    }

    fn rejection(&self, retry_after: Option<Duration>) -> VordrError {
        debug!(provider = %self.provider, ?retry_after, "circuit rejected call");
        VordrError::CircuitOpen {
            provider: self.provider.clone(),
            retry_after,
        }
    }

    fn record_success(&self, trial: bool, elapsed: Duration) {
        self.latency.record(elapsed);
        let mut inner = self.lock();
        let now = Instant::now();
        if trial {
            inner.trial_in_flight = false;
            inner.consecutive_failures = 0;
            inner.window.clear();
            self.transition(&mut inner, CircuitState::Closed, now);
            return;
        }
        if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
            inner.window.push(now, true);
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = self.lock();
        let now = Instant::now();
        if trial {
            inner.trial_in_flight = false;
            self.transition(&mut inner, CircuitState::Open, now);
            return;
        }
        if inner.state != CircuitState::Closed {
            return;
        }
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.window.push(now, false);

        let rate = inner.window.failure_rate();
        let by_count = inner.consecutive_failures >= self.config.failure_threshold;
        let by_rate = inner.window.len() >= self.config.minimum_throughput
            && rate > self.config.failure_rate_threshold;
        if by_count || by_rate {
            warn!(
                provider = %self.provider,
                consecutive_failures = inner.consecutive_failures,
                failure_rate = rate,
                "opening circuit"
            );
            self.transition(&mut inner, CircuitState::Open, now);
        }
    }

    /// Apply the time-based Open → HalfOpen transition.
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        if inner.state == CircuitState::Open
            && let Some(opened) = inner.opened_at
            && now.saturating_duration_since(opened) >= self.config.open_duration
        {
            inner.trial_in_flight = false;
            self.transition(inner, CircuitState::HalfOpen, now);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        let from = inner.state;
        inner.state = to;
        match to {
            CircuitState::Open => {
                inner.opened_at = Some(now);
                inner.opened_at_utc = Some(Utc::now());
            }
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.opened_at_utc = None;
            }
            CircuitState::HalfOpen => {}
        }
        if from == to {
            return;
        }
        info!(provider = %self.provider, %from, %to, "circuit state changed");
        metrics::counter!(telemetry::CIRCUIT_TRANSITIONS_TOTAL,
            "provider" => self.provider.clone(),
            "to" => to.as_str(),
        )
        .increment(1);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission ticket for one call.
///
/// A trial permit dropped without an outcome (the caller's future was
/// cancelled mid-flight) counts as a failed trial, so the half-open slot is
/// never leaked.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn succeed(mut self, elapsed: Duration) {
        self.settled = true;
        self.breaker.record_success(self.trial, elapsed);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.record_failure(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::new()
                .failure_threshold(threshold)
                .open_duration(Duration::from_secs(30)),
        )
    }

    async fn fail(b: &CircuitBreaker) -> Result<()> {
        b.execute(|| async { Err::<(), _>(VordrError::Provider("boom".into())) })
            .await
    }

    async fn succeed(b: &CircuitBreaker) -> Result<u32> {
        b.execute(|| async { Ok(7) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_consecutive_failures() {
        let b = breaker(3);
        for _ in 0..2 {
            let _ = fail(&b).await;
            assert_eq!(b.state(), CircuitState::Closed);
        }
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_count() {
        let b = breaker(3);
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        succeed(&b).await.unwrap();
        assert_eq!(b.consecutive_failures(), 0);
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn open_rejects_with_retry_after() {
        let b = breaker(1);
        let _ = fail(&b).await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let err = succeed(&b).await.unwrap_err();
        assert!(matches!(err, VordrError::CircuitOpen { .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(20)));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_rule_waits_for_minimum_throughput() {
        let b = CircuitBreaker::new(
            "rate",
            CircuitBreakerConfig::new()
                .failure_threshold(100)
                .failure_rate_threshold(0.5)
                .minimum_throughput(4),
        );
        succeed(&b).await.unwrap();
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        // 2/3 failed, but only three samples so far.
        assert_eq!(b.state(), CircuitState::Closed);
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let b = CircuitBreaker::new(
            "slow",
            CircuitBreakerConfig::new()
                .failure_threshold(1)
                .timeout(Duration::from_secs(1)),
        );
        let err = b
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VordrError::ProviderTimeout(_)));
        assert_eq!(b.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_trial_reopens_circuit() {
        let b = breaker(1);
        let _ = fail(&b).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(b.state(), CircuitState::HalfOpen);
        {
            let permit = b.acquire().unwrap();
            drop(permit);
        }
        assert_eq!(b.state(), CircuitState::Open);
    }
}
