//! Per-session token and cost budgets.
//!
//! [`BudgetManager`] tracks running totals per session id and compares them
//! (plus an estimate for the next operation) against optional ceilings.
//! Whether an over-budget check blocks execution is the orchestrator's
//! decision, driven by [`BudgetConfig::enforce_hard_limits`].
//!
//! Sessions are created lazily on first check or record and live until
//! [`BudgetManager::clear_session`] is called.

pub mod pricing;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

pub use pricing::{CostModel, TokenPricing, estimate_tokens};

/// Budget ceilings. Unset ceilings are unlimited.
///
/// ```rust
/// # use vordr::BudgetConfig;
/// let config = BudgetConfig::new()
///     .max_cost_per_session(1.00)
///     .max_tokens_per_operation(4_000)
///     .enforce_hard_limits(true);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetConfig {
    pub max_tokens_per_operation: Option<u64>,
    pub max_cost_per_operation: Option<f64>,
    pub max_tokens_per_session: Option<u64>,
    pub max_cost_per_session: Option<f64>,
    /// Refuse over-budget operations (hard) or proceed with warnings (soft).
    /// Default: true.
    pub enforce_hard_limits: bool,
    /// Fraction of a session ceiling at which an approach warning is
    /// raised. Default: 0.8.
    pub warning_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_operation: None,
            max_cost_per_operation: None,
            max_tokens_per_session: None,
            max_cost_per_session: None,
            enforce_hard_limits: true,
            warning_threshold: 0.8,
        }
    }
}

impl BudgetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// No ceilings at all.
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn max_tokens_per_operation(mut self, tokens: u64) -> Self {
        self.max_tokens_per_operation = Some(tokens);
        self
    }

    pub fn max_cost_per_operation(mut self, cost: f64) -> Self {
        self.max_cost_per_operation = Some(cost);
        self
    }

    pub fn max_tokens_per_session(mut self, tokens: u64) -> Self {
        self.max_tokens_per_session = Some(tokens);
        self
    }

    pub fn max_cost_per_session(mut self, cost: f64) -> Self {
        self.max_cost_per_session = Some(cost);
        self
    }

    pub fn enforce_hard_limits(mut self, hard: bool) -> Self {
        self.enforce_hard_limits = hard;
        self
    }

    pub fn warning_threshold(mut self, fraction: f64) -> Self {
        self.warning_threshold = fraction;
        self
    }
}

/// Outcome of [`BudgetManager::check_budget`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BudgetCheck {
    pub is_within_budget: bool,
    /// Ceilings the projected usage would break. Empty when within budget.
    pub violations: Vec<String>,
    /// Human-readable notices: every violation, plus approach warnings for
    /// session ceilings nearing their limit.
    pub warnings: Vec<String>,
}

/// Read-only snapshot of one session's usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionBudget {
    pub session_id: String,
    pub total_tokens_used: u64,
    pub total_cost_accrued: f64,
    pub operation_count: u64,
    pub started_at: DateTime<Utc>,
}

impl SessionBudget {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            total_tokens_used: 0,
            total_cost_accrued: 0.0,
            operation_count: 0,
            started_at: Utc::now(),
        }
    }
}

/// Concurrent per-session budget tracker.
///
/// Sessions live in a sharded map, so unrelated sessions never contend on
/// one lock; updates to a single session are applied under its shard lock.
#[derive(Debug)]
pub struct BudgetManager {
    sessions: DashMap<String, SessionBudget>,
    config: BudgetConfig,
}

impl BudgetManager {
    pub fn new(config: BudgetConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Compare the session's totals plus an estimate against every ceiling.
    ///
    /// Projected usage exactly at a ceiling is within budget. Creates the
    /// session with zero usage if it is not yet tracked.
    pub fn check_budget(
        &self,
        session_id: &str,
        estimated_tokens: u64,
        estimated_cost: f64,
    ) -> BudgetCheck {
        let (used_tokens, used_cost) = {
            let session = self
                .sessions
                .entry(session_id.to_string())
                .or_insert_with(|| SessionBudget::new(session_id));
            (session.total_tokens_used, session.total_cost_accrued)
        };

        let mut violations = Vec::new();
        let mut approaching = Vec::new();

        if let Some(limit) = self.config.max_tokens_per_operation
            && estimated_tokens > limit
        {
            violations.push(format!(
                "estimated {estimated_tokens} tokens exceeds per-operation limit of {limit}"
            ));
        }
        if let Some(limit) = self.config.max_cost_per_operation
            && estimated_cost > limit
        {
            violations.push(format!(
                "estimated cost {estimated_cost:.4} exceeds per-operation limit of {limit:.4}"
            ));
        }
        if let Some(limit) = self.config.max_tokens_per_session {
            let projected = used_tokens.saturating_add(estimated_tokens);
            if projected > limit {
                violations.push(format!(
                    "session tokens would reach {projected}, exceeding limit of {limit}"
                ));
            } else if projected as f64 >= limit as f64 * self.config.warning_threshold {
                approaching.push(format!(
                    "session tokens at {projected} of {limit} ({:.0}%)",
                    ratio(projected as f64, limit as f64) * 100.0
                ));
            }
        }
        if let Some(limit) = self.config.max_cost_per_session {
            let projected = used_cost + estimated_cost;
            if projected > limit {
                violations.push(format!(
                    "session cost would reach {projected:.4}, exceeding limit of {limit:.4}"
                ));
            } else if projected >= limit * self.config.warning_threshold {
                approaching.push(format!(
                    "session cost at {projected:.4} of {limit:.4} ({:.0}%)",
                    ratio(projected, limit) * 100.0
                ));
            }
        }

        if !violations.is_empty() {
            warn!(
                session_id,
                estimated_tokens,
                estimated_cost,
                violations = violations.len(),
                "budget check failed"
            );
        }

        let mut warnings = violations.clone();
        warnings.extend(approaching);
        BudgetCheck {
            is_within_budget: violations.is_empty(),
            violations,
            warnings,
        }
    }

    /// Add actual usage from a completed operation.
    ///
    /// Negative or non-finite costs are recorded as zero so totals never
    /// decrease.
    pub fn record_usage(&self, session_id: &str, actual_tokens: u64, actual_cost: f64) {
        let cost = if actual_cost.is_finite() {
            actual_cost.max(0.0)
        } else {
            0.0
        };
        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionBudget::new(session_id));
        session.total_tokens_used = session.total_tokens_used.saturating_add(actual_tokens);
        session.total_cost_accrued += cost;
        session.operation_count += 1;
        debug!(
            session_id,
            tokens = actual_tokens,
            cost,
            total_tokens = session.total_tokens_used,
            "recorded session usage"
        );
    }

    /// Snapshot of a tracked session.
    pub fn session_budget(&self, session_id: &str) -> Option<SessionBudget> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    /// Stop tracking a session. Returns whether it existed.
    pub fn clear_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Ids of every tracked session, sorted.
    pub fn active_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl Default for BudgetManager {
    fn default() -> Self {
        Self::new(BudgetConfig::default())
    }
}

fn ratio(value: f64, limit: f64) -> f64 {
    if limit > 0.0 { value / limit } else { 1.0 }
}
