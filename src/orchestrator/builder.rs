//! Builder for configuring orchestrator instances

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::Orchestrator;
use crate::breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::budget::{BudgetConfig, BudgetManager, CostModel};
use crate::cache::{CacheConfig, ResponseCache};
use crate::config::Config;
use crate::presets::{MAX_TEMPERATURE, OperationPreset, OperationType, PresetOverrides, PresetRegistry};
use crate::telemetry::TelemetryCollector;
use crate::telemetry::collector::DEFAULT_MAX_RECORDS;
use crate::{Result, VordrError};

/// Main entry point for creating orchestrator instances.
pub struct Vordr;

impl Vordr {
    /// Create a new builder for configuring the orchestrator.
    pub fn builder() -> VordrBuilder {
        VordrBuilder::new()
    }
}

/// Builder for configuring orchestrator instances.
///
/// ```rust
/// # use vordr::{BudgetConfig, CircuitBreakerConfig, Vordr};
/// # use std::time::Duration;
/// let orchestrator = Vordr::builder()
///     .budget_config(BudgetConfig::new().max_cost_per_session(1.0))
///     .breaker_config(CircuitBreakerConfig::new().failure_threshold(3))
///     .provider_breaker(
///         "anthropic",
///         CircuitBreakerConfig::new().open_duration(Duration::from_secs(60)),
///     )
///     .build()
///     .unwrap();
/// assert!(orchestrator.circuit_states().iter().any(|s| s.provider == "anthropic"));
/// ```
pub struct VordrBuilder {
    presets: PresetRegistry,
    preset_overrides: BTreeMap<OperationType, PresetOverrides>,
    cache_config: CacheConfig,
    budget_config: BudgetConfig,
    breaker_config: CircuitBreakerConfig,
    provider_breakers: Vec<(String, CircuitBreakerConfig)>,
    cost_model: CostModel,
    telemetry_max_records: Option<usize>,
    shared_cache: Option<Arc<ResponseCache>>,
    shared_budgets: Option<Arc<BudgetManager>>,
    shared_telemetry: Option<Arc<TelemetryCollector>>,
}

impl VordrBuilder {
    pub fn new() -> Self {
        Self {
            presets: PresetRegistry::with_defaults(),
            preset_overrides: BTreeMap::new(),
            cache_config: CacheConfig::default(),
            budget_config: BudgetConfig::default(),
            breaker_config: CircuitBreakerConfig::default(),
            provider_breakers: Vec::new(),
            cost_model: CostModel::default(),
            telemetry_max_records: Some(DEFAULT_MAX_RECORDS),
            shared_cache: None,
            shared_budgets: None,
            shared_telemetry: None,
        }
    }

    /// Seed the builder from a loaded configuration file.
    ///
    /// Builder calls made afterwards still take precedence.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new()
            .presets(config.preset_registry()?)
            .cache_config(CacheConfig::from(&config.cache))
            .budget_config(BudgetConfig::from(&config.budget))
            .breaker_config(CircuitBreakerConfig::from(&config.circuit_breaker))
            .cost_model(config.pricing.clone())
            .telemetry_max_records(config.telemetry.retention()))
    }

    /// Replace the preset registry (default: built-in presets).
    pub fn presets(mut self, registry: PresetRegistry) -> Self {
        self.presets = registry;
        self
    }

    /// Register or replace a single preset.
    pub fn preset(mut self, preset: OperationPreset) -> Self {
        self.presets.insert(preset);
        self
    }

    /// Merge overrides over the preset for `operation` at build time.
    pub fn preset_override(
        mut self,
        operation: impl Into<OperationType>,
        overrides: PresetOverrides,
    ) -> Self {
        self.preset_overrides.insert(operation.into(), overrides);
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    pub fn budget_config(mut self, config: BudgetConfig) -> Self {
        self.budget_config = config;
        self
    }

    /// Settings for providers without an explicit breaker configuration.
    pub fn breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    /// Per-provider breaker settings.
    pub fn provider_breaker(
        mut self,
        provider: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Self {
        self.provider_breakers.push((provider.into(), config));
        self
    }

    pub fn cost_model(mut self, model: CostModel) -> Self {
        self.cost_model = model;
        self
    }

    /// Telemetry records kept in memory; `None` keeps everything.
    pub fn telemetry_max_records(mut self, max_records: Option<usize>) -> Self {
        self.telemetry_max_records = max_records;
        self
    }

    /// Share an existing cache instead of creating one from `cache_config`.
    pub fn shared_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.shared_cache = Some(cache);
        self
    }

    /// Share an existing budget manager instead of creating one from
    /// `budget_config`.
    pub fn shared_budgets(mut self, budgets: Arc<BudgetManager>) -> Self {
        self.shared_budgets = Some(budgets);
        self
    }

    pub fn shared_telemetry(mut self, telemetry: Arc<TelemetryCollector>) -> Self {
        self.shared_telemetry = Some(telemetry);
        self
    }

    /// Build the orchestrator.
    pub fn build(self) -> Result<Orchestrator> {
        self.validate()?;

        let mut presets = self.presets;
        for (operation, overrides) in &self.preset_overrides {
            let merged = presets.get(operation).apply(overrides)?;
            presets.insert(merged);
        }

        let breakers = CircuitBreakerRegistry::new(self.breaker_config);
        for (provider, config) in self.provider_breakers {
            breakers.register(provider, config);
        }

        let cache = self
            .shared_cache
            .unwrap_or_else(|| Arc::new(ResponseCache::new(&self.cache_config)));
        let budgets = self
            .shared_budgets
            .unwrap_or_else(|| Arc::new(BudgetManager::new(self.budget_config)));
        let telemetry = self.shared_telemetry.unwrap_or_else(|| {
            Arc::new(TelemetryCollector::with_max_records(self.telemetry_max_records))
        });

        info!(
            presets = presets.len(),
            cache_enabled = cache.config().enabled,
            hard_limits = budgets.config().enforce_hard_limits,
            "orchestrator ready"
        );

        Ok(Orchestrator::from_parts(
            Arc::new(presets),
            cache,
            budgets,
            Arc::new(breakers),
            telemetry,
            self.cost_model,
        ))
    }

    fn validate(&self) -> Result<()> {
        self.breaker_config.validate()?;
        for (_, config) in &self.provider_breakers {
            config.validate()?;
        }
        if let Some(model) = self.cost_model.first_invalid() {
            return Err(VordrError::Configuration(format!(
                "pricing for '{model}' must be non-negative"
            )));
        }
        let threshold = self.cache_config.deterministic_temperature_threshold;
        if !(0.0..=MAX_TEMPERATURE).contains(&threshold) {
            return Err(VordrError::Configuration(format!(
                "cache threshold must be within [0, {MAX_TEMPERATURE}], got {threshold}"
            )));
        }
        let warning = self.budget_config.warning_threshold;
        if !(warning > 0.0 && warning <= 1.0) {
            return Err(VordrError::Configuration(format!(
                "budget warning threshold must be within (0, 1], got {warning}"
            )));
        }
        Ok(())
    }
}

impl Default for VordrBuilder {
    fn default() -> Self {
        Self::new()
    }
}
