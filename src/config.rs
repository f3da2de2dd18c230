//! File configuration.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. an explicit path (e.g. `vordr check --config <path>`)
//! 2. `~/.vordr/config.toml` (user)
//! 3. `/etc/vordr/config.toml` (system)
//!
//! Every section is optional; omitted keys take the same defaults as the
//! programmatic builders.
//!
//! ```toml
//! [cache]
//! max_entries = 5000
//! deterministic_temperature_threshold = 0.3
//!
//! [budget]
//! max_cost_per_session = 1.00
//! enforce_hard_limits = true
//!
//! [circuit_breaker]
//! failure_threshold = 3
//!
//! [presets.scene_analysis]
//! max_retries = 3
//!
//! [pricing.default]
//! input_per_1k = 0.5
//! output_per_1k = 1.5
//!
//! [pricing.models."gpt-4"]
//! input_per_1k = 30.0
//! output_per_1k = 60.0
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::breaker::CircuitBreakerConfig;
use crate::budget::{BudgetConfig, CostModel};
use crate::cache::CacheConfig;
use crate::presets::{MAX_TEMPERATURE, OperationType, PresetOverrides, PresetRegistry};
use crate::telemetry::collector::DEFAULT_MAX_RECORDS;
use crate::{Result, VordrError};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub budget: BudgetSection,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSection,
    /// Per-operation overrides merged over the built-in presets.
    #[serde(default)]
    pub presets: BTreeMap<OperationType, PresetOverrides>,
    #[serde(default)]
    pub pricing: CostModel,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheSection {
    pub enabled: bool,
    pub max_entries: u64,
    pub default_ttl_seconds: u64,
    pub deterministic_temperature_threshold: f32,
    /// Seconds between expiry sweeps; 0 disables the sweeper.
    pub sweep_interval_seconds: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            enabled: defaults.enabled,
            max_entries: defaults.max_entries,
            default_ttl_seconds: defaults.default_ttl.as_secs(),
            deterministic_temperature_threshold: defaults.deterministic_temperature_threshold,
            sweep_interval_seconds: defaults.sweep_interval.map_or(0, |d| d.as_secs()),
        }
    }
}

impl From<&CacheSection> for CacheConfig {
    fn from(section: &CacheSection) -> Self {
        CacheConfig::new()
            .enabled(section.enabled)
            .max_entries(section.max_entries)
            .default_ttl(Duration::from_secs(section.default_ttl_seconds))
            .deterministic_temperature_threshold(section.deterministic_temperature_threshold)
            .sweep_interval(
                (section.sweep_interval_seconds > 0)
                    .then(|| Duration::from_secs(section.sweep_interval_seconds)),
            )
    }
}

/// `[budget]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BudgetSection {
    pub max_tokens_per_operation: Option<u64>,
    pub max_cost_per_operation: Option<f64>,
    pub max_tokens_per_session: Option<u64>,
    pub max_cost_per_session: Option<f64>,
    pub enforce_hard_limits: bool,
    pub warning_threshold: f64,
}

impl Default for BudgetSection {
    fn default() -> Self {
        let defaults = BudgetConfig::default();
        Self {
            max_tokens_per_operation: defaults.max_tokens_per_operation,
            max_cost_per_operation: defaults.max_cost_per_operation,
            max_tokens_per_session: defaults.max_tokens_per_session,
            max_cost_per_session: defaults.max_cost_per_session,
            enforce_hard_limits: defaults.enforce_hard_limits,
            warning_threshold: defaults.warning_threshold,
        }
    }
}

impl From<&BudgetSection> for BudgetConfig {
    fn from(section: &BudgetSection) -> Self {
        BudgetConfig {
            max_tokens_per_operation: section.max_tokens_per_operation,
            max_cost_per_operation: section.max_cost_per_operation,
            max_tokens_per_session: section.max_tokens_per_session,
            max_cost_per_session: section.max_cost_per_session,
            enforce_hard_limits: section.enforce_hard_limits,
            warning_threshold: section.warning_threshold,
        }
    }
}

/// `[circuit_breaker]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CircuitBreakerSection {
    pub failure_threshold: u32,
    pub failure_rate_threshold: f64,
    pub open_duration_seconds: u64,
    pub timeout_seconds: u64,
    pub rolling_window_size: usize,
    pub rolling_window_minutes: u64,
    pub minimum_throughput: usize,
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            failure_rate_threshold: defaults.failure_rate_threshold,
            open_duration_seconds: defaults.open_duration.as_secs(),
            timeout_seconds: defaults.timeout.as_secs(),
            rolling_window_size: defaults.rolling_window_size,
            rolling_window_minutes: defaults.rolling_window.as_secs() / 60,
            minimum_throughput: defaults.minimum_throughput,
        }
    }
}

impl From<&CircuitBreakerSection> for CircuitBreakerConfig {
    fn from(section: &CircuitBreakerSection) -> Self {
        CircuitBreakerConfig::new()
            .failure_threshold(section.failure_threshold)
            .failure_rate_threshold(section.failure_rate_threshold)
            .open_duration(Duration::from_secs(section.open_duration_seconds))
            .timeout(Duration::from_secs(section.timeout_seconds))
            .rolling_window_size(section.rolling_window_size)
            .rolling_window(Duration::from_secs(
                section.rolling_window_minutes.saturating_mul(60),
            ))
            .minimum_throughput(section.minimum_throughput)
    }
}

/// `[telemetry]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TelemetrySection {
    /// Records retained in memory.
    pub max_records: usize,
    /// Ignore `max_records` and keep everything until drained.
    pub unbounded: bool,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            unbounded: false,
        }
    }
}

impl TelemetrySection {
    /// Retention limit as understood by `TelemetryCollector`.
    pub fn retention(&self) -> Option<usize> {
        (!self.unbounded).then_some(self.max_records)
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.vordr/config.toml`
    /// 3. `/etc/vordr/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            VordrError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            VordrError::Configuration(msg) => {
                VordrError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Like [`load`](Self::load), but fall back to defaults when no file
    /// exists at the standard locations.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        if explicit_path.is_none() && Self::find_standard_path().is_none() {
            return Ok(Self::default());
        }
        Self::load(explicit_path)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            VordrError::Configuration(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section for values the components cannot honour.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.cache.deterministic_temperature_threshold;
        if !(0.0..=MAX_TEMPERATURE).contains(&threshold) {
            return Err(VordrError::Configuration(format!(
                "cache.deterministic_temperature_threshold must be within [0, {MAX_TEMPERATURE}], got {threshold}"
            )));
        }
        if self.cache.max_entries == 0 {
            return Err(VordrError::Configuration(
                "cache.max_entries must be positive".into(),
            ));
        }
        if self.cache.default_ttl_seconds == 0 {
            return Err(VordrError::Configuration(
                "cache.default_ttl_seconds must be positive".into(),
            ));
        }

        for (name, limit) in [
            ("max_cost_per_operation", self.budget.max_cost_per_operation),
            ("max_cost_per_session", self.budget.max_cost_per_session),
        ] {
            if let Some(limit) = limit
                && !(limit.is_finite() && limit >= 0.0)
            {
                return Err(VordrError::Configuration(format!(
                    "budget.{name} must be a non-negative number, got {limit}"
                )));
            }
        }
        let warning = self.budget.warning_threshold;
        if !(warning > 0.0 && warning <= 1.0) {
            return Err(VordrError::Configuration(format!(
                "budget.warning_threshold must be within (0, 1], got {warning}"
            )));
        }

        CircuitBreakerConfig::from(&self.circuit_breaker).validate()?;

        if let Some(model) = self.pricing.first_invalid() {
            return Err(VordrError::Configuration(format!(
                "pricing for '{model}' must be non-negative"
            )));
        }

        self.preset_registry().map(|_| ())
    }

    /// Built-in presets merged with `[presets.*]`.
    pub fn preset_registry(&self) -> Result<PresetRegistry> {
        PresetRegistry::from_overrides(&self.presets).map_err(|e| match e {
            VordrError::InvalidRequest(msg) => VordrError::Configuration(format!("presets: {msg}")),
            other => other,
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(VordrError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        Self::find_standard_path().ok_or_else(|| {
            VordrError::Configuration(
                "No config file found. Create ~/.vordr/config.toml or /etc/vordr/config.toml"
                    .to_string(),
            )
        })
    }

    fn find_standard_path() -> Option<PathBuf> {
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".vordr").join("config.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }
        let system_config = PathBuf::from("/etc/vordr/config.toml");
        system_config.exists().then_some(system_config)
    }
}
