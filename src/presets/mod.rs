//! Operation preset registry.
//!
//! Maps an [`OperationType`] to its governed [`OperationPreset`]. The table
//! is built once at startup from the built-in defaults, optionally merged
//! with `[presets.<operation>]` configuration, and never mutated afterwards.
//!
//! Merge priority: configuration overrides built-in defaults per field (not
//! whole-entry replacement). Operation types without an entry resolve to the
//! fallback preset.

pub mod preset;

use std::collections::{BTreeMap, HashMap};

pub use preset::{MAX_TEMPERATURE, OperationPreset, OperationType, PresetOverrides};

use crate::Result;

/// Built-in defaults: (operation, temperature, top_p, max_tokens, timeout_s, max_retries).
///
/// Analytical and structured operations run cold so their responses are
/// cacheable; creative operations run hot and are never cached.
const DEFAULT_PRESETS: &[(OperationType, f32, f32, u32, u64, u32)] = &[
    (OperationType::PlanScaffolding, 0.2, 0.9, 2_000, 60, 2),
    (OperationType::SceneAnalysis, 0.2, 0.9, 1_500, 45, 2),
    (OperationType::VisualPrompt, 0.7, 0.95, 800, 30, 1),
    (OperationType::CreativeScripting, 0.9, 0.95, 4_000, 120, 1),
    (OperationType::NarrationRefinement, 0.5, 0.9, 2_000, 60, 1),
    (OperationType::Summarization, 0.3, 0.9, 1_000, 30, 2),
    (OperationType::Extraction, 0.0, 1.0, 1_000, 30, 3),
    (OperationType::Classification, 0.1, 1.0, 200, 20, 2),
    (OperationType::Translation, 0.3, 0.9, 2_000, 60, 2),
];

/// Fallback values for operation types with no entry.
const FALLBACK_PRESET: (f32, f32, u32, u64, u32) = (0.7, 0.9, 2_000, 60, 1);

/// Immutable operation → preset lookup table.
#[derive(Debug, Clone)]
pub struct PresetRegistry {
    entries: HashMap<OperationType, OperationPreset>,
    fallback: OperationPreset,
}

impl PresetRegistry {
    /// Create a registry holding only the fallback preset.
    pub fn empty() -> Self {
        let (temperature, top_p, max_tokens, timeout, retries) = FALLBACK_PRESET;
        Self {
            entries: HashMap::new(),
            fallback: OperationPreset::from_trusted(
                OperationType::Custom("default".to_string()),
                temperature,
                top_p,
                max_tokens,
                timeout,
                retries,
            ),
        }
    }

    /// Create a registry pre-populated with the built-in defaults.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for (op, temperature, top_p, max_tokens, timeout, retries) in DEFAULT_PRESETS {
            // Built-in values are compile-time constants covered by tests.
            if let Ok(preset) = OperationPreset::new(
                op.clone(),
                *temperature,
                *top_p,
                *max_tokens,
                *timeout,
                *retries,
            ) {
                registry.entries.insert(op.clone(), preset);
            }
        }
        registry
    }

    /// Built-in defaults merged with configured overrides.
    ///
    /// Each override table is applied over the built-in entry for that
    /// operation (or over the fallback for operations without one). Any
    /// invalid result fails the whole load.
    pub fn from_overrides(overrides: &BTreeMap<OperationType, PresetOverrides>) -> Result<Self> {
        let mut registry = Self::with_defaults();
        for (op, partial) in overrides {
            let base = registry.get(op);
            let merged = base.apply(partial)?;
            registry.entries.insert(op.clone(), merged);
        }
        Ok(registry)
    }

    /// Insert a preset, replacing any existing entry for its operation.
    ///
    /// Only available while the registry is still owned by its builder;
    /// once handed to the orchestrator it is shared immutably.
    pub fn insert(&mut self, preset: OperationPreset) {
        self.entries.insert(preset.operation_type().clone(), preset);
    }

    /// Governed preset for an operation type.
    ///
    /// Unknown operations get the fallback preset relabelled with the
    /// requested operation type.
    pub fn get(&self, operation: &OperationType) -> OperationPreset {
        self.entries
            .get(operation)
            .cloned()
            .unwrap_or_else(|| self.fallback.for_operation(operation.clone()))
    }

    /// Whether an explicit entry exists for the operation.
    pub fn contains(&self, operation: &OperationType) -> bool {
        self.entries.contains_key(operation)
    }

    /// All explicit entries, sorted by operation name.
    pub fn list(&self) -> Vec<&OperationPreset> {
        let mut presets: Vec<_> = self.entries.values().collect();
        presets.sort_by(|a, b| a.operation_type().as_str().cmp(b.operation_type().as_str()));
        presets
    }

    /// Number of explicit entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no explicit entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PresetRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
