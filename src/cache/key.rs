//! Deterministic cache keys.
//!
//! A key is the SHA-256 digest of a canonical rendering of everything that
//! can change a deterministic response: provider, model, operation type,
//! normalized prompts, and the sampling parameters. Two requests that differ
//! only in prompt whitespace or letter case share a key; numeric parameters
//! are rendered with two decimals so `0.2` and `0.20000001` agree.
//!
//! Keys are stable across processes and builds, unlike `DefaultHasher`.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Field separator in the canonical form (ASCII unit separator). Fields are
/// also length-prefixed, so a separator inside user text cannot shift a
/// boundary.
const FIELD_SEPARATOR: char = '\u{1f}';

/// Hex-encoded SHA-256 cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already computed digest (e.g. read back from a dashboard).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Inputs to [`generate_key`].
///
/// ```rust
/// # use vordr::cache::KeyInput;
/// let key = KeyInput::new("OpenAI", "gpt-4", "SceneAnalysis", "describe scene 1")
///     .temperature(0.2)
///     .max_tokens(1500)
///     .param("top_p", "0.9")
///     .key();
/// assert_eq!(key.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, Default)]
pub struct KeyInput<'a> {
    pub provider: &'a str,
    pub model: &'a str,
    pub operation_type: &'a str,
    pub system_prompt: Option<&'a str>,
    pub user_prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Additional named parameters; order does not matter.
    pub params: Vec<(&'a str, String)>,
}

impl<'a> KeyInput<'a> {
    pub fn new(
        provider: &'a str,
        model: &'a str,
        operation_type: &'a str,
        user_prompt: &'a str,
    ) -> Self {
        Self {
            provider,
            model,
            operation_type,
            user_prompt,
            ..Default::default()
        }
    }

    pub fn system_prompt(mut self, prompt: Option<&'a str>) -> Self {
        self.system_prompt = prompt;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn param(mut self, name: &'a str, value: impl Into<String>) -> Self {
        self.params.push((name, value.into()));
        self
    }

    /// Compute the key for these inputs.
    pub fn key(&self) -> CacheKey {
        generate_key(self)
    }
}

/// Compute the cache key for a set of inputs.
///
/// Same logical inputs always produce the same key; no side effects.
/// Callers must only use the key for operations at or below the
/// deterministic-caching temperature threshold.
pub fn generate_key(input: &KeyInput<'_>) -> CacheKey {
    let canonical = canonical_form(input);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    CacheKey(format!("{:x}", hasher.finalize()))
}

/// Trim and case-fold free text; collapse internal whitespace runs.
pub fn normalize_prompt(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Fixed-precision rendering for numeric parameters.
pub fn format_number(value: f64) -> String {
    format!("{value:.2}")
}

fn canonical_form(input: &KeyInput<'_>) -> String {
    let mut params: Vec<(String, &str)> = input
        .params
        .iter()
        .map(|(name, value)| (name.trim().to_lowercase(), value.as_str()))
        .collect();
    params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    let mut fields = vec![
        normalize_identifier(input.provider),
        normalize_identifier(input.model),
        normalize_identifier(input.operation_type),
        input
            .system_prompt
            .map(normalize_prompt)
            .unwrap_or_default(),
        normalize_prompt(input.user_prompt),
        format_number(f64::from(input.temperature)),
        input.max_tokens.to_string(),
    ];
    for (name, value) in params {
        fields.push(format!("{name}={}", canonical_value(value)));
    }

    let mut out = String::new();
    for field in fields {
        out.push_str(&field.len().to_string());
        out.push(':');
        out.push_str(&field);
        out.push(FIELD_SEPARATOR);
    }
    out
}

fn normalize_identifier(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Numeric strings get fixed precision; anything else is trimmed.
fn canonical_value(value: &str) -> String {
    let trimmed = value.trim();
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => format_number(n),
        _ => trimmed.to_string(),
    }
}
