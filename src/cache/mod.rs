//! Response caching for deterministic operations.
//!
//! - [`key`] derives a stable SHA-256 [`CacheKey`] from everything that can
//!   change a deterministic response.
//! - [`response::ResponseCache`] stores payloads under those keys with a TTL
//!   and LRU bound. See the [`response`] module docs for the expiry model.
//!
//! Only operations whose effective temperature is at or below
//! [`CacheConfig::deterministic_temperature_threshold`] are cached; the
//! orchestrator enforces that before generating a key.

pub mod key;
pub mod response;

pub use key::{CacheKey, KeyInput, generate_key, normalize_prompt};
pub use response::{
    CacheConfig, CacheEntry, CacheStats, ResponseCache, spawn_expiry_sweeper,
};
