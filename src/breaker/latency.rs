//! EWMA latency tracking per provider.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default smoothing factor.
pub const DEFAULT_ALPHA: f64 = 0.2;

/// Exponentially weighted moving average of successful call durations.
///
/// Lock-free: the average is an `f64` (milliseconds) stored as bits in an
/// `AtomicU64` and updated with a CAS loop. A higher `alpha` reacts faster
/// to change; a lower one is smoother.
pub struct ProviderLatency {
    ewma_ms_bits: AtomicU64,
    samples: AtomicU64,
    alpha: f64,
}

impl ProviderLatency {
    pub fn new(alpha: f64) -> Self {
        Self {
            ewma_ms_bits: AtomicU64::new(0_f64.to_bits()),
            samples: AtomicU64::new(0),
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    /// Fold one observation into the average.
    ///
    /// Two threads racing on the very first sample may both seed the
    /// average; later samples converge regardless.
    pub fn record(&self, elapsed: Duration) {
        let observed = elapsed.as_secs_f64() * 1000.0;
        let first = self.samples.load(Ordering::Relaxed) == 0;
        let _ = self
            .ewma_ms_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                let current = f64::from_bits(bits);
                let next = if first {
                    observed
                } else {
                    self.alpha * observed + (1.0 - self.alpha) * current
                };
                Some(next.to_bits())
            });
        self.samples.fetch_add(1, Ordering::Relaxed);
    }

    /// Smoothed latency in milliseconds, if anything was recorded.
    pub fn average_ms(&self) -> Option<f64> {
        if self.samples.load(Ordering::Relaxed) == 0 {
            return None;
        }
        Some(f64::from_bits(self.ewma_ms_bits.load(Ordering::Relaxed)))
    }

    pub fn sample_count(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.samples.store(0, Ordering::Relaxed);
        self.ewma_ms_bits.store(0_f64.to_bits(), Ordering::Relaxed);
    }
}

impl Default for ProviderLatency {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl std::fmt::Debug for ProviderLatency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderLatency")
            .field("average_ms", &self.average_ms())
            .field("samples", &self.sample_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_average() {
        let latency = ProviderLatency::default();
        assert_eq!(latency.average_ms(), None);
        latency.record(Duration::from_millis(100));
        assert_eq!(latency.average_ms(), Some(100.0));
    }

    #[test]
    fn later_samples_are_smoothed() {
        let latency = ProviderLatency::new(0.5);
        latency.record(Duration::from_millis(100));
        latency.record(Duration::from_millis(200));
        let avg = latency.average_ms().unwrap();
        assert!((avg - 150.0).abs() < 1e-6);
        assert_eq!(latency.sample_count(), 2);
    }
}
