//! Aggregate statistics over telemetry records.

use std::collections::BTreeMap;

use serde::Serialize;

use super::collector::OperationTelemetry;

/// Aggregates over a set of telemetry records.
///
/// Latency figures cover every record, cache hits included. Percentiles use
/// the nearest-rank method over the recorded distribution; all latency
/// fields are zero when there are no records.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryStatistics {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub cache_hits: u64,
    pub cache_hit_rate: f64,
    pub average_latency_ms: f64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    pub total_estimated_cost: f64,
    pub total_retries: u64,
    pub by_provider: BTreeMap<String, ProviderStatistics>,
}

/// Per-provider slice of [`TelemetryStatistics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderStatistics {
    pub operations: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub average_latency_ms: f64,
    pub total_tokens: u64,
    pub total_estimated_cost: f64,
}

impl TelemetryStatistics {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a OperationTelemetry>) -> Self {
        let mut stats = Self::default();
        let mut latencies = Vec::new();
        let mut provider_latency: BTreeMap<String, u64> = BTreeMap::new();

        for record in records {
            stats.total_operations += 1;
            if record.success {
                stats.successful_operations += 1;
            } else {
                stats.failed_operations += 1;
            }
            if record.cache_hit {
                stats.cache_hits += 1;
            }
            stats.total_tokens_in += record.tokens_in;
            stats.total_tokens_out += record.tokens_out;
            stats.total_estimated_cost += record.estimated_cost;
            stats.total_retries += u64::from(record.retry_count);
            latencies.push(record.latency_ms);

            let provider = stats.by_provider.entry(record.provider.clone()).or_default();
            provider.operations += 1;
            if record.success {
                provider.successes += 1;
            } else {
                provider.failures += 1;
            }
            if record.cache_hit {
                provider.cache_hits += 1;
            }
            provider.total_tokens += record.total_tokens();
            provider.total_estimated_cost += record.estimated_cost;
            *provider_latency.entry(record.provider.clone()).or_default() += record.latency_ms;
        }

        if stats.total_operations == 0 {
            return stats;
        }

        for (name, provider) in &mut stats.by_provider {
            let sum = provider_latency.get(name).copied().unwrap_or(0);
            provider.average_latency_ms = sum as f64 / provider.operations as f64;
        }

        let total = stats.total_operations as f64;
        stats.cache_hit_rate = stats.cache_hits as f64 / total;
        stats.average_latency_ms = latencies.iter().sum::<u64>() as f64 / total;

        latencies.sort_unstable();
        stats.p50_latency_ms = percentile(&latencies, 50.0);
        stats.p95_latency_ms = percentile(&latencies, 95.0);
        stats.p99_latency_ms = percentile(&latencies, 99.0);
        stats
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens_in + self.total_tokens_out
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }
        self.successful_operations as f64 / self.total_operations as f64
    }
}

/// Nearest-rank percentile of an ascending slice; 0 when empty.
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
