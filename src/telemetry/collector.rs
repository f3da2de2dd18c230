//! In-memory telemetry collection.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stats::TelemetryStatistics;
use crate::error::ErrorKind;
use crate::presets::OperationType;

/// Default number of records retained by [`TelemetryCollector::new`].
pub const DEFAULT_MAX_RECORDS: usize = 10_000;

/// One governed operation, as observed by the orchestrator.
///
/// Records are immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationTelemetry {
    pub operation_id: Uuid,
    pub session_id: String,
    pub operation_type: OperationType,
    pub provider: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// Repair attempts beyond the first invocation.
    pub retry_count: u32,
    pub latency_ms: u64,
    pub success: bool,
    pub cache_hit: bool,
    pub estimated_cost: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Failure category, for unsuccessful operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl OperationTelemetry {
    pub fn total_tokens(&self) -> u64 {
        self.tokens_in + self.tokens_out
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Append-only, thread-safe store of [`OperationTelemetry`] records.
///
/// Retention is a ring buffer: once `max_records` is reached the oldest
/// record is dropped for each new one. With `max_records = None` the
/// collector grows without bound; pair that with periodic
/// [`drain`](Self::drain) calls.
#[derive(Debug)]
pub struct TelemetryCollector {
    records: Mutex<VecDeque<OperationTelemetry>>,
    max_records: Option<usize>,
}

impl TelemetryCollector {
    /// Collector retaining the most recent [`DEFAULT_MAX_RECORDS`] records.
    pub fn new() -> Self {
        Self::with_max_records(Some(DEFAULT_MAX_RECORDS))
    }

    /// Collector with explicit retention; `None` keeps everything.
    pub fn with_max_records(max_records: Option<usize>) -> Self {
        let initial = max_records.unwrap_or(0).min(1024);
        Self {
            records: Mutex::new(VecDeque::with_capacity(initial)),
            max_records,
        }
    }

    pub fn max_records(&self) -> Option<usize> {
        self.max_records
    }

    /// Append a record and emit its metrics.
    pub fn record(&self, telemetry: OperationTelemetry) {
        emit_metrics(&telemetry);
        let mut records = self.lock();
        if let Some(max) = self.max_records {
            if max == 0 {
                return;
            }
            while records.len() >= max {
                records.pop_front();
            }
        }
        records.push_back(telemetry);
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every retained record, oldest first.
    pub fn snapshot(&self) -> Vec<OperationTelemetry> {
        self.lock().iter().cloned().collect()
    }

    /// Remove and return every retained record, oldest first.
    pub fn drain(&self) -> Vec<OperationTelemetry> {
        self.lock().drain(..).collect()
    }

    /// Aggregate statistics over every retained record.
    pub fn statistics(&self) -> TelemetryStatistics {
        TelemetryStatistics::from_records(self.lock().iter())
    }

    /// Aggregate statistics for one session.
    pub fn session_statistics(&self, session_id: &str) -> TelemetryStatistics {
        TelemetryStatistics::from_records(
            self.lock().iter().filter(|r| r.session_id == session_id),
        )
    }

    // A panic while holding the lock cannot leave a half-written record.
    fn lock(&self) -> MutexGuard<'_, VecDeque<OperationTelemetry>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn emit_metrics(record: &OperationTelemetry) {
    let provider = record.provider.clone();
    let operation = record.operation_type.as_str().to_owned();
    let status = if record.success { "ok" } else { "error" };

    metrics::counter!(super::OPERATIONS_TOTAL,
        "provider" => provider.clone(),
        "operation" => operation.clone(),
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(super::OPERATION_DURATION_SECONDS,
        "provider" => provider.clone(),
        "operation" => operation,
    )
    .record(record.latency().as_secs_f64());

    if record.tokens_in > 0 {
        metrics::counter!(super::TOKENS_TOTAL,
            "provider" => provider.clone(),
            "direction" => "input",
        )
        .increment(record.tokens_in);
    }
    if record.tokens_out > 0 {
        metrics::counter!(super::TOKENS_TOTAL,
            "provider" => provider,
            "direction" => "output",
        )
        .increment(record.tokens_out);
    }
}
