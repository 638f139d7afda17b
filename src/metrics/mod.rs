//! Subscriber metrics
//!
//! In-process counters and duration statistics updated by the bookkeeper.
//! [`SubscriberMetrics::snapshot`] returns a plain copy for reporting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::types::Status;

/// Count, total and maximum of recorded durations
#[derive(Debug, Default)]
pub struct DurationStat {
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl DurationStat {
    pub fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
    }

    /// Record a chrono duration, clamping negative values to zero
    pub fn record_since(&self, start: DateTime<Utc>) {
        let elapsed = (Utc::now() - start).to_std().unwrap_or_default();
        self.record(elapsed);
    }

    pub fn summary(&self) -> DurationSummary {
        DurationSummary {
            count: self.count.load(Ordering::Relaxed),
            total_ms: self.total_ms.load(Ordering::Relaxed),
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of a [`DurationStat`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DurationSummary {
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,
}

impl DurationSummary {
    pub fn mean_ms(&self) -> u64 {
        if self.count == 0 {
            0
        } else {
            self.total_ms / self.count
        }
    }
}

/// Import currently in progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentImport {
    pub pkg_id: String,
    pub pub_agent_name: String,
    pub offset: u64,
    pub start_time: DateTime<Utc>,
}

/// Counters kept by one subscriber agent
#[derive(Debug, Default)]
pub struct SubscriberMetrics {
    pub failed_package_imports: AtomicU64,
    /// Packages given up after exhausting retries
    pub permanent_import_errors: AtomicU64,
    /// Failures that reached the blocking threshold
    pub blocking_import_errors: AtomicU64,
    /// Successes after at least one failure
    pub transient_import_errors: AtomicU64,

    pub import_pre_process_requests: AtomicU64,
    pub import_pre_process_success: AtomicU64,
    pub import_post_process_requests: AtomicU64,
    pub import_post_process_success: AtomicU64,
    pub invalidation_process_requests: AtomicU64,
    pub invalidation_process_success: AtomicU64,

    pub imported_package_size: AtomicU64,

    pub imported_package_duration: DurationStat,
    pub package_distributed_duration: DurationStat,
    pub removed_package_duration: DurationStat,
    pub removed_failed_package_duration: DurationStat,
    pub import_pre_process_duration: DurationStat,
    pub import_post_process_duration: DurationStat,
    pub invalidation_process_duration: DurationStat,

    status_counters: Mutex<BTreeMap<(String, Status), u64>>,
    current_import: Mutex<Option<CurrentImport>>,
}

impl SubscriberMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Count a processing status reached for a publisher agent
    pub fn increment_status(&self, pub_agent_name: &str, status: Status) {
        *self
            .status_counters
            .lock()
            .entry((pub_agent_name.to_string(), status))
            .or_insert(0) += 1;
    }

    pub fn status_count(&self, pub_agent_name: &str, status: Status) -> u64 {
        self.status_counters
            .lock()
            .get(&(pub_agent_name.to_string(), status))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_current_import(&self, current: CurrentImport) {
        *self.current_import.lock() = Some(current);
    }

    pub fn clear_current_import(&self) {
        *self.current_import.lock() = None;
    }

    pub fn current_import(&self) -> Option<CurrentImport> {
        self.current_import.lock().clone()
    }

    /// Copy every counter; `current_retries` is the retry ledger's sum
    pub fn snapshot(&self, current_retries: u64) -> MetricsSnapshot {
        let status_counts = self
            .status_counters
            .lock()
            .iter()
            .map(|((pub_agent, status), count)| (format!("{}:{}", pub_agent, status), *count))
            .collect();

        MetricsSnapshot {
            failed_package_imports: Self::count(&self.failed_package_imports),
            permanent_import_errors: Self::count(&self.permanent_import_errors),
            blocking_import_errors: Self::count(&self.blocking_import_errors),
            transient_import_errors: Self::count(&self.transient_import_errors),
            import_pre_process_requests: Self::count(&self.import_pre_process_requests),
            import_pre_process_success: Self::count(&self.import_pre_process_success),
            import_post_process_requests: Self::count(&self.import_post_process_requests),
            import_post_process_success: Self::count(&self.import_post_process_success),
            invalidation_process_requests: Self::count(&self.invalidation_process_requests),
            invalidation_process_success: Self::count(&self.invalidation_process_success),
            imported_package_size: Self::count(&self.imported_package_size),
            imported_package_duration: self.imported_package_duration.summary(),
            package_distributed_duration: self.package_distributed_duration.summary(),
            removed_package_duration: self.removed_package_duration.summary(),
            removed_failed_package_duration: self.removed_failed_package_duration.summary(),
            status_counts,
            current_retries,
            current_import: self.current_import(),
        }
    }
}

/// Point-in-time copy of [`SubscriberMetrics`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub failed_package_imports: u64,
    pub permanent_import_errors: u64,
    pub blocking_import_errors: u64,
    pub transient_import_errors: u64,
    pub import_pre_process_requests: u64,
    pub import_pre_process_success: u64,
    pub import_post_process_requests: u64,
    pub import_post_process_success: u64,
    pub invalidation_process_requests: u64,
    pub invalidation_process_success: u64,
    pub imported_package_size: u64,
    pub imported_package_duration: DurationSummary,
    pub package_distributed_duration: DurationSummary,
    pub removed_package_duration: DurationSummary,
    pub removed_failed_package_duration: DurationSummary,
    /// Keyed by `pub_agent:STATUS`
    pub status_counts: BTreeMap<String, u64>,
    /// Sum of retry counts over all publisher agents
    pub current_retries: u64,
    pub current_import: Option<CurrentImport>,
}
