use super::report::MetricsSnapshot;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

const LATENCY_WINDOW: usize = 1000;

/// Process-wide counters for the orchestrator and storage router.
#[derive(Debug, Default)]
pub struct OrchestratorMetrics {
    issuances_started: AtomicU64,
    issuances_succeeded: AtomicU64,
    verifications: AtomicU64,
    verifications_not_found: AtomicU64,
    metadata_unretrievable: AtomicU64,
    audit_recorded: AtomicU64,
    audit_failed: AtomicU64,
    fallback_writes: AtomicU64,
    mirrored_writes: AtomicU64,
    read_retries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    failures_by_phase: Mutex<BTreeMap<String, u64>>,
    statuses: Mutex<BTreeMap<String, u64>>,
    issuance_latencies_ms: Mutex<Vec<u128>>,
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_issuance_started(&self) {
        self.issuances_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_issuance_succeeded(&self, latency_ms: u128) {
        self.issuances_succeeded.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut stored) = self.issuance_latencies_ms.lock() {
            stored.push(latency_ms);
            // keep bounded to the most recent window
            if stored.len() > LATENCY_WINDOW {
                let start = stored.len() - LATENCY_WINDOW;
                stored.drain(..start);
            }
        }
    }

    pub fn record_issuance_failed(&self, phase: &str) {
        bump(&self.failures_by_phase, phase);
    }

    pub fn record_verification(&self, status: Option<&str>) {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        match status {
            Some(status) => bump(&self.statuses, status),
            None => {
                self.verifications_not_found.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_metadata_unretrievable(&self) {
        self.metadata_unretrievable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audit(&self, recorded: bool) {
        let counter = if recorded {
            &self.audit_recorded
        } else {
            &self.audit_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback_write(&self) {
        self.fallback_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mirrored_write(&self) {
        self.mirrored_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_retry(&self) {
        self.read_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let counter = if hit {
            &self.cache_hits
        } else {
            &self.cache_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut latencies = self
            .issuance_latencies_ms
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default();
        latencies.sort();
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);

        MetricsSnapshot {
            timestamp: Utc::now().to_rfc3339(),
            issuances_started: self.issuances_started.load(Ordering::Relaxed),
            issuances_succeeded: self.issuances_succeeded.load(Ordering::Relaxed),
            issuance_failures: self.failures_by_phase.lock().map(|m| m.clone()).unwrap_or_default(),
            issuance_p50_ms: percentile(&latencies, 0.50),
            issuance_p95_ms: percentile(&latencies, 0.95),
            verifications: self.verifications.load(Ordering::Relaxed),
            verifications_not_found: self.verifications_not_found.load(Ordering::Relaxed),
            statuses: self.statuses.lock().map(|m| m.clone()).unwrap_or_default(),
            metadata_unretrievable: self.metadata_unretrievable.load(Ordering::Relaxed),
            audit_recorded: self.audit_recorded.load(Ordering::Relaxed),
            audit_failed: self.audit_failed.load(Ordering::Relaxed),
            fallback_writes: self.fallback_writes.load(Ordering::Relaxed),
            mirrored_writes: self.mirrored_writes.load(Ordering::Relaxed),
            read_retries: self.read_retries.load(Ordering::Relaxed),
            cache_hit_rate: if hits + misses == 0 {
                0.0
            } else {
                (hits as f64 / (hits + misses) as f64) * 100.0
            },
        }
    }
}

fn bump(map: &Mutex<BTreeMap<String, u64>>, key: &str) {
    if let Ok(mut map) = map.lock() {
        *map.entry(key.to_string()).or_insert(0) += 1;
    }
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[u128], quant: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let idx = (quant * n as f64).ceil() as isize - 1;
    let idx = idx.clamp(0, n as isize - 1) as usize;
    sorted[idx] as f64
}
