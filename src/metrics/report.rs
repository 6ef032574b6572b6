use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub issuances_started: u64,
    pub issuances_succeeded: u64,
    pub issuance_failures: BTreeMap<String, u64>,
    pub issuance_p50_ms: f64,
    pub issuance_p95_ms: f64,
    pub verifications: u64,
    pub verifications_not_found: u64,
    pub statuses: BTreeMap<String, u64>,
    pub metadata_unretrievable: u64,
    pub audit_recorded: u64,
    pub audit_failed: u64,
    pub fallback_writes: u64,
    pub mirrored_writes: u64,
    pub read_retries: u64,
    pub cache_hit_rate: f64,
}

impl MetricsSnapshot {
    fn count(map: &BTreeMap<String, u64>, key: &str) -> u64 {
        map.get(key).copied().unwrap_or(0)
    }

    /// Appends one row to `filename`, writing the header on first use.
    pub fn save_to_csv(&self, filename: impl AsRef<Path>) -> Result<(), csv::Error> {
        let path = filename.as_ref();
        let file_exists = path.exists();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        let mut wtr = csv::Writer::from_writer(file);

        if !file_exists {
            wtr.write_record([
                "timestamp",
                "issuances_started",
                "issuances_succeeded",
                "failed_storing_metadata",
                "failed_submitting_transaction",
                "failed_awaiting_confirmation",
                "failed_extracting_id",
                "issuance_p50_ms",
                "issuance_p95_ms",
                "verifications",
                "verifications_not_found",
                "status_valid",
                "status_expired",
                "status_revoked",
                "status_invalid",
                "metadata_unretrievable",
                "audit_recorded",
                "audit_failed",
                "fallback_writes",
                "mirrored_writes",
                "read_retries",
                "cache_hit_rate_percent",
            ])?;
        }

        wtr.write_record([
            self.timestamp.clone(),
            self.issuances_started.to_string(),
            self.issuances_succeeded.to_string(),
            Self::count(&self.issuance_failures, "storing_metadata").to_string(),
            Self::count(&self.issuance_failures, "submitting_transaction").to_string(),
            Self::count(&self.issuance_failures, "awaiting_confirmation").to_string(),
            Self::count(&self.issuance_failures, "extracting_id").to_string(),
            self.issuance_p50_ms.to_string(),
            self.issuance_p95_ms.to_string(),
            self.verifications.to_string(),
            self.verifications_not_found.to_string(),
            Self::count(&self.statuses, "valid").to_string(),
            Self::count(&self.statuses, "expired").to_string(),
            Self::count(&self.statuses, "revoked").to_string(),
            Self::count(&self.statuses, "invalid").to_string(),
            self.metadata_unretrievable.to_string(),
            self.audit_recorded.to_string(),
            self.audit_failed.to_string(),
            self.fallback_writes.to_string(),
            self.mirrored_writes.to_string(),
            self.read_retries.to_string(),
            format!("{:.2}", self.cache_hit_rate),
        ])?;

        wtr.flush()?;
        Ok(())
    }

    pub fn print_report(&self) {
        println!("Orchestrator metrics ({})", self.timestamp);
        println!(
            "  issuance      {} started, {} succeeded, p50 {:.0} ms, p95 {:.0} ms",
            self.issuances_started, self.issuances_succeeded, self.issuance_p50_ms, self.issuance_p95_ms
        );
        for (phase, count) in &self.issuance_failures {
            println!("    failed in {:<24} {}", phase, count);
        }
        println!(
            "  verification  {} checked, {} not found, {} without metadata",
            self.verifications, self.verifications_not_found, self.metadata_unretrievable
        );
        for (status, count) in &self.statuses {
            println!("    {:<34} {}", status, count);
        }
        println!(
            "  audit         {} recorded, {} failed",
            self.audit_recorded, self.audit_failed
        );
        println!(
            "  storage       {} fallback writes, {} mirrored, {} read retries, {:.1}% cache hits",
            self.fallback_writes, self.mirrored_writes, self.read_retries, self.cache_hit_rate
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::metrics::OrchestratorMetrics;

    #[test]
    fn csv_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let metrics = OrchestratorMetrics::new();
        metrics.record_verification(Some("expired"));

        metrics.snapshot().save_to_csv(&path).unwrap();
        metrics.snapshot().save_to_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,"));
        assert_eq!(text.matches("timestamp").count(), 1);
    }
}
