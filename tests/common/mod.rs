#![allow(dead_code)]

use cert_anchor::clock::{Clock, FixedClock};
use cert_anchor::ledger::{DevLedger, LedgerClient};
use cert_anchor::metrics::OrchestratorMetrics;
use cert_anchor::network::{NetworkParams, SessionManager};
use cert_anchor::storage::{BackendKind, LocalStore, MetadataStore, ReadRetry, StorageRouter};
use cert_anchor::testutil::{CallLog, FlakyStore, RecordingLedger, SAMPLE_CONTRACT, SAMPLE_ISSUER};
use cert_anchor::{CertificateInput, CertificateOrchestrator, MetadataCodec};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

pub const CHAIN_ID: u64 = 1337;
pub const RECIPIENT: &str = "0x1111111111111111111111111111111111111111";
pub const OTHER_RECIPIENT: &str = "0x4444444444444444444444444444444444444444";

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

pub fn devnet() -> NetworkParams {
    NetworkParams {
        chain_id: CHAIN_ID,
        name: "devnet".to_string(),
        rpc_url: "http://127.0.0.1:8545".to_string(),
        contract_address: SAMPLE_CONTRACT.to_string(),
        explorer_url: None,
        currency_symbol: "ETH".to_string(),
    }
}

/// Orchestrator wired to a mined dev ledger, a flaky primary store and an
/// in-memory fallback, with every store and ledger call logged.
pub struct Harness {
    pub orchestrator: CertificateOrchestrator,
    pub ledger: Arc<DevLedger>,
    pub session: Arc<SessionManager>,
    pub clock: FixedClock,
    pub log: CallLog,
    pub primary: Arc<FlakyStore>,
    pub fallback: Arc<LocalStore>,
    pub metrics: Arc<OrchestratorMetrics>,
}

#[derive(Default)]
pub struct HarnessOptions {
    pub without_fallback: bool,
    pub mirror_to_fallback: bool,
    pub cache_capacity: usize,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_options(HarnessOptions::default()).await
    }

    pub async fn with_options(options: HarnessOptions) -> Self {
        let clock = FixedClock::new(start());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let log = CallLog::new();
        let metrics = Arc::new(OrchestratorMetrics::new());

        let ledger = Arc::new(
            DevLedger::new(CHAIN_ID, SAMPLE_ISSUER, shared_clock.clone()).with_difficulty(1),
        );
        let recorded: Arc<dyn LedgerClient> =
            Arc::new(RecordingLedger::new(ledger.clone(), log.clone()));

        let session = Arc::new(SessionManager::new(devnet()));
        session.attach(CHAIN_ID).await;

        let primary = Arc::new(FlakyStore::new(BackendKind::Arweave).with_call_log(log.clone()));
        let fallback = Arc::new(LocalStore::new());
        let mut backends: Vec<Arc<dyn MetadataStore>> = vec![primary.clone()];
        if !options.without_fallback {
            backends.push(fallback.clone());
        }
        let router = StorageRouter::new(backends)
            .with_read_retry(ReadRetry {
                attempts: 3,
                delay: std::time::Duration::from_millis(250),
            })
            .with_mirror_to_fallback(options.mirror_to_fallback)
            .with_cache_capacity(options.cache_capacity)
            .with_metrics(metrics.clone());

        let orchestrator = CertificateOrchestrator::new(
            MetadataCodec::new(shared_clock.clone(), CHAIN_ID, SAMPLE_CONTRACT),
            Arc::new(router),
            recorded,
            session.clone(),
            shared_clock,
        )
        .with_confirmation_timeout(std::time::Duration::from_secs(30))
        .with_poll_interval(std::time::Duration::from_millis(500))
        .with_metrics(metrics.clone());

        Self {
            orchestrator,
            ledger,
            session,
            clock,
            log,
            primary,
            fallback,
            metrics,
        }
    }

    /// Input expiring `days` from the harness clock (negative for the past).
    pub fn input_expiring_in(&self, days: i64) -> CertificateInput {
        CertificateInput::new(RECIPIENT, SAMPLE_ISSUER)
            .with_recipient_name("Grace Hopper")
            .with_title("Compiler Construction")
            .with_issuer_name("Harbor University")
            .with_expiry(self.clock.now() + Duration::days(days))
    }
}
