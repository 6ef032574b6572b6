//! Test doubles shared by unit and integration tests.
//!
//! [`FlakyStore`] is a byte store with switchable outages, [`RecordingLedger`]
//! wraps any ledger client and writes each call into a [`CallLog`] so tests
//! can assert on call order across components.

use crate::error::{LedgerError, StoreError};
use crate::ledger::{
    CertificateId, CertificateRecord, LedgerClient, LedgerVerification, TxHandle, TxReceipt,
};
use crate::metadata::{
    CertificateMetadata, Credential, Issuer, Recipient, SCHEMA_VERSION, VerificationInfo,
};
use crate::storage::{BackendKind, Durability, MetadataStore};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const SAMPLE_RECIPIENT: &str = "0x1111111111111111111111111111111111111111";
pub const SAMPLE_ISSUER: &str = "0x2222222222222222222222222222222222222222";
pub const SAMPLE_CONTRACT: &str = "0x3333333333333333333333333333333333333333";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered record of calls made across components.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        lock(&self.0).push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    /// Index of the first entry starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        lock(&self.0).iter().position(|e| e.starts_with(prefix))
    }
}

/// In-memory store whose writes and reads can be made to fail on demand.
pub struct FlakyStore {
    kind: BackendKind,
    durability: Durability,
    endpoints: Vec<String>,
    content: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
    fail_fetches: AtomicBool,
    fail_next_fetches: AtomicUsize,
    puts: AtomicUsize,
    next_id: AtomicUsize,
    fetch_attempts: Mutex<Vec<String>>,
    log: Option<CallLog>,
}

impl FlakyStore {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            durability: Durability::Durable,
            endpoints: vec![format!("https://{}.gateway.test", kind.scheme())],
            content: Mutex::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
            fail_next_fetches: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
            fetch_attempts: Mutex::new(vec![]),
            log: None,
        }
    }

    pub fn with_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.durability = Durability::Ephemeral;
        self
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Fails the next `count` fetches, then recovers.
    pub fn fail_next_fetches(&self, count: usize) {
        self.fail_next_fetches.store(count, Ordering::SeqCst);
    }

    pub fn insert_raw(&self, id: impl Into<String>, bytes: Vec<u8>) {
        lock(&self.content).insert(id.into(), bytes);
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.content).contains_key(id)
    }

    /// Endpoints hit by every fetch so far, in order.
    pub fn fetch_attempts(&self) -> Vec<String> {
        lock(&self.fetch_attempts).clone()
    }

    /// Write attempts, failed ones included.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn outage(&self) -> StoreError {
        StoreError::unavailable(self.kind.scheme(), "injected outage")
    }
}

#[async_trait]
impl MetadataStore for FlakyStore {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn durability(&self) -> Durability {
        self.durability
    }

    fn read_endpoints(&self) -> Vec<String> {
        self.endpoints.clone()
    }

    async fn put_bytes(&self, bytes: Vec<u8>) -> Result<String, StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(log) = &self.log {
            log.push(format!("store.put:{}", self.kind));
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(self.outage());
        }
        let id = format!("{}-{}", self.kind.scheme(), self.next_id.fetch_add(1, Ordering::SeqCst));
        lock(&self.content).insert(id.clone(), bytes);
        Ok(id)
    }

    async fn fetch(&self, endpoint: &str, id: &str) -> Result<Vec<u8>, StoreError> {
        lock(&self.fetch_attempts).push(endpoint.to_string());
        if let Some(log) = &self.log {
            log.push(format!("store.fetch:{}", self.kind));
        }
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(self.outage());
        }
        let pending_failures = self.fail_next_fetches.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.fail_next_fetches
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(self.outage());
        }
        lock(&self.content)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("{}://{}", self.kind, id)))
    }
}

/// Ledger client that logs every call before delegating.
pub struct RecordingLedger {
    inner: Arc<dyn LedgerClient>,
    log: CallLog,
}

impl RecordingLedger {
    pub fn new(inner: Arc<dyn LedgerClient>, log: CallLog) -> Self {
        Self { inner, log }
    }
}

#[async_trait]
impl LedgerClient for RecordingLedger {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        self.log.push("ledger.chain_id");
        self.inner.chain_id().await
    }

    async fn issue_certificate(
        &self,
        recipient: &str,
        metadata_locator: &str,
        expiry: u64,
    ) -> Result<TxHandle, LedgerError> {
        self.log
            .push(format!("ledger.issue_certificate:{}", metadata_locator));
        self.inner
            .issue_certificate(recipient, metadata_locator, expiry)
            .await
    }

    async fn get_certificate(&self, id: &CertificateId) -> Result<CertificateRecord, LedgerError> {
        self.log.push(format!("ledger.get_certificate:{}", id));
        self.inner.get_certificate(id).await
    }

    async fn verify(&self, id: &CertificateId) -> Result<LedgerVerification, LedgerError> {
        self.log.push(format!("ledger.verify:{}", id));
        self.inner.verify(id).await
    }

    async fn record_verification(&self, id: &CertificateId) -> Result<TxHandle, LedgerError> {
        self.log.push(format!("ledger.record_verification:{}", id));
        self.inner.record_verification(id).await
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, LedgerError> {
        self.log.push("ledger.transaction_receipt");
        self.inner.transaction_receipt(hash).await
    }

    async fn certificates_of(&self, recipient: &str) -> Result<Vec<CertificateId>, LedgerError> {
        self.log.push("ledger.certificates_of");
        self.inner.certificates_of(recipient).await
    }
}

/// A fixed, fully populated metadata document.
pub fn sample_metadata() -> CertificateMetadata {
    let created = Utc
        .with_ymd_and_hms(2026, 1, 15, 9, 30, 0)
        .single()
        .unwrap_or_default();
    CertificateMetadata {
        schema_version: SCHEMA_VERSION.to_string(),
        recipient: Recipient {
            name: "Ada Lovelace".to_string(),
            wallet_address: SAMPLE_RECIPIENT.to_string(),
        },
        credential: Credential {
            title: "Analytical Engines 101".to_string(),
            description: "Completed the introductory course".to_string(),
            issue_date: created,
            expiry_date: Utc.with_ymd_and_hms(2027, 1, 15, 0, 0, 0).single(),
            credential_type: "course".to_string(),
        },
        issuer: Issuer {
            name: "Difference Academy".to_string(),
            website: Some("https://academy.example".to_string()),
            wallet_address: SAMPLE_ISSUER.to_string(),
            logo_locator: None,
        },
        additional: BTreeMap::from([("grade".to_string(), serde_json::json!("A"))]),
        verification: VerificationInfo {
            ledger_network_id: 1337,
            contract_address: SAMPLE_CONTRACT.to_string(),
        },
        created_at: created,
        updated_at: created,
    }
}
