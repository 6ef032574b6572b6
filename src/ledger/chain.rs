use super::block::Block;
use super::client::LedgerClient;
use super::transaction::{ContractCall, LedgerTransaction};
use super::types::*;
use crate::clock::Clock;
use crate::error::LedgerError;
use async_trait::async_trait;
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct ContractState {
    certificates: BTreeMap<u64, CertificateRecord>,
    next_certificate_id: u64,
    authorized_issuers: HashSet<String>,
    invalidated: HashSet<u64>,
    verification_counts: HashMap<u64, u64>,
    receipts: HashMap<String, TxReceipt>,
}

#[derive(Debug, Default)]
struct Faults {
    unreachable: bool,
    reject_next: bool,
    revert_next: bool,
    omit_next_event: bool,
    duplicate_next_event: bool,
    stalled: bool,
}

/// In-process certificate ledger: submitted calls wait in a pending pool
/// until mined into a proof-of-work block, at which point they take effect
/// and produce receipts.
pub struct DevLedger {
    chain_id: u64,
    sender: String,
    pub chain: Arc<RwLock<Vec<Block>>>,
    pending: Arc<RwLock<Vec<LedgerTransaction>>>,
    state: Arc<RwLock<ContractState>>,
    faults: Arc<RwLock<Faults>>,
    difficulty: u32,
    auto_mine: bool,
    nonce: AtomicU64,
    submissions: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl DevLedger {
    pub fn new(chain_id: u64, sender: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let sender = sender.into();
        let mut state = ContractState::default();
        state.authorized_issuers.insert(sender.to_ascii_lowercase());

        Self {
            chain_id,
            sender,
            chain: Arc::new(RwLock::new(vec![Block::genesis(clock.now())])),
            pending: Arc::new(RwLock::new(vec![])),
            state: Arc::new(RwLock::new(state)),
            faults: Arc::new(RwLock::new(Faults::default())),
            difficulty: 2,
            auto_mine: true,
            nonce: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
            clock,
        }
    }

    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// When enabled, pending transactions are mined as soon as a receipt is
    /// asked for.
    pub fn with_auto_mine(mut self, auto_mine: bool) -> Self {
        self.auto_mine = auto_mine;
        self
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn get_chain_length(&self) -> usize {
        self.chain.read().await.len()
    }

    pub async fn get_blockchain_size(&self) -> usize {
        let chain = self.chain.read().await;
        bincode::serialize(&*chain).unwrap_or_default().len()
    }

    pub async fn set_reachable(&self, reachable: bool) {
        self.faults.write().await.unreachable = !reachable;
    }

    pub async fn reject_next_submission(&self) {
        self.faults.write().await.reject_next = true;
    }

    pub async fn revert_next_transaction(&self) {
        self.faults.write().await.revert_next = true;
    }

    pub async fn omit_next_event(&self) {
        self.faults.write().await.omit_next_event = true;
    }

    pub async fn duplicate_next_event(&self) {
        self.faults.write().await.duplicate_next_event = true;
    }

    /// Holds every pending transaction in the pool until released.
    pub async fn stall_confirmations(&self, stalled: bool) {
        self.faults.write().await.stalled = stalled;
    }

    pub async fn authorize_issuer(&self, issuer: &str) {
        self.state
            .write()
            .await
            .authorized_issuers
            .insert(issuer.to_ascii_lowercase());
    }

    pub async fn deauthorize_issuer(&self, issuer: &str) {
        self.state
            .write()
            .await
            .authorized_issuers
            .remove(&issuer.to_ascii_lowercase());
    }

    /// Marks a certificate as failing contract-side validation.
    pub async fn invalidate(&self, id: &CertificateId) -> Result<(), LedgerError> {
        let key = parse_id(id)?;
        let mut state = self.state.write().await;
        if !state.certificates.contains_key(&key) {
            return Err(not_found(id));
        }
        state.invalidated.insert(key);
        Ok(())
    }

    /// Revocation by the certificate's issuer. Takes effect immediately; the
    /// call is also queued so it lands in the chain history.
    pub async fn revoke(&self, id: &CertificateId, caller: &str) -> Result<(), LedgerError> {
        self.check_reachable().await?;
        let key = parse_id(id)?;
        {
            let mut state = self.state.write().await;
            let record = state.certificates.get_mut(&key).ok_or_else(|| not_found(id))?;
            if !record.issuer.eq_ignore_ascii_case(caller) {
                return Err(LedgerError::Rejected(format!(
                    "{} is not the issuer of certificate {}",
                    caller, id
                )));
            }
            record.revoked = true;
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let tx = LedgerTransaction::new(
            caller.to_string(),
            ContractCall::Revoke {
                certificate_id: id.to_string(),
            },
            nonce,
            self.clock.now(),
        );
        self.pending.write().await.push(tx);
        Ok(())
    }

    pub async fn verification_count(&self, id: &CertificateId) -> u64 {
        let Ok(key) = parse_id(id) else {
            return 0;
        };
        self.state
            .read()
            .await
            .verification_counts
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    pub async fn mine_pending_transactions(&self) -> usize {
        let pending = {
            let mut txs = self.pending.write().await;
            if txs.is_empty() {
                return 0;
            }
            std::mem::take(&mut *txs)
        };

        let (index, previous_hash) = {
            let chain = self.chain.read().await;
            chain
                .last()
                .map(|b| (b.index + 1, b.hash.clone()))
                .unwrap_or((0, "0".to_string()))
        };

        let now = self.clock.now();
        let now_secs = u64::try_from(now.timestamp()).unwrap_or(0);
        {
            let mut state = self.state.write().await;
            let mut faults = self.faults.write().await;
            for tx in &pending {
                let receipt = apply(&mut state, &mut faults, tx, index, now_secs);
                state.receipts.insert(tx.tx_hash.clone(), receipt);
            }
        }

        let mined = pending.len();
        let mut block = Block::new(index, now, pending, previous_hash);
        loop {
            let hash = self.calculate_hash(&block);
            if self.is_valid_hash(&hash) {
                block.hash = hash;
                break;
            }
            block.nonce += 1;
        }
        debug!("mined block {} with {} transactions", block.index, mined);

        self.chain.write().await.push(block);
        mined
    }

    fn calculate_hash(&self, block: &Block) -> String {
        let data = format!(
            "{}{}{}{}{}",
            block.index,
            block.timestamp,
            serde_json::to_string(&block.transactions).unwrap_or_default(),
            block.previous_hash,
            block.nonce
        );
        format!("{:x}", Sha256::digest(data.as_bytes()))
    }

    fn is_valid_hash(&self, hash: &str) -> bool {
        hash.starts_with(&"0".repeat(self.difficulty as usize))
    }

    async fn check_reachable(&self) -> Result<(), LedgerError> {
        if self.faults.read().await.unreachable {
            Err(LedgerError::Unreachable("dev ledger offline".to_string()))
        } else {
            Ok(())
        }
    }

    async fn submit(&self, call: ContractCall) -> Result<TxHandle, LedgerError> {
        self.check_reachable().await?;
        {
            let mut faults = self.faults.write().await;
            if std::mem::take(&mut faults.reject_next) {
                return Err(LedgerError::Rejected(format!(
                    "{} rejected by dev ledger",
                    call.name()
                )));
            }
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();
        let tx = LedgerTransaction::new(self.sender.clone(), call, nonce, now);
        let handle = TxHandle {
            hash: tx.tx_hash.clone(),
            submitted_at: now,
        };
        self.pending.write().await.push(tx);
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }
}

fn apply(
    state: &mut ContractState,
    faults: &mut Faults,
    tx: &LedgerTransaction,
    block_number: u64,
    now_secs: u64,
) -> TxReceipt {
    let reverted = |reason: &str| TxReceipt {
        transaction_hash: tx.tx_hash.clone(),
        block_number,
        status: TxStatus::Reverted,
        revert_reason: Some(reason.to_string()),
        events: vec![],
    };

    if std::mem::take(&mut faults.revert_next) {
        return reverted("execution reverted");
    }

    let mut events = match &tx.call {
        ContractCall::IssueCertificate {
            recipient,
            metadata_locator,
            expiry,
        } => {
            state.next_certificate_id += 1;
            let id = state.next_certificate_id;
            state.certificates.insert(
                id,
                CertificateRecord {
                    certificate_id: id.into(),
                    issuer: tx.sender.clone(),
                    recipient: recipient.clone(),
                    metadata_locator: metadata_locator.clone(),
                    issue_date: now_secs,
                    expiry_date: *expiry,
                    revoked: false,
                },
            );
            vec![
                LedgerEvent::new(CERTIFICATE_ISSUED)
                    .with_field("certificateId", id.to_string())
                    .with_field("issuer", tx.sender.clone())
                    .with_field("recipient", recipient.clone()),
            ]
        }
        ContractCall::RecordVerification { certificate_id } => {
            let key = match certificate_id.parse::<u64>() {
                Ok(key) if state.certificates.contains_key(&key) => key,
                _ => return reverted("unknown certificate"),
            };
            let count = state.verification_counts.entry(key).or_insert(0);
            *count += 1;
            vec![
                LedgerEvent::new(VERIFICATION_RECORDED)
                    .with_field("certificateId", certificate_id.clone())
                    .with_field("verifier", tx.sender.clone())
                    .with_field("count", *count),
            ]
        }
        ContractCall::Revoke { certificate_id } => {
            vec![LedgerEvent::new("CertificateRevoked").with_field("certificateId", certificate_id.clone())]
        }
    };

    if std::mem::take(&mut faults.omit_next_event) {
        events.clear();
    }
    if std::mem::take(&mut faults.duplicate_next_event) {
        if let Some(first) = events.first().cloned() {
            events.push(first);
        }
    }

    TxReceipt {
        transaction_hash: tx.tx_hash.clone(),
        block_number,
        status: TxStatus::Success,
        revert_reason: None,
        events,
    }
}

fn parse_id(id: &CertificateId) -> Result<u64, LedgerError> {
    id.as_str().parse().map_err(|_| not_found(id))
}

fn not_found(id: &CertificateId) -> LedgerError {
    LedgerError::NotFound {
        certificate_id: id.to_string(),
    }
}

#[async_trait]
impl LedgerClient for DevLedger {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        self.check_reachable().await?;
        Ok(self.chain_id)
    }

    async fn issue_certificate(
        &self,
        recipient: &str,
        metadata_locator: &str,
        expiry: u64,
    ) -> Result<TxHandle, LedgerError> {
        self.submit(ContractCall::IssueCertificate {
            recipient: recipient.to_string(),
            metadata_locator: metadata_locator.to_string(),
            expiry,
        })
        .await
    }

    async fn get_certificate(&self, id: &CertificateId) -> Result<CertificateRecord, LedgerError> {
        self.check_reachable().await?;
        let key = parse_id(id)?;
        self.state
            .read()
            .await
            .certificates
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn verify(&self, id: &CertificateId) -> Result<LedgerVerification, LedgerError> {
        self.check_reachable().await?;
        let key = parse_id(id)?;
        let state = self.state.read().await;
        let record = state.certificates.get(&key).ok_or_else(|| not_found(id))?;
        let authorized = state
            .authorized_issuers
            .contains(&record.issuer.to_ascii_lowercase());

        Ok(LedgerVerification {
            is_valid: authorized && !state.invalidated.contains(&key),
            issuer: record.issuer.clone(),
            issue_date: record.issue_date,
            expiry_date: record.expiry_date,
        })
    }

    async fn record_verification(&self, id: &CertificateId) -> Result<TxHandle, LedgerError> {
        self.submit(ContractCall::RecordVerification {
            certificate_id: id.to_string(),
        })
        .await
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, LedgerError> {
        self.check_reachable().await?;
        let stalled = self.faults.read().await.stalled;
        if self.auto_mine && !stalled {
            self.mine_pending_transactions().await;
        }
        Ok(self.state.read().await.receipts.get(hash).cloned())
    }

    async fn certificates_of(&self, recipient: &str) -> Result<Vec<CertificateId>, LedgerError> {
        self.check_reachable().await?;
        Ok(self
            .state
            .read()
            .await
            .certificates
            .values()
            .filter(|r| r.recipient.eq_ignore_ascii_case(recipient))
            .map(|r| r.certificate_id.clone())
            .collect())
    }
}
