use super::types::{
    CertificateId, CertificateRecord, LedgerVerification, TxHandle, TxReceipt, TxStatus,
};
use crate::error::LedgerError;
use async_trait::async_trait;
use log::debug;
use std::time::Duration;

/// Typed view of the certificate contract on a remote ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, LedgerError>;

    /// Submits an issuance; `expiry` is epoch seconds, 0 for none.
    async fn issue_certificate(
        &self,
        recipient: &str,
        metadata_locator: &str,
        expiry: u64,
    ) -> Result<TxHandle, LedgerError>;

    async fn get_certificate(&self, id: &CertificateId) -> Result<CertificateRecord, LedgerError>;

    async fn verify(&self, id: &CertificateId) -> Result<LedgerVerification, LedgerError>;

    async fn record_verification(&self, id: &CertificateId) -> Result<TxHandle, LedgerError>;

    /// `None` while the transaction is still pending.
    async fn transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, LedgerError>;

    async fn certificates_of(&self, recipient: &str) -> Result<Vec<CertificateId>, LedgerError>;
}

/// Polls until the ledger reports a receipt, for at most `timeout`.
///
/// A receipt with a reverted status comes back as [`LedgerError::Reverted`];
/// running out of time as [`LedgerError::Timeout`].
pub async fn wait_for_receipt(
    client: &dyn LedgerClient,
    handle: &TxHandle,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<TxReceipt, LedgerError> {
    let receipt = tokio::time::timeout(timeout, poll_receipt(client, handle, poll_interval))
        .await
        .map_err(|_| LedgerError::Timeout {
            transaction_hash: handle.hash.clone(),
        })??;

    if receipt.status == TxStatus::Reverted {
        return Err(LedgerError::Reverted {
            transaction_hash: receipt.transaction_hash,
            reason: receipt
                .revert_reason
                .unwrap_or_else(|| "reverted".to_string()),
        });
    }
    Ok(receipt)
}

async fn poll_receipt(
    client: &dyn LedgerClient,
    handle: &TxHandle,
    poll_interval: Duration,
) -> Result<TxReceipt, LedgerError> {
    loop {
        match client.transaction_receipt(&handle.hash).await {
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => {}
            // the node may come back before the caller's deadline
            Err(LedgerError::Unreachable(reason)) => {
                debug!("receipt poll for {} failed: {}", handle.hash, reason)
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(poll_interval).await;
    }
}
