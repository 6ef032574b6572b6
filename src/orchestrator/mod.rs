//! Certificate issuance and verification.
//!
//! The orchestrator owns no mutable state of its own: each call carries its
//! own context, so concurrent issuances and verifications proceed without
//! coordination. Ledger writes are sequenced by the ledger itself.

pub mod issuance;
pub mod result;
pub mod status;
pub mod verification;

pub use issuance::{IssuanceFailure, IssuancePhase, Issued};
pub use result::{AuditedVerification, ErrorReport, IssuanceResult, RecordResult, VerificationResult};
pub use status::{CertificateStatus, derive_status};

use crate::clock::Clock;
use crate::config::{Config, ConfigError};
use crate::error::{LedgerError, OrchestratorError};
use crate::ledger::{LedgerClient, TxHandle, TxReceipt, wait_for_receipt};
use crate::metadata::MetadataCodec;
use crate::metrics::OrchestratorMetrics;
use crate::network::NetworkSession;
use crate::storage::StorageRouter;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct CertificateOrchestrator {
    codec: MetadataCodec,
    router: Arc<StorageRouter>,
    ledger: Arc<dyn LedgerClient>,
    session: Arc<dyn NetworkSession>,
    clock: Arc<dyn Clock>,
    confirmation_timeout: Duration,
    poll_interval: Duration,
    metrics: Arc<OrchestratorMetrics>,
}

impl CertificateOrchestrator {
    pub fn new(
        codec: MetadataCodec,
        router: Arc<StorageRouter>,
        ledger: Arc<dyn LedgerClient>,
        session: Arc<dyn NetworkSession>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec,
            router,
            ledger,
            session,
            clock,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            metrics: Arc::new(OrchestratorMetrics::new()),
        }
    }

    /// Validates `config`, builds its storage backends and wires them to the
    /// given ledger and session.
    pub async fn from_config(
        config: &Config,
        ledger: Arc<dyn LedgerClient>,
        session: Arc<dyn NetworkSession>,
        clock: Arc<dyn Clock>,
        metrics: Arc<OrchestratorMetrics>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let router = config.build_router(metrics.clone()).await?;
        let codec = MetadataCodec::new(
            clock.clone(),
            config.network.chain_id,
            config.network.contract_address.clone(),
        );

        Ok(Self::new(codec, Arc::new(router), ledger, session, clock)
            .with_confirmation_timeout(config.ledger.confirmation_timeout())
            .with_poll_interval(config.ledger.poll_interval())
            .with_metrics(metrics))
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<OrchestratorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<OrchestratorMetrics> {
        &self.metrics
    }

    pub fn router(&self) -> &Arc<StorageRouter> {
        &self.router
    }

    async fn ensure_supported_network(&self) -> Result<(), OrchestratorError> {
        if self.session.is_supported_network().await {
            return Ok(());
        }
        let current = self
            .session
            .current_network_id()
            .await
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".to_string());
        Err(OrchestratorError::UnsupportedNetwork {
            current,
            expected: self.session.target_network_id().to_string(),
        })
    }

    /// Waits for `handle` to be mined, bounded by the confirmation timeout.
    /// Cancellation stops the wait but not the transaction.
    async fn await_confirmation(
        &self,
        handle: &TxHandle,
        cancel: &mut Option<watch::Receiver<bool>>,
    ) -> Result<TxReceipt, OrchestratorError> {
        let wait = wait_for_receipt(
            self.ledger.as_ref(),
            handle,
            self.poll_interval,
            self.confirmation_timeout,
        );

        let receipt = tokio::select! {
            outcome = wait => outcome.map_err(|err| confirmation_error(handle, err))?,
            _ = issuance::cancelled(cancel) => {
                return Err(OrchestratorError::ConfirmationAbandoned {
                    transaction_hash: handle.hash.clone(),
                });
            }
        };
        debug!(
            "{} confirmed in block {}",
            receipt.transaction_hash, receipt.block_number
        );
        Ok(receipt)
    }
}

fn confirmation_error(handle: &TxHandle, err: LedgerError) -> OrchestratorError {
    match err {
        LedgerError::Timeout { transaction_hash } => {
            OrchestratorError::ConfirmationTimeout { transaction_hash }
        }
        LedgerError::Reverted {
            transaction_hash,
            reason,
        } => OrchestratorError::IssuanceTransactionFailed {
            transaction_hash: Some(transaction_hash),
            reason,
        },
        other => OrchestratorError::IssuanceTransactionFailed {
            transaction_hash: Some(handle.hash.clone()),
            reason: other.to_string(),
        },
    }
}

/// Reads `field` from the single `event` in `receipt`. Zero or several
/// matching events mean the contract does not behave as expected.
pub(crate) fn single_event_field(
    receipt: &TxReceipt,
    event: &'static str,
    field: &str,
) -> Result<String, OrchestratorError> {
    let values: Vec<String> = receipt
        .events_named(event)
        .filter_map(|e| e.field_string(field))
        .collect();

    match values.as_slice() {
        [value] => Ok(value.clone()),
        _ => Err(OrchestratorError::IssuanceEventMissing {
            transaction_hash: receipt.transaction_hash.clone(),
            event,
            found: values.len(),
        }),
    }
}

/// Maps a failed ledger read onto the caller taxonomy.
pub(crate) fn ledger_read_error(err: LedgerError) -> OrchestratorError {
    match err {
        LedgerError::NotFound { certificate_id } => OrchestratorError::NotFound(certificate_id),
        LedgerError::Decode(_) | LedgerError::Rpc { .. } => {
            OrchestratorError::LedgerResponseInvalid(err.to_string())
        }
        other => OrchestratorError::LedgerUnreachable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ledger::{CERTIFICATE_ISSUED, LedgerEvent, TxStatus};

    fn receipt(events: Vec<LedgerEvent>) -> TxReceipt {
        TxReceipt {
            transaction_hash: "0xabc".into(),
            block_number: 3,
            status: TxStatus::Success,
            revert_reason: None,
            events,
        }
    }

    #[test]
    fn exactly_one_event_is_required() {
        let one = receipt(vec![
            LedgerEvent::new("Transfer").with_field("certificateId", "1"),
            LedgerEvent::new(CERTIFICATE_ISSUED).with_field("certificateId", "7"),
        ]);
        assert_eq!(
            single_event_field(&one, CERTIFICATE_ISSUED, "certificateId").unwrap(),
            "7"
        );

        let none = receipt(vec![]);
        assert!(matches!(
            single_event_field(&none, CERTIFICATE_ISSUED, "certificateId"),
            Err(OrchestratorError::IssuanceEventMissing { found: 0, .. })
        ));

        let event = LedgerEvent::new(CERTIFICATE_ISSUED).with_field("certificateId", "7");
        let two = receipt(vec![event.clone(), event]);
        assert!(matches!(
            single_event_field(&two, CERTIFICATE_ISSUED, "certificateId"),
            Err(OrchestratorError::IssuanceEventMissing { found: 2, .. })
        ));
    }

    #[test]
    fn ledger_not_found_is_a_domain_outcome() {
        let err = ledger_read_error(LedgerError::NotFound {
            certificate_id: "4".into(),
        });
        assert_eq!(err, OrchestratorError::NotFound("4".into()));
        assert!(matches!(
            ledger_read_error(LedgerError::Unreachable("refused".into())),
            OrchestratorError::LedgerUnreachable(_)
        ));
    }

    #[test]
    fn garbled_ledger_reads_are_data_errors() {
        let err = ledger_read_error(LedgerError::Decode("missing field `issuer`".into()));
        assert_eq!(err.code(), "LEDGER_RESPONSE_INVALID");
        assert_eq!(err.kind(), ErrorKind::Data);

        let err = ledger_read_error(LedgerError::Rpc {
            code: -32602,
            message: "invalid params".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(!err.is_retryable());
    }

    #[test]
    fn confirmation_failures_keep_the_transaction_hash() {
        let handle = TxHandle::new("0xfeed", chrono::Utc::now());
        assert_eq!(
            confirmation_error(
                &handle,
                LedgerError::Timeout {
                    transaction_hash: "0xfeed".into()
                }
            )
            .code(),
            "CONFIRMATION_TIMEOUT"
        );
        assert_eq!(
            confirmation_error(
                &handle,
                LedgerError::Reverted {
                    transaction_hash: "0xfeed".into(),
                    reason: "unknown certificate".into(),
                }
            ),
            OrchestratorError::IssuanceTransactionFailed {
                transaction_hash: Some("0xfeed".into()),
                reason: "unknown certificate".into(),
            }
        );
    }
}
