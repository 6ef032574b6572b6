use super::{CertificateOrchestrator, single_event_field};
use super::result::IssuanceResult;
use crate::error::{LedgerError, OrchestratorError};
use crate::ledger::types::to_epoch;
use crate::ledger::{CERTIFICATE_ISSUED, CertificateId};
use crate::metadata::CertificateInput;
use crate::storage::StorageLocator;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use tokio::sync::watch;
use tokio::time::Instant;

/// Steps of one issuance, in order. Metadata storage always completes before
/// anything is submitted to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssuancePhase {
    Formatting,
    StoringMetadata,
    SubmittingTransaction,
    AwaitingConfirmation,
    ExtractingId,
    Done,
}

impl IssuancePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuancePhase::Formatting => "formatting",
            IssuancePhase::StoringMetadata => "storing_metadata",
            IssuancePhase::SubmittingTransaction => "submitting_transaction",
            IssuancePhase::AwaitingConfirmation => "awaiting_confirmation",
            IssuancePhase::ExtractingId => "extracting_id",
            IssuancePhase::Done => "done",
        }
    }
}

impl fmt::Display for IssuancePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issued {
    pub certificate_id: CertificateId,
    pub metadata_locator: StorageLocator,
    pub transaction_hash: String,
    pub block_number: u64,
}

/// A failed issuance and how far it got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceFailure {
    pub phase: IssuancePhase,
    pub error: OrchestratorError,
    /// Set once metadata has been stored; the document is orphaned if the
    /// ledger write never lands.
    pub metadata_locator: Option<StorageLocator>,
    pub transaction_hash: Option<String>,
}

impl IssuanceFailure {
    /// True when nothing can have reached the ledger, so repeating the
    /// issuance cannot produce a duplicate certificate.
    pub fn retry_safe(&self) -> bool {
        retry_safe_after(self.phase, &self.error)
    }
}

/// Retry policy shared by every ledger write: safe until a transaction may
/// exist, unsafe from then on.
pub(crate) fn retry_safe_after(phase: IssuancePhase, err: &OrchestratorError) -> bool {
    match phase {
        IssuancePhase::Formatting | IssuancePhase::StoringMetadata => true,
        IssuancePhase::SubmittingTransaction => submission_retry_safe(err),
        _ => false,
    }
}

#[derive(Default)]
struct Progress {
    phase: Option<IssuancePhase>,
    metadata_locator: Option<StorageLocator>,
    transaction_hash: Option<String>,
}

impl Progress {
    fn enter(&mut self, phase: IssuancePhase) {
        debug!("issuance -> {}", phase);
        self.phase = Some(phase);
    }
}

impl CertificateOrchestrator {
    pub async fn issue_certificate(&self, input: &CertificateInput) -> IssuanceResult {
        self.issue_certificate_with_cancel(input, None).await
    }

    /// Issuance that stops early once `cancel` flips to `true`. Before
    /// submission this aborts with `Cancelled`; after submission the
    /// transaction is left to confirm and the call returns
    /// `ConfirmationAbandoned` with its hash.
    pub async fn issue_certificate_with_cancel(
        &self,
        input: &CertificateInput,
        cancel: Option<watch::Receiver<bool>>,
    ) -> IssuanceResult {
        match self.try_issue(input, cancel).await {
            Ok(issued) => issued.into(),
            Err(failure) => failure.into(),
        }
    }

    pub async fn try_issue(
        &self,
        input: &CertificateInput,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<Issued, IssuanceFailure> {
        let started = Instant::now();
        self.metrics.record_issuance_started();

        let mut progress = Progress::default();
        match self.run_issuance(input, cancel, &mut progress).await {
            Ok(issued) => {
                self.metrics
                    .record_issuance_succeeded(started.elapsed().as_millis());
                info!(
                    "issued certificate {} (metadata {}, tx {})",
                    issued.certificate_id, issued.metadata_locator, issued.transaction_hash
                );
                Ok(issued)
            }
            Err(err) => {
                let failure = IssuanceFailure {
                    phase: progress.phase.unwrap_or(IssuancePhase::Formatting),
                    error: err,
                    metadata_locator: progress.metadata_locator,
                    transaction_hash: progress.transaction_hash,
                };
                self.metrics.record_issuance_failed(failure.phase.as_str());
                if failure.retry_safe() {
                    warn!("issuance failed in {}: {}", failure.phase, failure.error);
                } else {
                    error!(
                        "issuance failed in {} after submission of {}: {}",
                        failure.phase,
                        failure.transaction_hash.as_deref().unwrap_or("<unknown>"),
                        failure.error
                    );
                }
                Err(failure)
            }
        }
    }

    async fn run_issuance(
        &self,
        input: &CertificateInput,
        mut cancel: Option<watch::Receiver<bool>>,
        progress: &mut Progress,
    ) -> Result<Issued, OrchestratorError> {
        progress.enter(IssuancePhase::Formatting);
        let metadata = self.codec.encode(input)?;
        self.ensure_supported_network().await?;

        progress.enter(IssuancePhase::StoringMetadata);
        let locator = tokio::select! {
            stored = self.router.put(&metadata) => {
                stored.map_err(|e| OrchestratorError::MetadataStoreFailed(e.to_string()))?
            }
            _ = cancelled(&mut cancel) => return Err(OrchestratorError::Cancelled),
        };
        progress.metadata_locator = Some(locator.clone());

        progress.enter(IssuancePhase::SubmittingTransaction);
        if is_cancelled(&cancel) {
            return Err(OrchestratorError::Cancelled);
        }
        let handle = self
            .ledger
            .issue_certificate(
                &metadata.recipient.wallet_address,
                &locator.to_string(),
                to_epoch(metadata.credential.expiry_date),
            )
            .await
            .map_err(submission_error)?;
        progress.transaction_hash = Some(handle.hash.clone());

        progress.enter(IssuancePhase::AwaitingConfirmation);
        let receipt = self.await_confirmation(&handle, &mut cancel).await?;

        progress.enter(IssuancePhase::ExtractingId);
        let id = single_event_field(&receipt, CERTIFICATE_ISSUED, "certificateId")?;

        progress.enter(IssuancePhase::Done);
        Ok(Issued {
            certificate_id: CertificateId::new(id),
            metadata_locator: locator,
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
        })
    }
}

/// Maps a failed submission. Only an explicit refusal proves the ledger
/// did not take the transaction; an unreadable answer may hide an accepted
/// one.
pub(crate) fn submission_error(err: LedgerError) -> OrchestratorError {
    match err {
        LedgerError::Unreachable(reason) => OrchestratorError::LedgerUnreachable(reason),
        LedgerError::Rejected(reason) => OrchestratorError::IssuanceTransactionFailed {
            transaction_hash: None,
            reason,
        },
        other => OrchestratorError::SubmissionOutcomeUnknown(other.to_string()),
    }
}

/// Whether a submission that failed with `err` left the ledger untouched.
pub(crate) fn submission_retry_safe(err: &OrchestratorError) -> bool {
    matches!(
        err,
        OrchestratorError::Cancelled
            | OrchestratorError::IssuanceTransactionFailed {
                transaction_hash: None,
                ..
            }
    )
}

pub(crate) fn is_cancelled(cancel: &Option<watch::Receiver<bool>>) -> bool {
    cancel.as_ref().is_some_and(|rx| *rx.borrow())
}

/// Resolves once cancellation is requested; never resolves without a
/// receiver or after the sender is dropped uncancelled.
pub(crate) async fn cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = cancel {
        if rx.wait_for(|requested| *requested).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BackendKind;

    fn failure(phase: IssuancePhase, error: OrchestratorError) -> IssuanceFailure {
        IssuanceFailure {
            phase,
            error,
            metadata_locator: Some(StorageLocator::new(BackendKind::Arweave, "x")),
            transaction_hash: None,
        }
    }

    #[test]
    fn retry_is_safe_only_before_the_ledger_saw_anything() {
        assert!(
            failure(
                IssuancePhase::StoringMetadata,
                OrchestratorError::MetadataStoreFailed("down".into())
            )
            .retry_safe()
        );
        assert!(
            failure(
                IssuancePhase::SubmittingTransaction,
                OrchestratorError::IssuanceTransactionFailed {
                    transaction_hash: None,
                    reason: "rejected".into()
                }
            )
            .retry_safe()
        );
        assert!(
            !failure(
                IssuancePhase::SubmittingTransaction,
                OrchestratorError::LedgerUnreachable("timeout".into())
            )
            .retry_safe()
        );
        assert!(
            !failure(
                IssuancePhase::AwaitingConfirmation,
                OrchestratorError::ConfirmationTimeout {
                    transaction_hash: "0x1".into()
                }
            )
            .retry_safe()
        );
    }

    #[test]
    fn only_explicit_refusals_are_safe_to_resubmit() {
        let refused = submission_error(LedgerError::Rejected("nonce too low".into()));
        assert!(submission_retry_safe(&refused));

        let garbled = submission_error(LedgerError::Decode("expected a string".into()));
        assert_eq!(garbled.code(), "SUBMISSION_OUTCOME_UNKNOWN");
        assert!(!submission_retry_safe(&garbled));
        assert!(!failure(IssuancePhase::SubmittingTransaction, garbled).retry_safe());

        let remote = submission_error(LedgerError::Rpc {
            code: -32603,
            message: "internal error".into(),
        });
        assert!(!submission_retry_safe(&remote));

        let down = submission_error(LedgerError::Unreachable("refused".into()));
        assert!(!submission_retry_safe(&down));
    }

    #[test]
    fn phases_are_ordered() {
        assert!(IssuancePhase::StoringMetadata < IssuancePhase::SubmittingTransaction);
        assert_eq!(IssuancePhase::ExtractingId.as_str(), "extracting_id");
    }

    #[tokio::test]
    async fn cancellation_signal_is_observed() {
        let (tx, rx) = watch::channel(false);
        let mut cancel = Some(rx);
        assert!(!is_cancelled(&cancel));
        tx.send(true).unwrap();
        assert!(is_cancelled(&cancel));
        cancelled(&mut cancel).await;
    }
}
