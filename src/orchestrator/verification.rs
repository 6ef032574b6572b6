use super::issuance::{IssuancePhase, retry_safe_after, submission_error};
use super::result::{AuditedVerification, ErrorReport, RecordResult, VerificationResult};
use super::status::derive_status;
use super::{CertificateOrchestrator, ledger_read_error, single_event_field};
use crate::error::OrchestratorError;
use crate::ledger::{CertificateId, CertificateRecord, VERIFICATION_RECORDED};
use crate::metadata::{CertificateMetadata, is_ledger_address};
use crate::storage::StorageLocator;
use log::{debug, info, warn};

/// Warning code for stored metadata that contradicts its ledger record.
pub const METADATA_MISMATCH: &str = "METADATA_MISMATCH";

impl CertificateOrchestrator {
    /// Reads the certificate from the ledger, attaches whatever metadata
    /// the storage backends can serve and derives its status. Read-only;
    /// dropping the returned future abandons the check without side effects.
    pub async fn verify_certificate(&self, id: &CertificateId) -> VerificationResult {
        let checked_at = self.clock.now();

        let (record, verdict) = tokio::join!(self.ledger.get_certificate(id), self.ledger.verify(id));
        let (record, verdict) = match (record, verdict) {
            (Ok(record), Ok(verdict)) => (record, verdict),
            (Err(err), _) | (_, Err(err)) => {
                let err = ledger_read_error(err);
                match &err {
                    OrchestratorError::NotFound(_) => {
                        self.metrics.record_verification(None);
                        debug!("certificate {} not found", id);
                    }
                    other => warn!("verification of {} failed: {}", id, other),
                }
                return VerificationResult::failed(id.clone(), &err, checked_at);
            }
        };

        let mut warnings = Vec::new();
        let metadata = match self.load_metadata(&record).await {
            Ok(metadata) => {
                for mismatch in self.mismatches(&metadata, &record) {
                    warn!("certificate {} metadata disagrees with ledger: {}", id, mismatch);
                    warnings.push(format!("{}: {}", METADATA_MISMATCH, mismatch));
                }
                Some(metadata)
            }
            Err(err) => {
                self.metrics.record_metadata_unretrievable();
                warn!(
                    "certificate {} verified without metadata from {}: {}",
                    id, record.metadata_locator, err
                );
                warnings.push(format!("{}: {}", err.code(), err));
                None
            }
        };

        let status = derive_status(record.revoked, verdict.is_valid, record.expires_at(), checked_at);
        self.metrics.record_verification(Some(status.as_str()));
        debug!("certificate {} is {}", id, status);

        VerificationResult {
            success: true,
            certificate_id: id.clone(),
            is_valid: status.is_valid(),
            ledger_valid: Some(verdict.is_valid),
            status: Some(status),
            record: Some(record),
            metadata,
            warnings,
            checked_at,
            error: None,
        }
    }

    async fn load_metadata(
        &self,
        record: &CertificateRecord,
    ) -> Result<CertificateMetadata, OrchestratorError> {
        let locator: StorageLocator = record.metadata_locator.parse().map_err(|e| {
            OrchestratorError::MetadataUnretrievable(format!(
                "{}: {}",
                record.metadata_locator, e
            ))
        })?;
        self.router.get(&locator).await
    }

    /// Fields of the stored document that contradict the ledger record or
    /// the contract this orchestrator is bound to.
    fn mismatches(&self, metadata: &CertificateMetadata, record: &CertificateRecord) -> Vec<String> {
        let mut found = Vec::new();
        let mut compare = |field: &str, stored: &str, anchored: &str| {
            if !stored.eq_ignore_ascii_case(anchored) {
                found.push(format!("{} is {} but the ledger has {}", field, stored, anchored));
            }
        };
        compare(
            "recipient.walletAddress",
            &metadata.recipient.wallet_address,
            &record.recipient,
        );
        compare("issuer.walletAddress", &metadata.issuer.wallet_address, &record.issuer);
        compare(
            "verification.contractAddress",
            &metadata.verification.contract_address,
            self.codec.contract_address(),
        );
        compare(
            "verification.ledgerNetworkId",
            &metadata.verification.ledger_network_id.to_string(),
            &self.codec.network_id().to_string(),
        );
        found
    }

    /// Logs on the ledger that `id` was checked. Independent of any
    /// verification outcome and of the storage backends.
    pub async fn record_verification(&self, id: &CertificateId) -> RecordResult {
        let mut transaction_hash = None;
        let mut phase = IssuancePhase::Formatting;
        let outcome = self.run_record(id, &mut transaction_hash, &mut phase).await;
        self.metrics.record_audit(outcome.is_ok());

        match outcome {
            Ok(block_number) => {
                info!("verification of {} recorded in block {}", id, block_number);
                RecordResult {
                    success: true,
                    certificate_id: id.clone(),
                    transaction_hash,
                    block_number: Some(block_number),
                    error: None,
                }
            }
            Err(err) => {
                warn!("recording verification of {} failed in {}: {}", id, phase, err);
                let retry_safe = retry_safe_after(phase, &err);
                RecordResult {
                    success: false,
                    certificate_id: id.clone(),
                    transaction_hash,
                    block_number: None,
                    error: Some(ErrorReport::new(&err, Some(phase), retry_safe)),
                }
            }
        }
    }

    async fn run_record(
        &self,
        id: &CertificateId,
        transaction_hash: &mut Option<String>,
        phase: &mut IssuancePhase,
    ) -> Result<u64, OrchestratorError> {
        self.ensure_supported_network().await?;

        *phase = IssuancePhase::SubmittingTransaction;
        let handle = self
            .ledger
            .record_verification(id)
            .await
            .map_err(submission_error)?;
        *transaction_hash = Some(handle.hash.clone());

        *phase = IssuancePhase::AwaitingConfirmation;
        let receipt = self.await_confirmation(&handle, &mut None).await?;
        *phase = IssuancePhase::ExtractingId;
        let recorded = single_event_field(&receipt, VERIFICATION_RECORDED, "certificateId")?;
        if recorded != id.as_str() {
            return Err(OrchestratorError::IssuanceEventMissing {
                transaction_hash: receipt.transaction_hash,
                event: VERIFICATION_RECORDED,
                found: 0,
            });
        }
        Ok(receipt.block_number)
    }

    /// Verifies `id` and, if the certificate exists, records the check.
    pub async fn verify_and_record(&self, id: &CertificateId) -> AuditedVerification {
        let verification = self.verify_certificate(id).await;
        let record = if verification.success {
            Some(self.record_verification(id).await)
        } else {
            None
        };
        AuditedVerification {
            verification,
            record,
        }
    }

    /// Certificates anchored for `recipient`, oldest first.
    pub async fn find_certificates_by_recipient(
        &self,
        recipient: &str,
    ) -> Result<Vec<CertificateId>, OrchestratorError> {
        if !is_ledger_address(recipient) {
            return Err(OrchestratorError::InvalidInput(format!(
                "'{}' is not a ledger address",
                recipient
            )));
        }
        self.ledger
            .certificates_of(recipient)
            .await
            .map_err(ledger_read_error)
    }

    /// Looks for the certificate whose ledger record points at `locator`.
    /// Used after a confirmation timeout, when the transaction may have
    /// landed regardless.
    pub async fn find_issued_certificate(
        &self,
        recipient: &str,
        locator: &StorageLocator,
    ) -> Result<Option<CertificateRecord>, OrchestratorError> {
        let wanted = locator.to_string();
        for id in self.find_certificates_by_recipient(recipient).await? {
            let record = self.ledger.get_certificate(&id).await.map_err(ledger_read_error)?;
            if record.metadata_locator == wanted {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}
