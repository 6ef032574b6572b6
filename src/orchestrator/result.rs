//! Caller-facing result shapes.
//!
//! Every public orchestrator operation returns one of these instead of a
//! `Result`, so presentation code can render success and failure uniformly.

use super::issuance::{IssuanceFailure, IssuancePhase, Issued};
use super::status::CertificateStatus;
use crate::error::{ErrorKind, OrchestratorError};
use crate::ledger::{CertificateId, CertificateRecord};
use crate::metadata::CertificateMetadata;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<IssuancePhase>,
    /// Whether repeating the call cannot duplicate a ledger write.
    pub retry_safe: bool,
}

impl ErrorReport {
    pub fn new(error: &OrchestratorError, phase: Option<IssuancePhase>, retry_safe: bool) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            kind: error.kind(),
            phase,
            retry_safe,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<CertificateId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl From<Issued> for IssuanceResult {
    fn from(issued: Issued) -> Self {
        Self {
            success: true,
            certificate_id: Some(issued.certificate_id),
            metadata_locator: Some(issued.metadata_locator.to_string()),
            transaction_hash: Some(issued.transaction_hash),
            error: None,
        }
    }
}

impl From<IssuanceFailure> for IssuanceResult {
    fn from(failure: IssuanceFailure) -> Self {
        let report = ErrorReport::new(&failure.error, Some(failure.phase), failure.retry_safe());
        Self {
            success: false,
            certificate_id: None,
            // kept so the caller can look the certificate up by recipient later
            metadata_locator: failure.metadata_locator.map(|l| l.to_string()),
            transaction_hash: failure.transaction_hash,
            error: Some(report),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    /// False only when the check itself could not be carried out.
    pub success: bool,
    pub certificate_id: CertificateId,
    /// True exactly when `status` is `valid`.
    pub is_valid: bool,
    /// Raw validity flag reported by the contract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CertificateStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CertificateRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CertificateMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl VerificationResult {
    pub fn failed(
        certificate_id: CertificateId,
        error: &OrchestratorError,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            success: false,
            certificate_id,
            is_valid: false,
            ledger_valid: None,
            status: None,
            record: None,
            metadata: None,
            warnings: vec![],
            checked_at,
            error: Some(ErrorReport::new(error, None, true)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResult {
    pub success: bool,
    pub certificate_id: CertificateId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

/// A verification and its audit record. The two succeed or fail
/// independently.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditedVerification {
    pub verification: VerificationResult,
    /// Absent when the verification itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<RecordResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BackendKind, StorageLocator};
    use serde_json::json;

    #[test]
    fn failed_issuance_names_phase_and_retry_safety() {
        let failure = IssuanceFailure {
            phase: IssuancePhase::AwaitingConfirmation,
            error: OrchestratorError::ConfirmationTimeout {
                transaction_hash: "0xfeed".into(),
            },
            metadata_locator: Some(StorageLocator::new(BackendKind::Arweave, "tx1")),
            transaction_hash: Some("0xfeed".into()),
        };
        let value = serde_json::to_value(IssuanceResult::from(failure)).unwrap();
        assert_eq!(
            value,
            json!({
                "success": false,
                "metadataLocator": "ar://tx1",
                "transactionHash": "0xfeed",
                "error": {
                    "code": "CONFIRMATION_TIMEOUT",
                    "message": "transaction 0xfeed not confirmed before timeout",
                    "kind": "infrastructure",
                    "phase": "awaiting_confirmation",
                    "retrySafe": false
                }
            })
        );
    }

    #[test]
    fn not_found_verification_is_unsuccessful_and_invalid() {
        let checked_at = Utc::now();
        let result = VerificationResult::failed(
            CertificateId::from(9u64),
            &OrchestratorError::NotFound("9".into()),
            checked_at,
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["isValid"], json!(false));
        assert_eq!(value["error"]["code"], json!("NOT_FOUND"));
        assert!(value.get("metadata").is_none());
    }
}
