//! Error taxonomy shared by every component.
//!
//! Component errors (`StoreError`, `CodecError`, `LedgerError`) are
//! translated into [`OrchestratorError`] before they reach callers, so no
//! backend-specific type leaks past the orchestrator.

use thiserror::Error;

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Rejected before any network call.
    Input,
    /// Transport or availability failure; the caller may retry.
    Infrastructure,
    /// Corruption or version skew; never retried.
    Data,
    /// Expected outcome such as an unknown certificate id.
    Domain,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid input: {field} {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error("unsupported schema version {found} (supported up to {supported})")]
    UnsupportedSchemaVersion { found: String, supported: String },
}

impl CodecError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no metadata at {locator}")]
    NotFound { locator: String },

    #[error("{backend} store unavailable: {message}")]
    Unavailable { backend: String, message: String },

    #[error(transparent)]
    Malformed(#[from] CodecError),
}

impl StoreError {
    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    pub fn not_found(locator: impl Into<String>) -> Self {
        Self::NotFound {
            locator: locator.into(),
        }
    }

    /// Whether another attempt against the same endpoint could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::NotFound { .. })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("certificate {certificate_id} not found on ledger")]
    NotFound { certificate_id: String },

    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("transaction {transaction_hash} reverted: {reason}")]
    Reverted {
        transaction_hash: String,
        reason: String,
    },

    #[error("transaction {transaction_hash} not confirmed in time")]
    Timeout { transaction_hash: String },

    #[error("ledger rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("undecodable ledger response: {0}")]
    Decode(String),
}

/// Errors surfaced by [`CertificateOrchestrator`](crate::CertificateOrchestrator).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("all storage backends unavailable: {0}")]
    AllBackendsUnavailable(String),

    #[error("metadata could not be stored: {0}")]
    MetadataStoreFailed(String),

    #[error("ledger unreachable: {0}")]
    LedgerUnreachable(String),

    /// The ledger may or may not have accepted the transaction.
    #[error("submission outcome unknown: {0}")]
    SubmissionOutcomeUnknown(String),

    #[error("unusable ledger response: {0}")]
    LedgerResponseInvalid(String),

    #[error("transaction {transaction_hash} not confirmed before timeout")]
    ConfirmationTimeout { transaction_hash: String },

    #[error("issuance transaction failed: {reason}")]
    IssuanceTransactionFailed {
        transaction_hash: Option<String>,
        reason: String,
    },

    #[error("transaction {transaction_hash} confirmed without a single {event} event (found {found})")]
    IssuanceEventMissing {
        transaction_hash: String,
        event: &'static str,
        found: usize,
    },

    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error("unsupported schema version {found} (supported up to {supported})")]
    UnsupportedSchemaVersion { found: String, supported: String },

    #[error("metadata unretrievable: {0}")]
    MetadataUnretrievable(String),

    #[error("attached network {current} is not supported (expected {expected})")]
    UnsupportedNetwork { current: String, expected: String },

    #[error("certificate {0} not found")]
    NotFound(String),

    #[error("cancelled before submission")]
    Cancelled,

    #[error("stopped waiting for transaction {transaction_hash}; it may still confirm")]
    ConfirmationAbandoned { transaction_hash: String },
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::UnsupportedNetwork { .. } | Self::Cancelled => {
                ErrorKind::Input
            }
            Self::AllBackendsUnavailable(_)
            | Self::MetadataStoreFailed(_)
            | Self::LedgerUnreachable(_)
            | Self::SubmissionOutcomeUnknown(_)
            | Self::ConfirmationTimeout { .. }
            | Self::IssuanceTransactionFailed { .. }
            | Self::MetadataUnretrievable(_)
            | Self::ConfirmationAbandoned { .. } => ErrorKind::Infrastructure,
            Self::IssuanceEventMissing { .. }
            | Self::MalformedMetadata(_)
            | Self::UnsupportedSchemaVersion { .. }
            | Self::LedgerResponseInvalid(_) => ErrorKind::Data,
            Self::NotFound(_) => ErrorKind::Domain,
        }
    }

    /// Stable machine-readable code for the caller-facing result shape.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::AllBackendsUnavailable(_) => "ALL_BACKENDS_UNAVAILABLE",
            Self::MetadataStoreFailed(_) => "METADATA_STORE_FAILED",
            Self::LedgerUnreachable(_) => "LEDGER_UNREACHABLE",
            Self::SubmissionOutcomeUnknown(_) => "SUBMISSION_OUTCOME_UNKNOWN",
            Self::LedgerResponseInvalid(_) => "LEDGER_RESPONSE_INVALID",
            Self::ConfirmationTimeout { .. } => "CONFIRMATION_TIMEOUT",
            Self::IssuanceTransactionFailed { .. } => "ISSUANCE_TRANSACTION_FAILED",
            Self::IssuanceEventMissing { .. } => "ISSUANCE_EVENT_MISSING",
            Self::MalformedMetadata(_) => "MALFORMED_METADATA",
            Self::UnsupportedSchemaVersion { .. } => "UNSUPPORTED_SCHEMA_VERSION",
            Self::MetadataUnretrievable(_) => "METADATA_UNRETRIEVABLE",
            Self::UnsupportedNetwork { .. } => "UNSUPPORTED_NETWORK",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Cancelled => "CANCELLED",
            Self::ConfirmationAbandoned { .. } => "CONFIRMATION_ABANDONED",
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }
}

impl From<CodecError> for OrchestratorError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::InvalidInput { .. } => Self::InvalidInput(err.to_string()),
            CodecError::MalformedMetadata(message) => Self::MalformedMetadata(message),
            CodecError::UnsupportedSchemaVersion { found, supported } => {
                Self::UnsupportedSchemaVersion { found, supported }
            }
        }
    }
}
