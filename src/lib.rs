//! Issuance and verification of ledger-anchored certificates.
//!
//! Certificate metadata is published to a content-addressed storage network
//! first, then a reference to it is anchored on a smart-contract ledger.
//! Verification reconciles the on-chain record with whatever metadata the
//! storage backends can still serve.
//!
//! # Feature flags
//!
//! - **`testutil`**: exposes the `testutil` module, the store and ledger doubles used
//!   by the integration tests and benches.

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod metadata;
pub mod metrics;
pub mod network;
pub mod orchestrator;
pub mod storage;
#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{ErrorKind, OrchestratorError};
pub use ledger::{CertificateId, DevLedger, LedgerClient, RpcLedgerClient};
pub use metadata::{CertificateInput, CertificateMetadata, MetadataCodec};
pub use network::{NetworkSession, SessionManager};
pub use orchestrator::{
    AuditedVerification, CertificateOrchestrator, CertificateStatus, IssuanceFailure,
    IssuancePhase, IssuanceResult, RecordResult, VerificationResult,
};
pub use storage::{BackendKind, StorageLocator, StorageRouter};
