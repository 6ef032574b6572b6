pub mod codec;
pub mod schema;

pub use codec::{MetadataCodec, canonical_bytes, is_ledger_address};
pub use schema::{
    CertificateInput, CertificateMetadata, Credential, Issuer, Recipient, VerificationInfo,
    RECIPIENT_PLACEHOLDER, SCHEMA_VERSION,
};
