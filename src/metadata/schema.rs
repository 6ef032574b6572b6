use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Version stamped on every document written by this crate, `major.minor`.
pub const SCHEMA_VERSION: &str = "1.0";

pub const RECIPIENT_PLACEHOLDER: &str = "Unnamed Recipient";
pub const TITLE_PLACEHOLDER: &str = "Untitled Credential";
pub const ISSUER_PLACEHOLDER: &str = "Unknown Issuer";
pub const DEFAULT_CREDENTIAL_TYPE: &str = "certificate";

/// Off-chain certificate document. Immutable once stored: any change
/// produces a new document under a new locator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateMetadata {
    pub schema_version: String,
    pub recipient: Recipient,
    pub credential: Credential,
    pub issuer: Issuer,
    #[serde(default)]
    pub additional: BTreeMap<String, Value>,
    pub verification: VerificationInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub name: String,
    pub wallet_address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub issue_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub credential_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issuer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    pub wallet_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_locator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationInfo {
    pub ledger_network_id: u64,
    pub contract_address: String,
}

/// Raw issuance request as handed over by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CertificateInput {
    pub recipient_name: Option<String>,
    pub recipient_wallet: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub issue_date: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub credential_type: Option<String>,
    pub issuer_name: Option<String>,
    pub issuer_website: Option<String>,
    pub issuer_wallet: String,
    pub issuer_logo_locator: Option<String>,
    pub additional: BTreeMap<String, Value>,
}

impl CertificateInput {
    pub fn new(recipient_wallet: impl Into<String>, issuer_wallet: impl Into<String>) -> Self {
        Self {
            recipient_wallet: recipient_wallet.into(),
            issuer_wallet: issuer_wallet.into(),
            ..Self::default()
        }
    }

    pub fn with_recipient_name(mut self, name: impl Into<String>) -> Self {
        self.recipient_name = Some(name.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry);
        self
    }

    pub fn with_issuer_name(mut self, name: impl Into<String>) -> Self {
        self.issuer_name = Some(name.into());
        self
    }
}
