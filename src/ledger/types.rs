use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const CERTIFICATE_ISSUED: &str = "CertificateIssued";
pub const VERIFICATION_RECORDED: &str = "VerificationRecorded";

/// Identifier assigned by the ledger when the issuing transaction confirms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(pub String);

impl CertificateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CertificateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for CertificateId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for CertificateId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// On-chain anchor of one issued certificate. Dates are seconds since the
/// epoch; an expiry of 0 means the certificate never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    pub certificate_id: CertificateId,
    pub issuer: String,
    pub recipient: String,
    pub metadata_locator: String,
    pub issue_date: u64,
    #[serde(default)]
    pub expiry_date: u64,
    #[serde(default)]
    pub revoked: bool,
}

impl CertificateRecord {
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        from_epoch(self.issue_date)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        from_epoch(self.expiry_date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerVerification {
    pub is_valid: bool,
    pub issuer: String,
    pub issue_date: u64,
    #[serde(default)]
    pub expiry_date: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHandle {
    pub hash: String,
    pub submitted_at: DateTime<Utc>,
}

impl TxHandle {
    pub fn new(hash: impl Into<String>, submitted_at: DateTime<Utc>) -> Self {
        Self {
            hash: hash.into(),
            submitted_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl LedgerEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Reads a field that may be encoded as a JSON string or number.
    pub fn field_string(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub status: TxStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    #[serde(default)]
    pub events: Vec<LedgerEvent>,
}

impl TxReceipt {
    pub fn events_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a LedgerEvent> + 'a {
        self.events.iter().filter(move |e| e.name == name)
    }
}

pub fn from_epoch(secs: u64) -> Option<DateTime<Utc>> {
    if secs == 0 {
        return None;
    }
    Utc.timestamp_opt(i64::try_from(secs).ok()?, 0).single()
}

pub fn to_epoch(instant: Option<DateTime<Utc>>) -> u64 {
    instant
        .map(|t| u64::try_from(t.timestamp()).unwrap_or(0))
        .unwrap_or(0)
}
