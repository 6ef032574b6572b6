use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub tx_hash: String,
    pub sender: String,
    pub call: ContractCall,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContractCall {
    IssueCertificate {
        recipient: String,
        metadata_locator: String,
        expiry: u64,
    },
    RecordVerification {
        certificate_id: String,
    },
    Revoke {
        certificate_id: String,
    },
}

impl ContractCall {
    pub fn name(&self) -> &'static str {
        match self {
            ContractCall::IssueCertificate { .. } => "issueCertificate",
            ContractCall::RecordVerification { .. } => "recordVerification",
            ContractCall::Revoke { .. } => "revokeCertificate",
        }
    }
}

impl LedgerTransaction {
    /// `nonce` keeps hashes distinct for identical calls from one sender.
    pub fn new(sender: String, call: ContractCall, nonce: u64, timestamp: DateTime<Utc>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(sender.as_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.update(serde_json::to_vec(&call).unwrap_or_default());
        hasher.update(timestamp.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
        let tx_hash = format!("0x{}", hex::encode(hasher.finalize()));

        Self {
            tx_hash,
            sender,
            call,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_differ_by_nonce() {
        let call = ContractCall::RecordVerification {
            certificate_id: "1".into(),
        };
        let now = Utc::now();
        let a = LedgerTransaction::new("0xabc".into(), call.clone(), 0, now);
        let b = LedgerTransaction::new("0xabc".into(), call, 1, now);
        assert_ne!(a.tx_hash, b.tx_hash);
        assert!(a.tx_hash.starts_with("0x"));
        assert_eq!(a.tx_hash.len(), 66);
    }
}
