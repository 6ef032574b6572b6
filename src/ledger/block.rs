use super::transaction::LedgerTransaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<LedgerTransaction>,
    pub previous_hash: String,
    pub hash: String,
    pub nonce: u64,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: DateTime<Utc>,
        transactions: Vec<LedgerTransaction>,
        previous_hash: String,
    ) -> Self {
        Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            hash: String::new(),
            nonce: 0,
        }
    }

    pub fn genesis(timestamp: DateTime<Utc>) -> Self {
        Self {
            index: 0,
            timestamp,
            transactions: vec![],
            previous_hash: "0".to_string(),
            hash: "genesis_hash".to_string(),
            nonce: 0,
        }
    }
}
