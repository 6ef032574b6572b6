use crate::error::LedgerError;
use crate::ledger::LedgerClient;
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Parameters a wallet needs to attach to a ledger network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub contract_address: String,
    #[serde(default)]
    pub explorer_url: Option<String>,
    #[serde(default = "default_currency")]
    pub currency_symbol: String,
}

fn default_currency() -> String {
    "ETH".to_string()
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("network {0} is not known to this session")]
    UnknownNetwork(u64),

    #[error("invalid network parameters: {0}")]
    InvalidNetwork(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// What the orchestrator needs to know about the caller's ledger attachment.
#[async_trait]
pub trait NetworkSession: Send + Sync {
    async fn current_network_id(&self) -> Option<u64>;

    fn target_network_id(&self) -> u64;

    async fn is_supported_network(&self) -> bool {
        self.current_network_id().await == Some(self.target_network_id())
    }
}

/// Tracks which network the session is attached to.
pub struct SessionManager {
    target: NetworkParams,
    known: RwLock<BTreeMap<u64, NetworkParams>>,
    current: RwLock<Option<u64>>,
    ledger: Option<Arc<dyn LedgerClient>>,
}

impl SessionManager {
    pub fn new(target: NetworkParams) -> Self {
        let mut known = BTreeMap::new();
        known.insert(target.chain_id, target.clone());
        Self {
            target,
            known: RwLock::new(known),
            current: RwLock::new(None),
            ledger: None,
        }
    }

    /// Session whose attachment is read from `ledger` on [`refresh`](Self::refresh).
    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerClient>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn target(&self) -> &NetworkParams {
        &self.target
    }

    /// Records the chain the wallet reports as attached.
    pub async fn attach(&self, chain_id: u64) {
        *self.current.write().await = Some(chain_id);
        if chain_id != self.target.chain_id {
            warn!(
                "attached to network {} but {} ({}) is required",
                chain_id, self.target.name, self.target.chain_id
            );
        }
    }

    pub async fn detach(&self) {
        *self.current.write().await = None;
    }

    pub async fn refresh(&self) -> Result<Option<u64>, SessionError> {
        let Some(ledger) = &self.ledger else {
            return Ok(*self.current.read().await);
        };
        let chain_id = ledger.chain_id().await?;
        self.attach(chain_id).await;
        Ok(Some(chain_id))
    }

    pub async fn switch_network(&self, chain_id: u64) -> Result<NetworkParams, SessionError> {
        let params = self
            .known
            .read()
            .await
            .get(&chain_id)
            .cloned()
            .ok_or(SessionError::UnknownNetwork(chain_id))?;
        info!("switching session to {} ({})", params.name, chain_id);
        self.attach(chain_id).await;
        Ok(params)
    }

    pub async fn add_network(&self, params: NetworkParams) -> Result<(), SessionError> {
        if params.chain_id == 0 {
            return Err(SessionError::InvalidNetwork("chain id 0".to_string()));
        }
        if params.rpc_url.trim().is_empty() {
            return Err(SessionError::InvalidNetwork(format!(
                "{} has no rpc url",
                params.name
            )));
        }
        self.known.write().await.insert(params.chain_id, params);
        Ok(())
    }

    pub async fn known_networks(&self) -> Vec<NetworkParams> {
        self.known.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl NetworkSession for SessionManager {
    async fn current_network_id(&self) -> Option<u64> {
        *self.current.read().await
    }

    fn target_network_id(&self) -> u64 {
        self.target.chain_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::ledger::DevLedger;

    fn params(chain_id: u64, name: &str) -> NetworkParams {
        NetworkParams {
            chain_id,
            name: name.to_string(),
            rpc_url: format!("https://rpc.{}.example", name),
            contract_address: "0x3333333333333333333333333333333333333333".to_string(),
            explorer_url: None,
            currency_symbol: "POL".to_string(),
        }
    }

    #[tokio::test]
    async fn unattached_session_is_unsupported() {
        let session = SessionManager::new(params(80002, "amoy"));
        assert_eq!(session.current_network_id().await, None);
        assert!(!session.is_supported_network().await);
    }

    #[tokio::test]
    async fn switching_requires_a_known_network() {
        let session = SessionManager::new(params(80002, "amoy"));
        session.attach(1).await;
        assert!(!session.is_supported_network().await);

        assert_eq!(
            session.switch_network(137).await,
            Err(SessionError::UnknownNetwork(137))
        );
        session.add_network(params(137, "polygon")).await.unwrap();
        session.switch_network(137).await.unwrap();
        assert_eq!(session.current_network_id().await, Some(137));

        session.switch_network(80002).await.unwrap();
        assert!(session.is_supported_network().await);
        assert_eq!(session.known_networks().await.len(), 2);
    }

    #[tokio::test]
    async fn invalid_networks_are_refused() {
        let session = SessionManager::new(params(80002, "amoy"));
        assert!(session.add_network(params(0, "zero")).await.is_err());
        let mut no_rpc = params(5, "nowhere");
        no_rpc.rpc_url.clear();
        assert!(session.add_network(no_rpc).await.is_err());
    }

    #[tokio::test]
    async fn refresh_reads_the_ledger_chain_id() {
        let ledger = Arc::new(DevLedger::new(
            1337,
            "0x2222222222222222222222222222222222222222",
            Arc::new(SystemClock),
        ));
        let session = SessionManager::new(params(1337, "devnet")).with_ledger(ledger.clone());
        assert_eq!(session.refresh().await.unwrap(), Some(1337));
        assert!(session.is_supported_network().await);

        ledger.set_reachable(false).await;
        assert!(matches!(
            session.refresh().await,
            Err(SessionError::Ledger(LedgerError::Unreachable(_)))
        ));
    }
}
