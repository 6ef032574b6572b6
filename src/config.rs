//! Configuration loaded once at start-up.
//!
//! A JSON document (path in `CERT_ANCHOR_CONFIG`) or [`Config::dev`] provides
//! the base; `CERT_ANCHOR_*` variables override individual fields. The result
//! is validated before any client is built, and is read-only afterwards.

use crate::crypto::UploadSigner;
use crate::error::LedgerError;
use crate::ledger::RpcLedgerClient;
use crate::metadata::is_ledger_address;
use crate::metrics::OrchestratorMetrics;
use crate::network::NetworkParams;
use crate::storage::{
    ArweaveStore, BackendKind, Durability, IpfsStore, LocalStore, MetadataStore, ReadRetry,
    StorageRouter,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_PATH_VAR: &str = "CERT_ANCHOR_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(String),

    #[error("cannot parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Network every ledger write must target.
    pub network: NetworkParams,
    /// Further networks the session may switch to.
    #[serde(default)]
    pub networks: Vec<NetworkParams>,
    #[serde(default)]
    pub ledger: LedgerSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Account the gateway signs writes for.
    pub sender: Option<String>,
    pub rpc_timeout_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            sender: None,
            rpc_timeout_secs: 15,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 2000,
        }
    }
}

impl LedgerSettings {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Write precedence, primary first.
    pub backends: Vec<BackendConfig>,
    /// Must be set for an ephemeral backend to be accepted at all.
    #[serde(default)]
    pub allow_ephemeral_fallback: bool,
    #[serde(default)]
    pub mirror_to_fallback: bool,
    #[serde(default = "default_legacy_backend")]
    pub legacy_backend: BackendKind,
    #[serde(default)]
    pub read_retry: ReadRetrySettings,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_legacy_backend() -> BackendKind {
    BackendKind::Ipfs
}

fn default_cache_capacity() -> usize {
    256
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadRetrySettings {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for ReadRetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Arweave {
        upload_url: String,
        gateways: Vec<String>,
        /// Hex ed25519 secret authorizing uploads.
        #[serde(default)]
        signer_key: Option<String>,
        #[serde(default)]
        durability: Option<Durability>,
    },
    Ipfs {
        api_url: String,
        #[serde(default)]
        gateways: Vec<String>,
        #[serde(default)]
        api_token: Option<String>,
        #[serde(default)]
        durability: Option<Durability>,
    },
    Local {
        #[serde(default)]
        snapshot_path: Option<PathBuf>,
        /// Only a snapshot on storage that outlives the host may be declared
        /// durable.
        #[serde(default)]
        durability: Option<Durability>,
    },
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendConfig::Arweave { .. } => BackendKind::Arweave,
            BackendConfig::Ipfs { .. } => BackendKind::Ipfs,
            BackendConfig::Local { .. } => BackendKind::Local,
        }
    }

    /// Declared durability, or the backend's default: network stores are
    /// durable, the local store is ephemeral.
    pub fn durability(&self) -> Durability {
        match self {
            BackendConfig::Arweave { durability, .. } | BackendConfig::Ipfs { durability, .. } => {
                durability.unwrap_or(Durability::Durable)
            }
            BackendConfig::Local { durability, .. } => durability.unwrap_or(Durability::Ephemeral),
        }
    }
}

impl Config {
    /// Local development profile: dev chain id, in-process metadata store.
    pub fn dev() -> Self {
        Self {
            network: NetworkParams {
                chain_id: 1337,
                name: "devnet".to_string(),
                rpc_url: "http://127.0.0.1:8545".to_string(),
                contract_address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
                explorer_url: None,
                currency_symbol: "ETH".to_string(),
            },
            networks: vec![],
            ledger: LedgerSettings {
                sender: Some("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string()),
                ..LedgerSettings::default()
            },
            storage: StorageSettings {
                backends: vec![BackendConfig::Local {
                    snapshot_path: None,
                    durability: None,
                }],
                allow_ephemeral_fallback: true,
                mirror_to_fallback: false,
                legacy_backend: BackendKind::Ipfs,
                read_retry: ReadRetrySettings::default(),
                cache_capacity: default_cache_capacity(),
                request_timeout_secs: default_request_timeout(),
            },
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&raw)
    }

    /// Reads the file named by `CERT_ANCHOR_CONFIG` (or the dev profile),
    /// applies environment overrides and validates.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::dev(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CERT_ANCHOR_RPC_URL") {
            self.network.rpc_url = url;
        }
        if let Some(raw) = lookup("CERT_ANCHOR_CHAIN_ID") {
            self.network.chain_id = raw
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("CERT_ANCHOR_CHAIN_ID '{}'", raw)))?;
        }
        if let Some(address) = lookup("CERT_ANCHOR_CONTRACT") {
            self.network.contract_address = address;
        }
        if let Some(sender) = lookup("CERT_ANCHOR_SENDER") {
            self.ledger.sender = Some(sender);
        }
        if let Some(key) = lookup("CERT_ANCHOR_SIGNER_KEY") {
            for backend in &mut self.storage.backends {
                if let BackendConfig::Arweave { signer_key, .. } = backend {
                    *signer_key = Some(key.clone());
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.chain_id == 0 {
            return Err(ConfigError::Invalid("network.chain_id must be non-zero".into()));
        }
        if !is_ledger_address(&self.network.contract_address) {
            return Err(ConfigError::Invalid(format!(
                "network.contract_address '{}' is not a ledger address",
                self.network.contract_address
            )));
        }
        if let Some(sender) = &self.ledger.sender {
            if !is_ledger_address(sender) {
                return Err(ConfigError::Invalid(format!(
                    "ledger.sender '{}' is not a ledger address",
                    sender
                )));
            }
        }
        if self.ledger.confirmation_timeout_secs == 0 || self.ledger.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "ledger timeouts must be positive".into(),
            ));
        }

        let storage = &self.storage;
        if storage.backends.is_empty() {
            return Err(ConfigError::Invalid("no storage backend configured".into()));
        }
        if storage.read_retry.attempts == 0 {
            return Err(ConfigError::Invalid(
                "storage.read_retry.attempts must be at least 1".into(),
            ));
        }

        let mut seen = Vec::new();
        let mut ephemeral_seen = false;
        for backend in &storage.backends {
            let kind = backend.kind();
            if seen.contains(&kind) {
                return Err(ConfigError::Invalid(format!("backend {} listed twice", kind)));
            }
            seen.push(kind);

            match backend.durability() {
                Durability::Ephemeral => {
                    if !storage.allow_ephemeral_fallback {
                        return Err(ConfigError::Invalid(format!(
                            "{} backend is ephemeral; set storage.allow_ephemeral_fallback",
                            kind
                        )));
                    }
                    ephemeral_seen = true;
                }
                Durability::Durable if ephemeral_seen => {
                    return Err(ConfigError::Invalid(format!(
                        "durable backend {} listed after an ephemeral one",
                        kind
                    )));
                }
                Durability::Durable => {}
            }

            match backend {
                BackendConfig::Arweave {
                    gateways,
                    signer_key,
                    ..
                } => {
                    if gateways.is_empty() {
                        return Err(ConfigError::Invalid("arweave backend has no gateways".into()));
                    }
                    let key = signer_key.as_deref().ok_or_else(|| {
                        ConfigError::MissingCredential("arweave backend needs signer_key".into())
                    })?;
                    UploadSigner::from_hex(key)?;
                }
                BackendConfig::Ipfs { api_url, .. } => {
                    if api_url.trim().is_empty() {
                        return Err(ConfigError::Invalid("ipfs backend has no api_url".into()));
                    }
                }
                BackendConfig::Local {
                    snapshot_path: None,
                    durability: Some(Durability::Durable),
                } => {
                    return Err(ConfigError::Invalid(
                        "a durable local backend needs a snapshot_path".into(),
                    ));
                }
                BackendConfig::Local { .. } => {}
            }
        }
        Ok(())
    }

    pub fn read_retry(&self) -> ReadRetry {
        ReadRetry {
            attempts: self.storage.read_retry.attempts,
            delay: Duration::from_millis(self.storage.read_retry.delay_ms),
        }
    }

    /// Constructs every configured backend and the router over them.
    pub async fn build_router(
        &self,
        metrics: Arc<OrchestratorMetrics>,
    ) -> Result<StorageRouter, ConfigError> {
        let timeout = Duration::from_secs(self.storage.request_timeout_secs);
        let mut backends: Vec<Arc<dyn MetadataStore>> = Vec::new();

        for backend in &self.storage.backends {
            let store: Arc<dyn MetadataStore> = match backend {
                BackendConfig::Arweave {
                    upload_url,
                    gateways,
                    signer_key,
                    ..
                } => {
                    let key = signer_key.as_deref().ok_or_else(|| {
                        ConfigError::MissingCredential("arweave backend needs signer_key".into())
                    })?;
                    let signer = UploadSigner::from_hex(key)?;
                    Arc::new(ArweaveStore::new(
                        upload_url.clone(),
                        gateways.clone(),
                        signer,
                        timeout,
                    )?
                    .with_durability(backend.durability()))
                }
                BackendConfig::Ipfs {
                    api_url,
                    gateways,
                    api_token,
                    ..
                } => Arc::new(
                    IpfsStore::new(api_url.clone(), api_token.clone(), gateways.clone(), timeout)?
                        .with_durability(backend.durability()),
                ),
                BackendConfig::Local { snapshot_path, .. } => {
                    let store = match snapshot_path {
                        Some(path) => LocalStore::open(path)
                            .await
                            .map_err(|e| ConfigError::Io(e.to_string()))?,
                        None => LocalStore::new(),
                    };
                    Arc::new(store.with_durability(backend.durability()))
                }
            };
            backends.push(store);
        }

        Ok(StorageRouter::new(backends)
            .with_legacy_backend(self.storage.legacy_backend)
            .with_read_retry(self.read_retry())
            .with_mirror_to_fallback(self.storage.mirror_to_fallback)
            .with_cache_capacity(self.storage.cache_capacity)
            .with_metrics(metrics))
    }

    pub fn build_ledger(&self) -> Result<RpcLedgerClient, ConfigError> {
        let sender = self
            .ledger
            .sender
            .clone()
            .ok_or_else(|| ConfigError::MissingCredential("ledger.sender".into()))?;
        RpcLedgerClient::new(
            self.network.rpc_url.clone(),
            self.network.contract_address.clone(),
            sender,
            Duration::from_secs(self.ledger.rpc_timeout_secs),
        )
        .map_err(|e: LedgerError| ConfigError::Invalid(e.to_string()))
    }
}
