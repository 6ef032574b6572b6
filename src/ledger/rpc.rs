use super::client::LedgerClient;
use super::types::{CertificateId, CertificateRecord, LedgerVerification, TxHandle, TxReceipt};
use crate::clock::{Clock, SystemClock};
use crate::error::LedgerError;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// JSON-RPC error code the contract gateway uses for an unknown certificate.
pub const RPC_NOT_FOUND: i64 = -32004;

/// Ledger client speaking JSON-RPC 2.0 to a contract gateway node. Writes are
/// signed by the gateway on behalf of `sender`.
pub struct RpcLedgerClient {
    endpoint: String,
    contract_address: String,
    sender: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

enum CallKind {
    Read,
    Write,
}

impl RpcLedgerClient {
    pub fn new(
        endpoint: impl Into<String>,
        contract_address: impl Into<String>,
        sender: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Unreachable(format!("http client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.into(),
            contract_address: contract_address.into(),
            sender: sender.into(),
            http,
            next_id: AtomicU64::new(1),
            clock: Arc::new(SystemClock),
        })
    }

    /// Clock used to stamp submitted transactions.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcOutcome> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("rpc {} #{} -> {}", method, id, self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcOutcome::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RpcOutcome::Transport(format!(
                "{} answered {}",
                self.endpoint,
                response.status()
            )));
        }
        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcOutcome::Decode(e.to_string()))?;

        if let Some(err) = envelope.error {
            return Err(RpcOutcome::Remote(err.code, err.message));
        }
        Ok(envelope.result.unwrap_or(Value::Null))
    }

    async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        kind: CallKind,
    ) -> Result<T, LedgerError> {
        let value = self
            .call(method, params)
            .await
            .map_err(|outcome| outcome.into_ledger_error(kind))?;
        serde_json::from_value(value).map_err(|e| LedgerError::Decode(format!("{}: {}", method, e)))
    }

    async fn read_certificate_call<T: DeserializeOwned>(
        &self,
        method: &str,
        id: &CertificateId,
    ) -> Result<T, LedgerError> {
        let value = match self
            .call(method, json!([self.contract_address, id.as_str()]))
            .await
        {
            Ok(Value::Null) => {
                return Err(LedgerError::NotFound {
                    certificate_id: id.to_string(),
                });
            }
            Ok(value) => value,
            Err(RpcOutcome::Remote(RPC_NOT_FOUND, _)) => {
                return Err(LedgerError::NotFound {
                    certificate_id: id.to_string(),
                });
            }
            Err(outcome) => return Err(outcome.into_ledger_error(CallKind::Read)),
        };
        serde_json::from_value(value).map_err(|e| LedgerError::Decode(format!("{}: {}", method, e)))
    }
}

enum RpcOutcome {
    Transport(String),
    Decode(String),
    Remote(i64, String),
}

impl RpcOutcome {
    fn into_ledger_error(self, kind: CallKind) -> LedgerError {
        match (self, kind) {
            (RpcOutcome::Transport(reason), _) => LedgerError::Unreachable(reason),
            (RpcOutcome::Decode(reason), _) => LedgerError::Decode(reason),
            (RpcOutcome::Remote(_, message), CallKind::Write) => LedgerError::Rejected(message),
            (RpcOutcome::Remote(code, message), CallKind::Read) => LedgerError::Rpc { code, message },
        }
    }
}

/// Chain ids come back either as JSON numbers or `0x`-prefixed hex strings.
pub(crate) fn parse_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn chain_id(&self) -> Result<u64, LedgerError> {
        let value = self
            .call("eth_chainId", json!([]))
            .await
            .map_err(|o| o.into_ledger_error(CallKind::Read))?;
        parse_chain_id(&value)
            .ok_or_else(|| LedgerError::Decode(format!("unexpected chain id {}", value)))
    }

    async fn issue_certificate(
        &self,
        recipient: &str,
        metadata_locator: &str,
        expiry: u64,
    ) -> Result<TxHandle, LedgerError> {
        let hash: String = self
            .call_typed(
                "cert_issueCertificate",
                json!([self.contract_address, self.sender, recipient, metadata_locator, expiry]),
                CallKind::Write,
            )
            .await?;
        Ok(TxHandle::new(hash, self.clock.now()))
    }

    async fn get_certificate(&self, id: &CertificateId) -> Result<CertificateRecord, LedgerError> {
        self.read_certificate_call("cert_getCertificate", id).await
    }

    async fn verify(&self, id: &CertificateId) -> Result<LedgerVerification, LedgerError> {
        self.read_certificate_call("cert_verify", id).await
    }

    async fn record_verification(&self, id: &CertificateId) -> Result<TxHandle, LedgerError> {
        let hash: String = self
            .call_typed(
                "cert_recordVerification",
                json!([self.contract_address, self.sender, id.as_str()]),
                CallKind::Write,
            )
            .await?;
        Ok(TxHandle::new(hash, self.clock.now()))
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, LedgerError> {
        self.call_typed("cert_getTransactionReceipt", json!([hash]), CallKind::Read)
            .await
    }

    async fn certificates_of(&self, recipient: &str) -> Result<Vec<CertificateId>, LedgerError> {
        self.call_typed(
            "cert_certificatesOf",
            json!([self.contract_address, recipient]),
            CallKind::Read,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids_parse_from_hex_and_numbers() {
        assert_eq!(parse_chain_id(&json!("0x13882")), Some(80002));
        assert_eq!(parse_chain_id(&json!(137)), Some(137));
        assert_eq!(parse_chain_id(&json!("1337")), Some(1337));
        assert_eq!(parse_chain_id(&json!(null)), None);
    }

    #[test]
    fn remote_errors_map_by_call_kind() {
        let write = RpcOutcome::Remote(-32000, "nonce too low".into()).into_ledger_error(CallKind::Write);
        assert_eq!(write, LedgerError::Rejected("nonce too low".into()));

        let read = RpcOutcome::Remote(-32000, "boom".into()).into_ledger_error(CallKind::Read);
        assert!(matches!(read, LedgerError::Rpc { code: -32000, .. }));

        let down = RpcOutcome::Transport("connection refused".into()).into_ledger_error(CallKind::Write);
        assert!(matches!(down, LedgerError::Unreachable(_)));
    }
}
