use super::locator::BackendKind;
use super::store::{Durability, MetadataStore, status_error, transport_error, trim_endpoint};
use crate::config::ConfigError;
use crate::crypto::UploadSigner;
use crate::error::StoreError;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::time::Duration;

/// Primary permanent-storage network, written through a bundler endpoint
/// and read back through public gateways.
pub struct ArweaveStore {
    upload_url: String,
    gateways: Vec<String>,
    signer: UploadSigner,
    http: reqwest::Client,
    durability: Durability,
}

#[derive(Debug, Deserialize)]
struct UploadReceipt {
    id: String,
}

impl ArweaveStore {
    pub fn new(
        upload_url: impl Into<String>,
        gateways: Vec<String>,
        signer: UploadSigner,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if gateways.is_empty() {
            return Err(ConfigError::Invalid(
                "arweave backend needs at least one read gateway".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("http client: {}", e)))?;
        Ok(Self {
            upload_url: upload_url.into(),
            gateways,
            signer,
            http,
            durability: Durability::Durable,
        })
    }

    /// Marks a deployment (e.g. a local test node) whose writes should not
    /// be treated as permanent.
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn public_key_hex(&self) -> String {
        self.signer.public_key_hex()
    }
}

#[async_trait]
impl MetadataStore for ArweaveStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Arweave
    }

    fn durability(&self) -> Durability {
        self.durability
    }

    fn read_endpoints(&self) -> Vec<String> {
        self.gateways.clone()
    }

    async fn put_bytes(&self, bytes: Vec<u8>) -> Result<String, StoreError> {
        let signature = hex::encode(self.signer.sign(&bytes));
        let url = format!("{}/tx", trim_endpoint(&self.upload_url));

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .header("x-public-key", self.signer.public_key_hex())
            .header("x-signature", signature)
            .body(bytes)
            .send()
            .await
            .map_err(|e| transport_error(self.kind(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::unavailable(
                self.kind().scheme(),
                format!("upload answered {}", status),
            ));
        }
        let receipt: UploadReceipt = response
            .json()
            .await
            .map_err(|e| transport_error(self.kind(), e))?;
        debug!("arweave accepted upload as {}", receipt.id);
        Ok(receipt.id)
    }

    async fn fetch(&self, endpoint: &str, id: &str) -> Result<Vec<u8>, StoreError> {
        let url = format!("{}/{}", trim_endpoint(endpoint), id);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(self.kind(), e))?;
        if !response.status().is_success() {
            return Err(status_error(self.kind(), response.status(), id));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(self.kind(), e))?;
        Ok(body.to_vec())
    }
}
