use super::locator::BackendKind;
use super::store::{Durability, MetadataStore, status_error, transport_error, trim_endpoint};
use crate::config::ConfigError;
use crate::error::StoreError;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_IPFS_GATEWAYS: &[&str] = &[
    "https://ipfs.io",
    "https://cloudflare-ipfs.com",
    "https://gateway.pinata.cloud",
];

/// Legacy content-addressed network. Older certificates carry bare CIDs that
/// resolve here.
pub struct IpfsStore {
    api_url: String,
    api_token: Option<String>,
    gateways: Vec<String>,
    http: reqwest::Client,
    durability: Durability,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

impl IpfsStore {
    pub fn new(
        api_url: impl Into<String>,
        api_token: Option<String>,
        gateways: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let gateways = if gateways.is_empty() {
            DEFAULT_IPFS_GATEWAYS.iter().map(|g| g.to_string()).collect()
        } else {
            gateways
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("http client: {}", e)))?;
        Ok(Self {
            api_url: api_url.into(),
            api_token,
            gateways,
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
}

#[async_trait]
impl MetadataStore for IpfsStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Ipfs
    }

    fn durability(&self) -> Durability {
        self.durability
    }

    fn read_endpoints(&self) -> Vec<String> {
        self.gateways.clone()
    }

    async fn put_bytes(&self, bytes: Vec<u8>) -> Result<String, StoreError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name("metadata.json")
            .mime_str("application/json")
            .map_err(|e| transport_error(self.kind(), e))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let mut request = self
            .http
            .post(format!("{}/api/v0/add", trim_endpoint(&self.api_url)))
            .multipart(form);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(self.kind(), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::unavailable(
                self.kind().scheme(),
                format!("add answered {}", status),
            ));
        }
        let added: AddResponse = response
            .json()
            .await
            .map_err(|e| transport_error(self.kind(), e))?;
        debug!("ipfs pinned {}", added.hash);
        Ok(added.hash)
    }

    async fn fetch(&self, endpoint: &str, id: &str) -> Result<Vec<u8>, StoreError> {
        let url = format!("{}/ipfs/{}", trim_endpoint(endpoint), id);
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
