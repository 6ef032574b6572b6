use super::locator::{BackendKind, StorageLocator};
use crate::error::StoreError;
use crate::metadata::{CertificateMetadata, MetadataCodec, canonical_bytes};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How much a backend can be trusted to keep what it was given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    #[default]
    Durable,
    /// In-process or host-local; lost with the process or host.
    Ephemeral,
}

/// One storage backend. Implementations only move bytes; serialization and
/// schema checks live in the provided `put`/`get`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn durability(&self) -> Durability {
        Durability::Durable
    }

    /// Read gateways in the order they should be tried.
    fn read_endpoints(&self) -> Vec<String>;

    /// Writes bytes and returns the backend-assigned identifier.
    async fn put_bytes(&self, bytes: Vec<u8>) -> Result<String, StoreError>;

    async fn fetch(&self, endpoint: &str, id: &str) -> Result<Vec<u8>, StoreError>;

    /// Writes a copy of the document held at `primary`. Backends that can
    /// also remember the link override this together with [`mirror_of`].
    ///
    /// [`mirror_of`]: MetadataStore::mirror_of
    async fn put_mirror(
        &self,
        _primary: &StorageLocator,
        bytes: Vec<u8>,
    ) -> Result<String, StoreError> {
        self.put_bytes(bytes).await
    }

    /// Identifier of the copy mirrored from `primary`, if one was recorded.
    async fn mirror_of(&self, _primary: &StorageLocator) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn put(&self, metadata: &CertificateMetadata) -> Result<StorageLocator, StoreError> {
        let bytes = canonical_bytes(metadata)?;
        let id = self.put_bytes(bytes).await?;
        Ok(StorageLocator::new(self.kind(), id))
    }

    async fn get(&self, locator: &StorageLocator) -> Result<CertificateMetadata, StoreError> {
        let endpoint = self
            .read_endpoints()
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::unavailable(self.kind().scheme(), "no read endpoint"))?;
        let bytes = self.fetch(&endpoint, locator.id()).await?;
        Ok(MetadataCodec::decode(&bytes)?)
    }
}

/// Maps a transport failure onto the store taxonomy.
pub(crate) fn transport_error(kind: BackendKind, err: reqwest::Error) -> StoreError {
    StoreError::unavailable(kind.scheme(), err.to_string())
}

/// Maps a non-success HTTP status onto the store taxonomy.
pub(crate) fn status_error(
    kind: BackendKind,
    status: reqwest::StatusCode,
    id: &str,
) -> StoreError {
    if status == reqwest::StatusCode::NOT_FOUND {
        StoreError::not_found(StorageLocator::new(kind, id).to_string())
    } else {
        StoreError::unavailable(kind.scheme(), format!("gateway answered {}", status))
    }
}

pub(crate) fn trim_endpoint(endpoint: &str) -> &str {
    endpoint.trim_end_matches('/')
}
