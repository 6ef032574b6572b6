use super::locator::{BackendKind, StorageLocator};
use super::store::{Durability, MetadataStore};
use crate::error::StoreError;
use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Everything a snapshot file holds.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    entries: HashMap<String, Vec<u8>>,
    /// Primary locator (as written) to the id of its mirrored copy.
    mirrors: HashMap<String, String>,
}

impl Snapshot {
    /// Accepts the current layout and the older entries-only one.
    fn decode(raw: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize::<Snapshot>(raw).or_else(|_| {
            bincode::deserialize::<HashMap<String, Vec<u8>>>(raw).map(|entries| Snapshot {
                entries,
                mirrors: HashMap::new(),
            })
        })
    }
}

/// Last-resort store kept in process memory, optionally snapshotted to a
/// local file. Reported as [`Durability::Ephemeral`] unless configured
/// otherwise.
pub struct LocalStore {
    state: Arc<RwLock<Snapshot>>,
    snapshot: Option<PathBuf>,
    durability: Durability,
    online: AtomicBool,
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(Snapshot::default())),
            snapshot: None,
            durability: Durability::Ephemeral,
            online: AtomicBool::new(true),
        }
    }

    /// Opens a store backed by `path`, loading a previous snapshot if present.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(raw) => Snapshot::decode(&raw).map_err(|e| {
                StoreError::unavailable("local", format!("corrupt snapshot: {}", e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Snapshot::default(),
            Err(e) => return Err(StoreError::unavailable("local", e.to_string())),
        };
        debug!(
            "local store loaded {} entries and {} mirrors from {}",
            state.entries.len(),
            state.mirrors.len(),
            path.display()
        );

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            snapshot: Some(path),
            durability: Durability::Ephemeral,
            online: AtomicBool::new(true),
        })
    }

    /// Overrides the reported durability, e.g. for a snapshot on replicated
    /// storage.
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    /// Simulates the store dropping out (or coming back).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("local", "store offline"))
        }
    }

    fn new_id() -> String {
        format!("mock_{}", hex::encode(rand::random::<[u8; 16]>()))
    }

    async fn persist(&self, state: &Snapshot) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let raw = bincode::serialize(state)
            .map_err(|e| StoreError::unavailable("local", e.to_string()))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, raw)
            .await
            .map_err(|e| StoreError::unavailable("local", e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::unavailable("local", e.to_string()))
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for LocalStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn durability(&self) -> Durability {
        self.durability
    }

    fn read_endpoints(&self) -> Vec<String> {
        match &self.snapshot {
            Some(path) => vec![path.display().to_string()],
            None => vec!["memory".to_string()],
        }
    }

    async fn put_bytes(&self, bytes: Vec<u8>) -> Result<String, StoreError> {
        self.ensure_online()?;
        let id = Self::new_id();

        let mut state = self.state.write().await;
        state.entries.insert(id.clone(), bytes);
        if let Err(e) = self.persist(&state).await {
            state.entries.remove(&id);
            warn!("local snapshot write failed: {}", e);
            return Err(e);
        }
        Ok(id)
    }

    async fn fetch(&self, _endpoint: &str, id: &str) -> Result<Vec<u8>, StoreError> {
        self.ensure_online()?;
        self.state
            .read()
            .await
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(StorageLocator::new(self.kind(), id).to_string()))
    }

    async fn put_mirror(
        &self,
        primary: &StorageLocator,
        bytes: Vec<u8>,
    ) -> Result<String, StoreError> {
        self.ensure_online()?;
        let id = Self::new_id();
        let key = primary.to_string();

        let mut state = self.state.write().await;
        state.entries.insert(id.clone(), bytes);
        let previous = state.mirrors.insert(key.clone(), id.clone());
        if let Err(e) = self.persist(&state).await {
            state.entries.remove(&id);
            match previous {
                Some(old) => state.mirrors.insert(key, old),
                None => state.mirrors.remove(&key),
            };
            warn!("local snapshot write failed: {}", e);
            return Err(e);
        }
        Ok(id)
    }

    async fn mirror_of(&self, primary: &StorageLocator) -> Result<Option<String>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .state
            .read()
            .await
            .mirrors
            .get(&primary.to_string())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn stores_and_returns_bytes() {
        let store = LocalStore::new();
        let id = assert_ok!(store.put_bytes(b"{}".to_vec()).await);
        assert!(id.starts_with("mock_"));
        assert_eq!(store.fetch("memory", &id).await.unwrap(), b"{}".to_vec());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn identifiers_are_not_derived_from_content() {
        let store = LocalStore::new();
        let first = store.put_bytes(b"same".to_vec()).await.unwrap();
        let second = store.put_bytes(b"same".to_vec()).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = LocalStore::new();
        store.set_online(false);
        let err = assert_err!(store.put_bytes(b"x".to_vec()).await);
        assert!(matches!(err, StoreError::Unavailable { .. }));
        assert!(matches!(
            store.fetch("memory", "mock_00").await,
            Err(StoreError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let store = LocalStore::new();
        assert!(matches!(
            store.fetch("memory", "mock_00").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.bin");

        let id = {
            let store = LocalStore::open(&path).await.unwrap();
            store.put_bytes(b"persisted".to_vec()).await.unwrap()
        };

        let reopened = LocalStore::open(&path).await.unwrap();
        assert_eq!(reopened.fetch("", &id).await.unwrap(), b"persisted".to_vec());
        assert_eq!(reopened.durability(), Durability::Ephemeral);
    }

    #[tokio::test]
    async fn mirror_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.bin");
        let primary = StorageLocator::new(BackendKind::Arweave, "tx1");

        let id = {
            let store = LocalStore::open(&path).await.unwrap();
            store.put_mirror(&primary, b"copy".to_vec()).await.unwrap()
        };

        let reopened = LocalStore::open(&path).await.unwrap();
        assert_eq!(reopened.mirror_of(&primary).await.unwrap(), Some(id.clone()));
        assert_eq!(reopened.fetch("", &id).await.unwrap(), b"copy".to_vec());
        assert_eq!(
            reopened
                .mirror_of(&StorageLocator::new(BackendKind::Arweave, "tx2"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn entries_only_snapshots_still_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.bin");
        let old = HashMap::from([("mock_old".to_string(), b"legacy".to_vec())]);
        std::fs::write(&path, bincode::serialize(&old).unwrap()).unwrap();

        let store = LocalStore::open(&path).await.unwrap();
        assert_eq!(store.fetch("", "mock_old").await.unwrap(), b"legacy".to_vec());
        assert!(store
            .mirror_of(&StorageLocator::new(BackendKind::Arweave, "tx1"))
            .await
            .unwrap()
            .is_none());
    }

    #[test]
    fn durability_can_be_declared() {
        assert_eq!(LocalStore::new().durability(), Durability::Ephemeral);
        assert_eq!(
            LocalStore::new().with_durability(Durability::Durable).durability(),
            Durability::Durable
        );
    }
}
