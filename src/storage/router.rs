//! Storage fallback routing.
//!
//! Writes go to the first backend that accepts them, in configured
//! precedence. Reads go to the backend named by the locator's scheme (or the
//! legacy backend for bare identifiers) and walk its gateways, retrying each
//! a fixed number of times before moving on.

use super::locator::{BackendKind, StorageLocator};
use super::store::{Durability, MetadataStore};
use crate::error::{OrchestratorError, StoreError};
use crate::metadata::{CertificateMetadata, MetadataCodec, canonical_bytes};
use crate::metrics::OrchestratorMetrics;
use log::{debug, info, warn};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub const DEFAULT_READ_ATTEMPTS: u32 = 3;
pub const DEFAULT_READ_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_ALIAS_CAPACITY: usize = 1024;

/// Per-gateway retry bound for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_READ_ATTEMPTS,
            delay: DEFAULT_READ_DELAY,
        }
    }
}

enum ReadFailure {
    /// Content was reached but is corrupt or too new; never retried.
    Data(OrchestratorError),
    Exhausted(String),
}

pub struct StorageRouter {
    backends: Vec<Arc<dyn MetadataStore>>,
    legacy_backend: BackendKind,
    retry: ReadRetry,
    mirror_to_fallback: bool,
    /// Recently used primary-to-copy links. The fallback backend's own
    /// mirror index is authoritative; this only saves the lookup.
    aliases: Mutex<LruCache<StorageLocator, StorageLocator>>,
    cache: Option<Mutex<LruCache<StorageLocator, CertificateMetadata>>>,
    metrics: Arc<OrchestratorMetrics>,
}

impl StorageRouter {
    /// `backends` are in write precedence: primary first, last resort last.
    pub fn new(backends: Vec<Arc<dyn MetadataStore>>) -> Self {
        Self {
            backends,
            legacy_backend: BackendKind::Ipfs,
            retry: ReadRetry::default(),
            mirror_to_fallback: false,
            aliases: Mutex::new(LruCache::new(alias_capacity(DEFAULT_ALIAS_CAPACITY))),
            cache: None,
            metrics: Arc::new(OrchestratorMetrics::new()),
        }
    }

    pub fn with_read_retry(mut self, retry: ReadRetry) -> Self {
        self.retry = ReadRetry {
            attempts: retry.attempts.max(1),
            delay: retry.delay,
        };
        self
    }

    /// Backend that bare (scheme-less) identifiers resolve against.
    pub fn with_legacy_backend(mut self, kind: BackendKind) -> Self {
        self.legacy_backend = kind;
        self
    }

    pub fn with_mirror_to_fallback(mut self, mirror: bool) -> Self {
        self.mirror_to_fallback = mirror;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        self
    }

    pub fn with_alias_capacity(mut self, capacity: usize) -> Self {
        self.aliases = Mutex::new(LruCache::new(alias_capacity(capacity)));
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<OrchestratorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn backend_kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    pub fn backend_durabilities(&self) -> Vec<Durability> {
        self.backends.iter().map(|b| b.durability()).collect()
    }

    fn backend_for(&self, kind: BackendKind) -> Option<&Arc<dyn MetadataStore>> {
        self.backends.iter().find(|b| b.kind() == kind)
    }

    /// Stores `metadata` on the first backend that accepts it. The returned
    /// locator names the backend that actually holds the document.
    pub async fn put(
        &self,
        metadata: &CertificateMetadata,
    ) -> Result<StorageLocator, OrchestratorError> {
        let mut failures = Vec::new();

        for (position, backend) in self.backends.iter().enumerate() {
            match backend.put(metadata).await {
                Ok(locator) => {
                    if position > 0 {
                        self.metrics.record_fallback_write();
                        warn!(
                            "metadata written to fallback backend {} after: {}",
                            backend.kind(),
                            failures.join("; ")
                        );
                    }
                    if backend.durability() == Durability::Ephemeral {
                        warn!("{} is ephemeral; {} has no network durability", backend.kind(), locator);
                    }
                    info!("metadata stored at {}", locator);

                    if position == 0 {
                        self.mirror(metadata, &locator).await;
                    }
                    self.remember(&locator, metadata).await;
                    return Ok(locator);
                }
                Err(StoreError::Malformed(err)) => return Err(err.into()),
                Err(err) => {
                    warn!("{} rejected metadata write: {}", backend.kind(), err);
                    failures.push(err.to_string());
                }
            }
        }

        if failures.is_empty() {
            failures.push("no storage backend configured".to_string());
        }
        Err(OrchestratorError::AllBackendsUnavailable(failures.join("; ")))
    }

    async fn mirror(&self, metadata: &CertificateMetadata, primary: &StorageLocator) {
        if !self.mirror_to_fallback || self.backends.len() < 2 {
            return;
        }
        let Some(fallback) = self.backends.last() else {
            return;
        };
        let bytes = match canonical_bytes(metadata) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("cannot mirror {}: {}", primary, err);
                return;
            }
        };
        match fallback.put_mirror(primary, bytes).await {
            Ok(id) => {
                let copy = StorageLocator::new(fallback.kind(), id);
                debug!("mirrored {} to {}", primary, copy);
                self.metrics.record_mirrored_write();
                self.record_alias(primary.clone(), copy).await;
            }
            Err(err) => warn!("mirror of {} to {} failed: {}", primary, fallback.kind(), err),
        }
    }

    /// Records that `fallback` holds the same document as `primary`.
    pub async fn record_alias(&self, primary: StorageLocator, fallback: StorageLocator) {
        self.aliases.lock().await.put(primary, fallback);
    }

    /// Locator of a copy of `locator`, from the alias cache or, failing that,
    /// from the mirror index of any other configured backend.
    pub async fn alias_of(&self, locator: &StorageLocator) -> Option<StorageLocator> {
        if let Some(alias) = self.aliases.lock().await.get(locator).cloned() {
            return Some(alias);
        }
        for backend in &self.backends {
            if locator.backend() == Some(backend.kind()) {
                continue;
            }
            match backend.mirror_of(locator).await {
                Ok(Some(id)) => {
                    let alias = StorageLocator::new(backend.kind(), id);
                    self.record_alias(locator.clone(), alias.clone()).await;
                    return Some(alias);
                }
                Ok(None) => {}
                Err(err) => debug!("{} mirror index unavailable: {}", backend.kind(), err),
            }
        }
        None
    }

    /// Fetches and decodes the document at `locator`.
    ///
    /// Fails with `MetadataUnretrievable` once every candidate gateway (and
    /// any recorded fallback copy) has exhausted its retries, or with a data
    /// error as soon as a gateway serves content that does not decode.
    pub async fn get(
        &self,
        locator: &StorageLocator,
    ) -> Result<CertificateMetadata, OrchestratorError> {
        if let Some(cache) = &self.cache {
            let hit = cache.lock().await.get(locator).cloned();
            self.metrics.record_cache_lookup(hit.is_some());
            if let Some(metadata) = hit {
                return Ok(metadata);
            }
        }

        let mut failures = Vec::new();
        let kind = locator.backend().unwrap_or(self.legacy_backend);

        match self.backend_for(kind) {
            Some(backend) => match self.read_with_retry(backend.as_ref(), locator).await {
                Ok(metadata) => {
                    self.remember(locator, &metadata).await;
                    return Ok(metadata);
                }
                Err(ReadFailure::Data(err)) => return Err(err),
                Err(ReadFailure::Exhausted(reason)) => failures.push(reason),
            },
            None => failures.push(format!("no {} backend configured", kind)),
        }

        if let Some(alias) = self.alias_of(locator).await {
            let backend = alias.backend().and_then(|k| self.backend_for(k));
            if let Some(backend) = backend {
                debug!("reading {} through recorded fallback {}", locator, alias);
                match self.read_with_retry(backend.as_ref(), &alias).await {
                    Ok(metadata) => {
                        self.remember(locator, &metadata).await;
                        return Ok(metadata);
                    }
                    Err(ReadFailure::Data(err)) => return Err(err),
                    Err(ReadFailure::Exhausted(reason)) => failures.push(reason),
                }
            }
        }

        Err(OrchestratorError::MetadataUnretrievable(format!(
            "{}: {}",
            locator,
            failures.join("; ")
        )))
    }

    async fn read_with_retry(
        &self,
        backend: &dyn MetadataStore,
        locator: &StorageLocator,
    ) -> Result<CertificateMetadata, ReadFailure> {
        let mut last_error = None;

        for endpoint in backend.read_endpoints() {
            for attempt in 1..=self.retry.attempts {
                match backend.fetch(&endpoint, locator.id()).await {
                    Ok(bytes) => {
                        return MetadataCodec::decode(&bytes)
                            .map_err(|e| ReadFailure::Data(e.into()));
                    }
                    Err(StoreError::Malformed(err)) => return Err(ReadFailure::Data(err.into())),
                    Err(err) => {
                        debug!(
                            "read {} from {} attempt {}/{} failed: {}",
                            locator, endpoint, attempt, self.retry.attempts, err
                        );
                        last_error = Some(err.to_string());
                        if attempt < self.retry.attempts {
                            self.metrics.record_read_retry();
                            tokio::time::sleep(self.retry.delay).await;
                        }
                    }
                }
            }
            warn!("gateway {} gave up on {}", endpoint, locator);
        }

        Err(ReadFailure::Exhausted(
            last_error.unwrap_or_else(|| format!("{} has no read endpoint", backend.kind())),
        ))
    }

    async fn remember(&self, locator: &StorageLocator, metadata: &CertificateMetadata) {
        if let Some(cache) = &self.cache {
            cache.lock().await.put(locator.clone(), metadata.clone());
        }
    }
}

fn alias_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}
