use async_trait::async_trait;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

use super::{BoxTagService, Descriptor, TagService, TagServiceLayer};
use crate::server::error::RegistryError;

/// Where previously recorded repository-level failures are looked up
pub trait PendingErrorSource: Send + Sync {
    fn pending_error(&self, repository: &str) -> Option<RegistryError>;
}

/// In-memory pending error store keyed by repository name (`namespace/name`)
pub struct PendingErrors {
    cache: Cache<String, RegistryError>,
}

impl PendingErrors {
    /// Create a store whose entries expire after `ttl`
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(max_capacity)
            .build();
        Self { cache }
    }

    pub fn record(&self, repository: &str, err: RegistryError) {
        tracing::debug!(repository, error = %err, "Recording pending error");
        self.cache.insert(repository.to_string(), err);
    }

    /// Forget the pending error of `repository`, if any
    pub fn clear(&self, repository: &str) {
        self.cache.invalidate(repository);
    }
}

impl PendingErrorSource for PendingErrors {
    fn pending_error(&self, repository: &str) -> Option<RegistryError> {
        self.cache.get(repository)
    }
}

/// Tag service that fails fast with the pending error of its repository
pub struct PendingErrorTagService<S> {
    repository: String,
    source: Arc<dyn PendingErrorSource>,
    inner: S,
}

impl<S> PendingErrorTagService<S> {
    pub fn new(repository: &str, source: Arc<dyn PendingErrorSource>, inner: S) -> Self {
        Self {
            repository: repository.to_string(),
            source,
            inner,
        }
    }

    fn check(&self) -> Result<(), RegistryError> {
        match self.source.pending_error(&self.repository) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<S: TagService> TagService for PendingErrorTagService<S> {
    async fn get(&self, tag: &str) -> Result<Descriptor, RegistryError> {
        self.check()?;
        self.inner.get(tag).await
    }

    async fn all(&self) -> Result<Vec<String>, RegistryError> {
        self.check()?;
        self.inner.all().await
    }

    async fn lookup(&self, descriptor: &Descriptor) -> Result<Vec<String>, RegistryError> {
        self.check()?;
        self.inner.lookup(descriptor).await
    }

    async fn tag(&self, tag: &str, descriptor: &Descriptor) -> Result<(), RegistryError> {
        self.check()?;
        self.inner.tag(tag, descriptor).await
    }

    async fn untag(&self, tag: &str) -> Result<(), RegistryError> {
        self.check()?;
        self.inner.untag(tag).await
    }
}

pub struct PendingErrorLayer {
    source: Arc<dyn PendingErrorSource>,
}

impl PendingErrorLayer {
    pub fn new(source: Arc<dyn PendingErrorSource>) -> Self {
        Self { source }
    }
}

impl TagServiceLayer for PendingErrorLayer {
    fn wrap(&self, repository: &str, inner: BoxTagService) -> BoxTagService {
        Box::new(PendingErrorTagService::new(
            repository,
            self.source.clone(),
            inner,
        ))
    }
}
