use async_trait::async_trait;
use std::time::Instant;

use super::{BoxTagService, Descriptor, TagService, TagServiceLayer};
use crate::server::error::RegistryError;

/// Logs every tag operation with its outcome and latency
pub struct TracingLayer;

impl TagServiceLayer for TracingLayer {
    fn wrap(&self, repository: &str, inner: BoxTagService) -> BoxTagService {
        Box::new(TracedTagService {
            repository: repository.to_string(),
            inner,
        })
    }
}

struct TracedTagService {
    repository: String,
    inner: BoxTagService,
}

impl TracedTagService {
    fn finish<T>(&self, op: &'static str, started: Instant, result: &Result<T, RegistryError>) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(_) => tracing::debug!(
                repository = %self.repository,
                op,
                elapsed_ms,
                "Tag operation completed"
            ),
            Err(e) => tracing::debug!(
                repository = %self.repository,
                op,
                elapsed_ms,
                error = %e,
                "Tag operation failed"
            ),
        }
    }
}

#[async_trait]
impl TagService for TracedTagService {
    async fn get(&self, tag: &str) -> Result<Descriptor, RegistryError> {
        let started = Instant::now();
        let result = self.inner.get(tag).await;
        self.finish("get", started, &result);
        result
    }

    async fn all(&self) -> Result<Vec<String>, RegistryError> {
        let started = Instant::now();
        let result = self.inner.all().await;
        self.finish("all", started, &result);
        result
    }

    async fn lookup(&self, descriptor: &Descriptor) -> Result<Vec<String>, RegistryError> {
        let started = Instant::now();
        let result = self.inner.lookup(descriptor).await;
        self.finish("lookup", started, &result);
        result
    }

    async fn tag(&self, tag: &str, descriptor: &Descriptor) -> Result<(), RegistryError> {
        let started = Instant::now();
        let result = self.inner.tag(tag, descriptor).await;
        self.finish("tag", started, &result);
        result
    }

    async fn untag(&self, tag: &str) -> Result<(), RegistryError> {
        let started = Instant::now();
        let result = self.inner.untag(tag).await;
        self.finish("untag", started, &result);
        result
    }
}
