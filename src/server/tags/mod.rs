pub mod bridge;
pub mod pending;
pub mod trace;

use async_trait::async_trait;
use std::sync::Arc;

use crate::server::error::RegistryError;
use crate::server::image::Digest;

pub use bridge::{TagBridge, TagBridgeOptions};
pub use pending::{PendingErrorLayer, PendingErrorSource, PendingErrors};
pub use trace::TracingLayer;

/// Content a tag resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub digest: Digest,
}

impl Descriptor {
    pub fn new(digest: Digest) -> Self {
        Self { digest }
    }
}

/// Tag operations of a single repository, as used by the registry protocol
#[async_trait]
pub trait TagService: Send + Sync {
    /// Resolve a tag to the descriptor it currently points at
    async fn get(&self, tag: &str) -> Result<Descriptor, RegistryError>;

    /// All tags of the repository
    async fn all(&self) -> Result<Vec<String>, RegistryError>;

    /// Tags currently pointing at `descriptor`
    async fn lookup(&self, descriptor: &Descriptor) -> Result<Vec<String>, RegistryError>;

    /// Point `tag` at `descriptor`
    async fn tag(&self, tag: &str, descriptor: &Descriptor) -> Result<(), RegistryError>;

    async fn untag(&self, tag: &str) -> Result<(), RegistryError>;
}

pub type BoxTagService = Box<dyn TagService>;

#[async_trait]
impl<T: TagService + ?Sized> TagService for Box<T> {
    async fn get(&self, tag: &str) -> Result<Descriptor, RegistryError> {
        (**self).get(tag).await
    }

    async fn all(&self) -> Result<Vec<String>, RegistryError> {
        (**self).all().await
    }

    async fn lookup(&self, descriptor: &Descriptor) -> Result<Vec<String>, RegistryError> {
        (**self).lookup(descriptor).await
    }

    async fn tag(&self, tag: &str, descriptor: &Descriptor) -> Result<(), RegistryError> {
        (**self).tag(tag, descriptor).await
    }

    async fn untag(&self, tag: &str) -> Result<(), RegistryError> {
        (**self).untag(tag).await
    }
}

/// Interceptor wrapping a repository's tag service
pub trait TagServiceLayer: Send + Sync {
    fn wrap(&self, repository: &str, inner: BoxTagService) -> BoxTagService;
}

/// Ordered list of interceptors, outermost first, composed once at startup
/// and applied to each repository's base tag service.
#[derive(Clone, Default)]
pub struct TagServiceStack {
    layers: Vec<Arc<dyn TagServiceLayer>>,
}

impl TagServiceStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer; it sits inside every layer added before it
    pub fn layer(mut self, layer: impl TagServiceLayer + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn build(&self, repository: &str, base: impl TagService + 'static) -> BoxTagService {
        self.layers
            .iter()
            .rev()
            .fold(Box::new(base) as BoxTagService, |inner, layer| {
                layer.wrap(repository, inner)
            })
    }
}
