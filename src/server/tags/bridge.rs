use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{Descriptor, TagService};
use crate::server::cluster::{ClusterApi, ClusterError, StreamAccessor};
use crate::server::error::RegistryError;
use crate::server::image::models::join_stream_tag;
use crate::server::image::{is_image_managed, Digest, Image, StreamMapping, TrackedStream};

/// Knobs for a [`TagBridge`]
#[derive(Debug, Clone)]
pub struct TagBridgeOptions {
    /// When disabled, only managed images are visible through the tag protocol
    pub pullthrough: bool,
    /// How often a write rejected with a conflict is attempted again
    pub conflict_retries: u32,
}

impl Default for TagBridgeOptions {
    fn default() -> Self {
        Self {
            pullthrough: true,
            conflict_retries: 3,
        }
    }
}

/// Tag service backed by a tracked stream's tag history
pub struct TagBridge {
    repository: String,
    streams: Arc<dyn StreamAccessor>,
    cluster: Arc<dyn ClusterApi>,
    options: TagBridgeOptions,
}

impl TagBridge {
    pub fn new(
        repository: impl Into<String>,
        streams: Arc<dyn StreamAccessor>,
        cluster: Arc<dyn ClusterApi>,
        options: TagBridgeOptions,
    ) -> Self {
        Self {
            repository: repository.into(),
            streams,
            cluster,
            options,
        }
    }

    async fn stream(&self) -> Result<TrackedStream, RegistryError> {
        self.streams.stream().await.map_err(|e| {
            if e.is_not_found() {
                debug!(repository = %self.repository, "Image stream not found");
            } else {
                error!(
                    repository = %self.repository,
                    error = %e,
                    "Failed to retrieve image stream"
                );
            }
            RegistryError::RepositoryUnknown {
                name: self.repository.clone(),
            }
        })
    }

    async fn image(&self, digest: &Digest) -> Result<Image, RegistryError> {
        Ok(self.cluster.get_image(digest).await?)
    }

    /// Whether the current image of a tag may be exposed
    async fn is_visible(&self, image_digest: &str) -> Result<bool, RegistryError> {
        if self.options.pullthrough {
            return Ok(true);
        }
        let digest = Digest::parse(image_digest)?;
        Ok(is_image_managed(&self.image(&digest).await?))
    }

    /// Tags with a non-empty history, optionally restricted to those whose
    /// current image is `only`. Without pull-through, tags whose image is not
    /// managed are dropped; verdicts are memoized per digest for this call.
    async fn visible_tags(&self, stream: &TrackedStream, only: Option<&Digest>) -> Vec<String> {
        let mut verdicts: HashMap<&str, bool> = HashMap::new();
        let mut tags = Vec::new();

        for history in stream.tag_history() {
            let Some(current) = history.items.first() else {
                continue;
            };
            if only.is_some_and(|d| d.as_str() != current.image) {
                continue;
            }
            if self.options.pullthrough {
                tags.push(history.tag.clone());
                continue;
            }

            let managed = match verdicts.get(current.image.as_str()) {
                Some(managed) => *managed,
                None => {
                    let digest = match Digest::parse(&current.image) {
                        Ok(digest) => digest,
                        Err(e) => {
                            warn!(
                                repository = %self.repository,
                                tag = %history.tag,
                                error = %e,
                                "Skipping tag with malformed image digest"
                            );
                            continue;
                        }
                    };
                    let image = match self.cluster.get_image(&digest).await {
                        Ok(image) => image,
                        Err(e) => {
                            warn!(
                                repository = %self.repository,
                                tag = %history.tag,
                                image = %digest,
                                error = %e,
                                "Skipping tag whose image cannot be fetched"
                            );
                            continue;
                        }
                    };
                    let managed = is_image_managed(&image);
                    verdicts.insert(current.image.as_str(), managed);
                    managed
                }
            };

            if managed {
                tags.push(history.tag.clone());
            }
        }

        tags
    }

    /// Run a cluster write, repeating it while it is rejected with a conflict
    async fn with_conflict_retry<T, F, Fut>(
        &self,
        op: &str,
        mut attempt_fn: F,
    ) -> Result<T, RegistryError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, Attempt>>,
    {
        let mut attempt = 0;
        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(Attempt::Failed(e)) => return Err(e),
                Err(Attempt::Conflict(e)) if attempt < self.options.conflict_retries => {
                    attempt += 1;
                    debug!(
                        repository = %self.repository,
                        op,
                        attempt,
                        error = %e,
                        "Write conflicted, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
                Err(Attempt::Conflict(e)) => return Err(e.into()),
            }
        }
    }
}

/// Outcome of one write attempt
enum Attempt {
    Conflict(ClusterError),
    Failed(RegistryError),
}

impl From<RegistryError> for Attempt {
    fn from(err: RegistryError) -> Self {
        Self::Failed(err)
    }
}

#[async_trait]
impl TagService for TagBridge {
    async fn get(&self, tag: &str) -> Result<Descriptor, RegistryError> {
        let stream = self.stream().await?;
        let event = stream
            .latest_tagged_event(tag)
            .ok_or_else(|| RegistryError::TagUnknown {
                tag: tag.to_string(),
            })?;

        let digest = Digest::parse(&event.image)?;
        if !self.is_visible(digest.as_str()).await? {
            return Err(RegistryError::TagUnknown {
                tag: tag.to_string(),
            });
        }

        Ok(Descriptor::new(digest))
    }

    async fn all(&self) -> Result<Vec<String>, RegistryError> {
        let stream = self.stream().await?;
        Ok(self.visible_tags(&stream, None).await)
    }

    async fn lookup(&self, descriptor: &Descriptor) -> Result<Vec<String>, RegistryError> {
        let stream = self.stream().await?;
        Ok(self.visible_tags(&stream, Some(&descriptor.digest)).await)
    }

    async fn tag(&self, tag: &str, descriptor: &Descriptor) -> Result<(), RegistryError> {
        let stream = &self.stream().await?;

        self.with_conflict_retry("tag", move || async move {
            let mut image = self.image(&descriptor.digest).await?;
            image.metadata.resource_version = None;

            if !self.options.pullthrough && !is_image_managed(&image) {
                return Err(Attempt::Failed(RegistryError::RepositoryUnknown {
                    name: self.repository.clone(),
                }));
            }

            let mapping = StreamMapping::new(stream.namespace(), stream.name(), tag, image);
            match self.cluster.create_stream_mapping(&mapping).await {
                Ok(_) => Ok(()),
                Err(e) if e.is_quota_exceeded() => {
                    warn!(
                        repository = %self.repository,
                        tag,
                        error = %e,
                        "Tagging denied by quota"
                    );
                    Err(Attempt::Failed(RegistryError::AccessDenied))
                }
                Err(e) if e.is_conflict() => Err(Attempt::Conflict(e)),
                Err(e) => Err(Attempt::Failed(e.into())),
            }
        })
        .await?;

        info!(repository = %self.repository, tag, digest = %descriptor.digest, "Tagged image");
        Ok(())
    }

    async fn untag(&self, tag: &str) -> Result<(), RegistryError> {
        self.with_conflict_retry("untag", move || async move {
            let stream = self.stream().await?;
            let event = stream
                .latest_tagged_event(tag)
                .ok_or_else(|| RegistryError::TagUnknown {
                    tag: tag.to_string(),
                })?;

            if !self.is_visible(&event.image).await? {
                return Err(Attempt::Failed(RegistryError::TagUnknown {
                    tag: tag.to_string(),
                }));
            }

            match self
                .cluster
                .delete_stream_tag(stream.namespace(), &join_stream_tag(stream.name(), tag))
                .await
            {
                Ok(()) => Ok(()),
                Err(e) if e.is_conflict() => Err(Attempt::Conflict(e)),
                Err(e) => Err(Attempt::Failed(e.into())),
            }
        })
        .await?;

        info!(repository = %self.repository, tag, "Untagged image");
        Ok(())
    }
}
