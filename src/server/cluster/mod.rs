pub mod kubernetes;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use std::sync::Arc;

use crate::server::image::{Digest, Image, StreamMapping, TrackedStream};

pub use kubernetes::KubeClusterApi;

/// Error returned by the cluster API
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The API server answered with a failure status
    #[error("cluster API returned {code} {reason}: {message}")]
    Status {
        code: u16,
        reason: String,
        message: String,
    },
    #[error("cluster API request failed: {0}")]
    Transport(#[source] kube::Error),
    #[error("failed to decode {kind}: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ClusterError {
    pub fn status(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { code: 404, .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Status { code: 409, .. })
    }

    /// Quota admission rejects writes with 403 Forbidden and an "exceeded quota" message
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            Self::Status { code, message, .. } => {
                *code == 403 && message.contains("exceeded quota")
            }
            _ => false,
        }
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => Self::Status {
                code: response.code,
                reason: response.reason,
                message: response.message,
            },
            other => Self::Transport(other),
        }
    }
}

/// Source of the current state of a single tracked stream
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    async fn stream(&self) -> Result<TrackedStream, ClusterError>;
}

/// Cluster operations the tag services depend on
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_stream(&self, namespace: &str, name: &str)
        -> Result<TrackedStream, ClusterError>;

    async fn get_image(&self, digest: &Digest) -> Result<Image, ClusterError>;

    /// Point a tag of a stream at an image, recording a new history event
    async fn create_stream_mapping(&self, mapping: &StreamMapping) -> Result<(), ClusterError>;

    /// Delete the composite `<stream>:<tag>` resource
    async fn delete_stream_tag(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}

/// Reads a stream straight from the cluster API on every call
pub struct ClusterStreamAccessor {
    cluster: Arc<dyn ClusterApi>,
    namespace: String,
    name: String,
}

impl ClusterStreamAccessor {
    pub fn new(cluster: Arc<dyn ClusterApi>, namespace: &str, name: &str) -> Self {
        Self {
            cluster,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl StreamAccessor for ClusterStreamAccessor {
    async fn stream(&self) -> Result<TrackedStream, ClusterError> {
        self.cluster.get_stream(&self.namespace, &self.name).await
    }
}
