use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::server::cluster::ClusterError;
use crate::server::image::ReferenceError;

/// Errors surfaced by the tag services.
///
/// The type is cheap to clone so that a repository-level failure recorded once
/// can be handed back unchanged to every later caller (see
/// [`crate::server::tags::pending`]). Cluster failures are shared behind an
/// `Arc`, so clones of a recorded error point at the same underlying instance.
///
/// Converted into a registry protocol error body when returned from a handler:
///
/// ```json
/// {"errors": [{"code": "NAME_UNKNOWN", "message": "...", "detail": {...}}]}
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// The backing stream is unavailable, or a managed-only write targeted an unmanaged image
    #[error("repository name not known to registry: {name}")]
    RepositoryUnknown { name: String },
    /// The tag is absent from the history, or hidden because it points at an unmanaged image
    #[error("unknown tag={tag}")]
    TagUnknown { tag: String },
    #[error("access denied")]
    AccessDenied,
    #[error("{0}")]
    InvalidDigest(#[from] ReferenceError),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Cluster(Arc<ClusterError>),
}

impl From<ClusterError> for RegistryError {
    fn from(err: ClusterError) -> Self {
        Self::Cluster(Arc::new(err))
    }
}

impl RegistryError {
    /// Registry protocol error code and HTTP status
    pub fn code(&self) -> (&'static str, StatusCode) {
        match self {
            Self::RepositoryUnknown { .. } => ("NAME_UNKNOWN", StatusCode::NOT_FOUND),
            Self::TagUnknown { .. } => ("MANIFEST_UNKNOWN", StatusCode::NOT_FOUND),
            Self::AccessDenied => ("DENIED", StatusCode::FORBIDDEN),
            Self::InvalidDigest(_) => ("DIGEST_INVALID", StatusCode::BAD_REQUEST),
            Self::Unsupported(_) => ("UNSUPPORTED", StatusCode::METHOD_NOT_ALLOWED),
            Self::Cluster(_) => ("UNKNOWN", StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn detail(&self) -> serde_json::Value {
        match self {
            Self::RepositoryUnknown { name } => json!({ "name": name }),
            Self::TagUnknown { tag } => json!({ "tag": tag }),
            _ => serde_json::Value::Null,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let (code, status) = self.code();

        // Log server errors with the full chain; client errors are expected traffic
        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                code,
                error = ?self,
                "Registry error"
            );
        } else {
            tracing::debug!(status = status.as_u16(), code, error = %self, "Registry client error");
        }

        let message = match &self {
            // Do not leak cluster internals to registry clients
            Self::Cluster(_) => "unknown error".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "errors": [{
                "code": code,
                "message": message,
                "detail": self.detail(),
            }]
        }));

        (status, body).into_response()
    }
}
