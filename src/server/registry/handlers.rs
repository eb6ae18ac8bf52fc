use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::models::TagListResponse;
use crate::server::error::RegistryError;
use crate::server::image::Digest;
use crate::server::state::AppState;
use crate::server::tags::PendingErrors;

/// Remember a missing repository so that later calls of the same request fail fast
fn remember<T>(
    pending: &PendingErrors,
    repository: &str,
    result: Result<T, RegistryError>,
) -> Result<T, RegistryError> {
    if let Err(err @ RegistryError::RepositoryUnknown { .. }) = &result {
        pending.record(repository, err.clone());
    }
    result
}

/// Registry API version check
pub async fn api_version() -> Json<serde_json::Value> {
    Json(serde_json::json!({}))
}

/// List the tags of a repository
pub async fn list_tags(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<TagListResponse>, RegistryError> {
    let repository = format!("{}/{}", namespace, name);
    let pending = state.pending_errors();
    let service = state.tag_service(&namespace, &name, Arc::clone(&pending));

    let tags = remember(&pending, &repository, service.all().await)?;
    Ok(Json(TagListResponse {
        name: repository,
        tags,
    }))
}

/// Delete a manifest by tag. Deleting by digest is not supported.
pub async fn delete_manifest(
    State(state): State<AppState>,
    Path((namespace, name, reference)): Path<(String, String, String)>,
) -> Result<StatusCode, RegistryError> {
    if reference.contains(':') {
        let digest = Digest::parse(&reference)?;
        return Err(RegistryError::Unsupported(format!(
            "deleting manifest {} by digest",
            digest
        )));
    }

    let repository = format!("{}/{}", namespace, name);
    let pending = state.pending_errors();
    let service = state.tag_service(&namespace, &name, Arc::clone(&pending));
    remember(&pending, &repository, service.untag(&reference).await)?;

    tracing::info!(repository = %repository, tag = %reference, "Untagged manifest");
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::cluster::fake::{digest, image, FakeCluster, StreamBuilder};
    use crate::server::image::StreamMapping;
    use crate::server::settings::{
        ClusterSettings, PendingErrorSettings, RegistrySettings, ServerSettings, Settings,
    };
    use axum::body::Body;
    use axum::http::{Method, Request};
    use axum::response::Response;
    use tower::ServiceExt;

    fn settings(pullthrough: bool) -> Settings {
        Settings {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 5000,
            },
            registry: RegistrySettings {
                local_hostname: "registry.local:5000".to_string(),
                pullthrough,
                conflict_retries: 3,
            },
            cluster: ClusterSettings::default(),
            pending_errors: PendingErrorSettings::default(),
        }
    }

    fn cluster() -> Arc<FakeCluster> {
        let stream = StreamBuilder::new("team", "app")
            .history("managed", &[("registry.local:5000/team/app:managed", &digest(1))])
            .history("external", &[("quay.io/org/app:1", &digest(2))])
            .build();
        Arc::new(
            FakeCluster::new()
                .with_stream(stream)
                .with_image(image(&digest(1), true))
                .with_image(image(&digest(2), false)),
        )
    }

    async fn send(state: AppState, method: Method, uri: &str) -> Response {
        crate::server::registry::routes()
            .with_state(state)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_api_version() {
        let state = AppState::new(settings(true), cluster());
        let response = send(state, Method::GET, "/v2/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_list_tags_hides_unmanaged_images() {
        let state = AppState::new(settings(false), cluster());
        let response = send(state, Method::GET, "/v2/team/app/tags/list").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: TagListResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.name, "team/app");
        assert_eq!(body.tags, vec!["managed"]);
    }

    #[tokio::test]
    async fn test_list_tags_with_pullthrough() {
        let state = AppState::new(settings(true), cluster());
        let response = send(state, Method::GET, "/v2/team/app/tags/list").await;

        let body: TagListResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.tags, vec!["managed", "external"]);
    }

    #[tokio::test]
    async fn test_unknown_repository_is_found_once_created() {
        let cluster = cluster();
        let state = AppState::new(settings(true), cluster.clone());

        let response = send(state.clone(), Method::GET, "/v2/team/late/tags/list").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["code"], "NAME_UNKNOWN");
        assert_eq!(cluster.calls("get_stream"), 1);

        cluster.add_stream(
            StreamBuilder::new("team", "late")
                .history("v1", &[("quay.io/org/late:v1", &digest(2))])
                .build(),
        );

        let response = send(state, Method::GET, "/v2/team/late/tags/list").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: TagListResponse = serde_json::from_value(body_json(response).await).unwrap();
        assert_eq!(body.tags, vec!["v1"]);
        assert_eq!(cluster.calls("get_stream"), 2);
    }

    #[tokio::test]
    async fn test_unknown_repository_is_remembered_within_request() {
        let cluster = cluster();
        let state = AppState::new(settings(true), cluster.clone());
        let pending = state.pending_errors();
        let service = state.tag_service("team", "missing", Arc::clone(&pending));

        let first = remember(&pending, "team/missing", service.all().await);
        assert!(matches!(first, Err(RegistryError::RepositoryUnknown { .. })));
        assert!(matches!(
            service.get("latest").await,
            Err(RegistryError::RepositoryUnknown { .. })
        ));
        assert_eq!(cluster.calls("get_stream"), 1);

        let other = state.tag_service("team", "missing", state.pending_errors());
        assert!(other.all().await.is_err());
        assert_eq!(cluster.calls("get_stream"), 2);
    }

    #[tokio::test]
    async fn test_delete_by_tag_untags() {
        let cluster = cluster();
        cluster.insert_mapping(StreamMapping::new(
            "team",
            "app",
            "managed",
            image(&digest(1), true),
        ));
        let state = AppState::new(settings(false), cluster.clone());

        let response = send(state, Method::DELETE, "/v2/team/app/manifests/managed").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(cluster.mapping("team", "app:managed").is_none());
    }

    #[tokio::test]
    async fn test_delete_unknown_tag() {
        let state = AppState::new(settings(false), cluster());
        let response = send(state, Method::DELETE, "/v2/team/app/manifests/nope").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["errors"][0]["code"], "MANIFEST_UNKNOWN");
    }

    #[tokio::test]
    async fn test_delete_by_digest_is_unsupported() {
        let state = AppState::new(settings(true), cluster());
        let uri = format!("/v2/team/app/manifests/{}", digest(1));
        let response = send(state.clone(), Method::DELETE, &uri).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(response).await["errors"][0]["code"], "UNSUPPORTED");

        let response = send(state, Method::DELETE, "/v2/team/app/manifests/sha256:zz").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["errors"][0]["code"], "DIGEST_INVALID");
    }
}
