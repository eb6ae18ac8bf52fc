use super::handlers;
use crate::server::state::AppState;
use axum::{
    routing::{delete, get},
    Router,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v2/", get(handlers::api_version))
        .route("/v2/{namespace}/{name}/tags/list", get(handlers::list_tags))
        .route(
            "/v2/{namespace}/{name}/manifests/{reference}",
            delete(handlers::delete_manifest),
        )
}
