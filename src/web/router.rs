//! Router configuration for the web API.

use axum::{routing::get, Json, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use super::dto::{BucketResponse, FileEntryResponse};
use super::handlers::{
    self, create_bucket, delete_bucket, download_file, export_bucket, get_bucket, update_bucket,
    AppState,
};
use super::middleware::create_cors_layer;
use crate::bucket::{ArchiveRef, BucketPayload, FileRef};

/// OpenAPI document for the file bucket API.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::bucket::download_file,
        handlers::bucket::export_bucket,
        handlers::bucket::get_bucket,
        handlers::bucket::create_bucket,
        handlers::bucket::update_bucket,
        handlers::bucket::delete_bucket,
    ),
    components(schemas(BucketPayload, FileRef, ArchiveRef, BucketResponse, FileEntryResponse)),
    tags((name = "file_bucket", description = "Named file collections owned by a resource"))
)]
pub struct ApiDoc;

/// Create the main API router.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let bucket_routes = Router::new()
        .route("/file/:name", get(download_file))
        .route("/export", get(export_bucket))
        .route(
            "/file_bucket",
            get(get_bucket)
                .post(create_bucket)
                .put(update_bucket)
                .delete(delete_bucket),
        );

    let api_routes = Router::new()
        .nest("/resource/:owner_id", bucket_routes)
        .route("/openapi.json", get(openapi_json));

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins)),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

/// OpenAPI document handler.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
