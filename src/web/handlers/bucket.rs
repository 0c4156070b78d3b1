//! File bucket handlers.
//!
//! All routes live under `/api/resource/:owner_id`.

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;

use crate::archive;
use crate::bucket::BucketPayload;
use crate::web::dto::{ApiResponse, BucketResponse};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;

/// Generate a safe Content-Disposition header value for file downloads.
///
/// Control characters are dropped, quotes and backslashes replaced in the
/// plain `filename` parameter, and non-ASCII names additionally sent as an
/// RFC 5987 `filename*` parameter.
pub fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && sanitized == filename {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let encoded = urlencoding::encode(filename);
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

fn parse_payload(payload: Result<Json<BucketPayload>, JsonRejection>) -> Result<BucketPayload, ApiError> {
    payload
        .map(|Json(payload)| payload)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// GET /api/resource/:owner_id/file/:name - Download one entry.
#[utoipa::path(
    get,
    path = "/api/resource/{owner_id}/file/{name}",
    tag = "file_bucket",
    params(
        ("owner_id" = i64, Path, description = "Owning resource ID"),
        ("name" = String, Path, description = "Entry name")
    ),
    responses(
        (status = 200, description = "Entry content"),
        (status = 404, description = "Entry not found")
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path((owner_id, name)): Path<(i64, String)>,
) -> Result<Response, ApiError> {
    let store = state.store();
    let entry = store
        .lookup(owner_id, &name)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    let content = store.read(&entry)?;
    let content_type = HeaderValue::from_str(&entry.mime_type).unwrap_or_else(|_| {
        tracing::warn!(owner_id, name = %entry.name, "Stored mime type is not a valid header");
        HeaderValue::from_static("application/octet-stream")
    });

    let response = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&entry.name),
        )
        .header(header::CONTENT_LENGTH, content.len())
        .body(Body::from(content))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })?;

    Ok(response)
}

/// GET /api/resource/:owner_id/export - Download all entries as a zip.
#[utoipa::path(
    get,
    path = "/api/resource/{owner_id}/export",
    tag = "file_bucket",
    params(
        ("owner_id" = i64, Path, description = "Owning resource ID")
    ),
    responses(
        (status = 200, description = "Zip archive of all entries"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn export_bucket(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<i64>,
) -> Result<Response, ApiError> {
    let store = state.store();
    if !store.exists(owner_id).await? {
        return Err(ApiError::not_found("Bucket not found"));
    }

    let entries = store.enumerate(owner_id).await?;
    tracing::info!(owner_id, files = entries.len(), "Exporting bucket");
    let stream = archive::encode_stream(store.export_entries(&entries));

    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{owner_id}.zip\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}

/// GET /api/resource/:owner_id/file_bucket - List the bucket's entries.
#[utoipa::path(
    get,
    path = "/api/resource/{owner_id}/file_bucket",
    tag = "file_bucket",
    params(
        ("owner_id" = i64, Path, description = "Owning resource ID")
    ),
    responses(
        (status = 200, description = "Bucket entries", body = BucketResponse),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn get_bucket(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<i64>,
) -> Result<Json<ApiResponse<BucketResponse>>, ApiError> {
    let store = state.store();
    if !store.exists(owner_id).await? {
        return Err(ApiError::not_found("Bucket not found"));
    }

    let entries = store.enumerate(owner_id).await?;
    Ok(Json(ApiResponse::new(BucketResponse::new(owner_id, &entries))))
}

/// POST /api/resource/:owner_id/file_bucket - Create the bucket.
///
/// Request body: `{"files": [...]}` or `{"archive": {"id": ...}}`.
#[utoipa::path(
    post,
    path = "/api/resource/{owner_id}/file_bucket",
    tag = "file_bucket",
    params(
        ("owner_id" = i64, Path, description = "Owning resource ID")
    ),
    request_body = BucketPayload,
    responses(
        (status = 201, description = "Bucket created", body = BucketResponse),
        (status = 409, description = "Bucket already exists"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn create_bucket(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<i64>,
    payload: Result<Json<BucketPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<BucketResponse>>), ApiError> {
    let source = parse_payload(payload)?.into_source()?;

    let entries = state
        .store()
        .create(owner_id, source, state.uploads.as_ref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(BucketResponse::new(owner_id, &entries))),
    ))
}

/// PUT /api/resource/:owner_id/file_bucket - Replace the bucket's entries.
#[utoipa::path(
    put,
    path = "/api/resource/{owner_id}/file_bucket",
    tag = "file_bucket",
    params(
        ("owner_id" = i64, Path, description = "Owning resource ID")
    ),
    request_body = BucketPayload,
    responses(
        (status = 200, description = "Bucket updated", body = BucketResponse),
        (status = 404, description = "Bucket not found"),
        (status = 422, description = "Invalid payload")
    )
)]
pub async fn update_bucket(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<i64>,
    payload: Result<Json<BucketPayload>, JsonRejection>,
) -> Result<Json<ApiResponse<BucketResponse>>, ApiError> {
    let source = parse_payload(payload)?.into_source()?;

    let entries = state
        .store()
        .update(owner_id, source, state.uploads.as_ref())
        .await?;

    Ok(Json(ApiResponse::new(BucketResponse::new(owner_id, &entries))))
}

/// DELETE /api/resource/:owner_id/file_bucket - Delete the bucket.
#[utoipa::path(
    delete,
    path = "/api/resource/{owner_id}/file_bucket",
    tag = "file_bucket",
    params(
        ("owner_id" = i64, Path, description = "Owning resource ID")
    ),
    responses(
        (status = 200, description = "Bucket deleted"),
        (status = 404, description = "Bucket not found")
    )
)]
pub async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<i64>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.store().delete(owner_id).await?;

    Ok(Json(ApiResponse::new(())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_header_simple_ascii() {
        let result = content_disposition_header("rose.flw");
        assert_eq!(result, "attachment; filename=\"rose.flw\"");
    }

    #[test]
    fn test_content_disposition_header_with_spaces() {
        let result = content_disposition_header("my document.txt");
        assert_eq!(result, "attachment; filename=\"my document.txt\"");
    }

    #[test]
    fn test_content_disposition_header_japanese() {
        let result = content_disposition_header("日本語ファイル.txt");
        assert!(result.starts_with("attachment; filename=\""));
        assert!(result.contains("filename*=UTF-8''"));
        assert!(result.contains("%E6%97%A5%E6%9C%AC%E8%AA%9E"));
    }

    #[test]
    fn test_content_disposition_header_double_quote() {
        let result = content_disposition_header("test\"file.txt");
        assert!(result.contains("filename=\"test_file.txt\""));
        assert!(result.contains("%22"));
    }

    #[test]
    fn test_content_disposition_header_control_characters() {
        let result = content_disposition_header("test\r\nX-Injected: bad.txt");
        assert!(!result.contains('\r'));
        assert!(!result.contains('\n'));
        assert!(result.starts_with("attachment; filename="));
    }
}
