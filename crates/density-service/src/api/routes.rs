use crate::error::ApiError;
use crate::media::Upload;
use crate::state::DensityServiceState;
use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::density::{FrameResult, SeriesResult};
use serde::Deserialize;
use serde_json::json;

/// Multipart field names accepted for the uploaded file
const UPLOAD_FIELDS: [&str; 2] = ["file", "image"];

#[derive(Debug, Deserialize)]
pub struct SeriesParams {
    pub max_seconds: Option<i64>,
}

/// Count people in an uploaded image, or in the first frame of a video
pub async fn count(
    State(state): State<DensityServiceState>,
    multipart: Multipart,
) -> Result<Json<FrameResult>, ApiError> {
    let upload = read_upload(multipart).await?;
    Ok(Json(state.count(&upload).await))
}

/// Per-second density series over an uploaded video
pub async fn count_series(
    State(state): State<DensityServiceState>,
    Query(params): Query<SeriesParams>,
    multipart: Multipart,
) -> Result<Json<SeriesResult>, ApiError> {
    let max_seconds = match params.max_seconds {
        None => state.default_max_seconds(),
        Some(n) if n >= 1 => u32::try_from(n).unwrap_or(u32::MAX),
        Some(n) => {
            return Err(ApiError::bad_request(format!(
                "max_seconds must be at least 1, got {}",
                n
            )))
        }
    };

    let upload = read_upload(multipart).await?;
    Ok(Json(state.count_series(&upload, max_seconds).await))
}

/// Pull the first upload field out of a multipart body
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        let is_upload = field
            .name()
            .is_some_and(|name| UPLOAD_FIELDS.contains(&name));
        if !is_upload {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await?;

        tracing::debug!(
            filename = filename.as_deref().unwrap_or_default(),
            content_type = content_type.as_deref().unwrap_or_default(),
            size_bytes = bytes.len(),
            "Received upload"
        );

        return Ok(Upload {
            bytes: bytes.to_vec(),
            filename,
            content_type,
        });
    }

    Err(ApiError::bad_request(
        "multipart body has no 'file' or 'image' field",
    ))
}

/// Detector metadata
pub async fn detector_info(State(state): State<DensityServiceState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.detector_info().await))
}

/// Health check endpoint
pub async fn healthz(State(state): State<DensityServiceState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "density-service",
            "node_id": state.node_id(),
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<DensityServiceState>) -> impl IntoResponse {
    let info = state.detector_info().await;

    if state.detector_healthy().await {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "detector": info.id,
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "detector": info.id,
            })),
        )
    }
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}
