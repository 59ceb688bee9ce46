use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use pawprint_core::AppError;
use pawprint_storage::keys::validate_key;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ImageKeyQuery {
    /// Object key of an original or a rendition
    key: Option<String>,
}

/// Redirect to a short-lived read URL for a stored image
#[utoipa::path(
    get,
    path = "/images",
    tag = "images",
    params(ImageKeyQuery),
    responses(
        (status = 302, description = "Redirect to a presigned URL"),
        (status = 400, description = "Missing or invalid key", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, query))]
pub async fn get_image_by_key(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImageKeyQuery>,
) -> Result<Response, HttpAppError> {
    let key = query
        .key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Query parameter 'key' is required".to_string()))?;
    validate_key(&key)?;

    let ttl = Duration::from_secs(state.config.presign_ttl_secs());
    let url = state.storage.presign(&key, ttl).await?;
    tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Presigned image URL");

    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}
