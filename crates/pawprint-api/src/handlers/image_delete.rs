use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::join_all;

use crate::error::{ErrorResponse, HttpAppError};
use crate::handlers::parse_owner;
use crate::state::AppState;

/// Remove an owner's profile image
///
/// Clears the record first; the previous original and renditions are then deleted
/// from the store on a best-effort basis.
#[utoipa::path(
    delete,
    path = "/{entity}/{id}/image",
    tag = "images",
    params(
        ("entity" = String, Path, description = "Owner collection: `users` or `dogs`"),
        ("id" = String, Path, description = "Owner id")
    ),
    responses(
        (status = 200, description = "Image removed"),
        (status = 404, description = "Owner not found", body = ErrorResponse),
        (status = 409, description = "Record changed concurrently", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Response, HttpAppError> {
    let owner = parse_owner(&entity, &id)?;

    let update = state
        .owners
        .records(owner.entity_type())
        .clear_images(owner.entity_id())
        .await?;

    let stale = update.stale_keys();
    let deletes = stale.iter().map(|key| {
        let storage = state.storage.clone();
        async move {
            if let Err(e) = storage.delete(key).await {
                tracing::warn!(key = %key, error = %e, "Failed to delete image object");
            }
        }
    });
    join_all(deletes).await;

    let message = if stale.is_empty() {
        "No image to delete"
    } else {
        "Image deleted"
    };
    tracing::info!(owner = %owner, deleted = stale.len(), "Profile image cleared");

    Ok(Json(serde_json::json!({ "data": "", "message": message })).into_response())
}
