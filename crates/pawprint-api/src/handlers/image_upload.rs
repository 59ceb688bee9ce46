use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{ErrorResponse, HttpAppError};
use crate::handlers::parse_owner;
use crate::services::{UploadAccepted, UploadIntake};
use crate::state::AppState;

/// Upload a profile image for a user or a dog
///
/// The multipart field name must equal the entity segment (`users` or `dogs`). Each
/// accepted file is stored and gets its own resize job; the response carries the job
/// ids without waiting for the renditions.
#[utoipa::path(
    post,
    path = "/{entity}/{id}/image",
    tag = "images",
    params(
        ("entity" = String, Path, description = "Owner collection: `users` or `dogs`"),
        ("id" = String, Path, description = "Owner id")
    ),
    request_body(content = inline(Object), content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Upload accepted for processing", body = UploadAccepted),
        (status = 400, description = "No supported image or too many files", body = ErrorResponse),
        (status = 404, description = "Owner not found", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path((entity, id)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<Response, HttpAppError> {
    let owner = parse_owner(&entity, &id)?;
    let intake = UploadIntake::new(&state);

    intake.ensure_owner(&owner).await?;
    let files = intake.extract_files(&owner, multipart).await?;
    let accepted = intake.accept(&owner, files).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "data": accepted,
            "message": "Image upload accepted for processing",
        })),
    )
        .into_response())
}
