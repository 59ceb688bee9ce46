//! OpenAPI documentation, served at `/api/openapi.json` and browsable at `/docs`.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use crate::services;
use pawprint_core::models;

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Pawprint Image API",
        version = "0.1.0",
        description = "Profile image uploads for users and dogs. Uploads are accepted \
                       immediately and resized into thumbnail, 720 and 1080 renditions \
                       by background workers."
    ),
    paths(
        handlers::image_upload::upload_image,
        handlers::image_delete::delete_image,
        handlers::image_get::get_image_by_key,
        handlers::jobs::get_job,
    ),
    components(schemas(
        error::ErrorResponse,
        services::UploadAccepted,
        models::UploadJob,
        models::JobStatus,
        models::OwnerEntityType,
    )),
    tags(
        (name = "images", description = "Profile image upload, fetch and removal"),
        (name = "jobs", description = "Resize job status")
    )
)]
pub struct ApiDoc;
