//! HTTP error response conversion
//!
//! Handlers return `Result<Response, HttpAppError>`. Every domain error converts into
//! [`AppError`] first so status, body and log level come from one place.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pawprint_core::{AppError, Config, ErrorMetadata, LogLevel, PipelineError};
use pawprint_storage::StorageError;
use serde::Serialize;
use std::sync::OnceLock;
use utoipa::ToSchema;

/// Whether error bodies omit `details`. Set once from the loaded [`Config`].
static HIDE_ERROR_DETAILS: OnceLock<bool> = OnceLock::new();

/// Production deployments never return error details. The first call wins.
pub fn configure_error_details(config: &Config) {
    let _ = HIDE_ERROR_DETAILS.set(config.is_production());
}

/// Body of every failed request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Always empty on failure
    pub data: String,
    pub message: String,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether retrying the same request can succeed
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Wrapper type for AppError to implement IntoResponse
/// This is necessary because of Rust's orphan rules - we can't implement
/// IntoResponse (external trait) for AppError (external type from pawprint-core)
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError(AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        })
    }
}

impl From<PipelineError> for HttpAppError {
    fn from(err: PipelineError) -> Self {
        HttpAppError(err.into())
    }
}

fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type = error_type, "Request failed");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type = error_type, "Request failed");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, error_type = error_type, "Request failed");
        }
    }
}

fn error_details(app_error: &AppError, hide_details: bool) -> Option<String> {
    if hide_details || app_error.is_sensitive() {
        None
    } else {
        Some(app_error.detailed_message())
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;

        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        let hide_details = HIDE_ERROR_DETAILS.get().copied().unwrap_or(false);
        let details = error_details(app_error, hide_details);

        let body = ErrorResponse {
            data: String::new(),
            message: app_error.client_message(),
            code: app_error.error_code().to_string(),
            recoverable: app_error.is_recoverable(),
            suggested_action: app_error.suggested_action().map(String::from),
            details,
        };

        (status, Json(body)).into_response()
    }
}

// Storage errors convert here rather than in their crate so the HTTP mapping stays local.

impl From<StorageError> for HttpAppError {
    fn from(err: StorageError) -> Self {
        let app = match err {
            StorageError::NotFound(msg) => AppError::NotFound(msg),
            StorageError::UploadFailed(msg)
            | StorageError::DownloadFailed(msg)
            | StorageError::DeleteFailed(msg)
            | StorageError::BackendError(msg) => AppError::Storage(msg),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::IoError(err) => AppError::Internal(format!("IO error: {}", err)),
            StorageError::ConfigError(msg) => AppError::Internal(msg),
        };
        HttpAppError(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use pawprint_core::models::OwnerEntityType;

    async fn render(err: HttpAppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn not_found_renders_envelope() {
        let (status, body) =
            render(AppError::NotFound("dog not found: d9".to_string()).into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["data"], "");
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["message"], "dog not found: d9");
    }

    #[tokio::test]
    async fn sensitive_errors_hide_details() {
        let (status, body) =
            render(AppError::Storage("bucket policy denied".to_string()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "STORAGE_ERROR");
        assert!(body.get("details").is_none());
        assert!(!body["message"]
            .as_str()
            .unwrap()
            .contains("bucket policy denied"));
    }

    #[test]
    fn details_follow_environment_and_sensitivity() {
        let not_found = AppError::NotFound("dog not found: d9".to_string());
        assert!(error_details(&not_found, false).is_some());
        assert!(error_details(&not_found, true).is_none());

        let storage = AppError::Storage("bucket policy denied".to_string());
        assert!(error_details(&storage, false).is_none());
    }

    #[test]
    fn invalid_key_maps_to_invalid_input() {
        let err: HttpAppError = StorageError::InvalidKey("..".to_string()).into();
        let HttpAppError(app_err) = err;
        assert_eq!(app_err.http_status_code(), 400);
        assert_eq!(app_err.error_code(), "INVALID_INPUT");
    }

    #[test]
    fn missing_owner_maps_to_not_found() {
        let err: HttpAppError = PipelineError::OwnerNotFound {
            entity: OwnerEntityType::User,
            id: "u1".to_string(),
        }
        .into();
        assert_eq!(err.0.http_status_code(), 404);
        assert_eq!(err.0.client_message(), "user not found: u1");
    }
}
