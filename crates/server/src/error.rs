use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use qhse_common::QhseError;
use serde_json::json;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Error returned by HTTP handlers, rendered as `{"error": "..."}`
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Upload exceeds the {} byte limit", limit),
        )
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<QhseError> for ApiError {
    fn from(err: QhseError) -> Self {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if err.is_client_error() || matches!(err, QhseError::ModelNotLoaded(_)) {
            return Self::new(status, err.to_string());
        }

        // Server-side details (paths, upstream errors) stay in the log
        error!("Request failed: {}", err);
        let message = match status {
            StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable",
            _ => INTERNAL_ERROR_MESSAGE,
        };
        Self::new(status, message)
    }
}

impl From<actix_multipart::MultipartError> for ApiError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        Self::bad_request(format!("Invalid multipart payload: {}", err))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status).json(json!({ "error": self.message }))
    }
}
