use actix_web::error::{BlockingError, JsonPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use shared::{ErrorResponse, ErrorType, InternalErrorResponse};

use crate::services::{ClassificationFailure, FailureKind};

/// Everything a handler can fail with. Client and model failures keep the
/// `{success, error, error_type}` body; anything else becomes a plain 500.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Classification(#[from] ClassificationFailure),
    #[error("{0}")]
    Internal(String),
}

impl From<BlockingError> for ApiError {
    fn from(e: BlockingError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<actix_multipart::MultipartError> for ApiError {
    fn from(e: actix_multipart::MultipartError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Classification(f) => match f.kind {
                FailureKind::Validation => StatusCode::BAD_REQUEST,
                FailureKind::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                FailureKind::Inference => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        match self {
            ApiError::BadRequest(message) => builder.json(ErrorResponse {
                success: false,
                error: message.clone(),
                error_type: ErrorType::ValidationError,
            }),
            ApiError::Classification(f) => builder.json(ErrorResponse {
                success: false,
                error: f.message.clone(),
                error_type: f.error_type(),
            }),
            ApiError::Internal(detail) => {
                log::error!("Unhandled exception: {}", detail);
                builder.json(InternalErrorResponse {
                    success: false,
                    error: "Internal server error".to_string(),
                    detail: detail.clone(),
                })
            }
        }
    }
}

/// Malformed or mistyped JSON bodies are validation failures.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::warn!("Rejected request body: {}", err);
    ApiError::BadRequest(err.to_string()).into()
}
