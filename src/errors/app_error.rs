use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::Error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("{0}")]
    Internal(String),

    #[error("{message}")]
    InvalidBody { status: StatusCode, message: String },
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidBody { status, .. } => *status,
        }
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let detail = err.to_string();
        match err {
            Error::RejectedEmpty => AppError::BadRequest(detail),
            Error::InvalidParameter(_) => AppError::Validation(detail),
            Error::ServiceUnavailable(_) => AppError::ServiceUnavailable(detail),
            Error::ModelLoad(_) => AppError::ServiceUnavailable(detail),
            Error::GenerationFailed(_) => AppError::Internal(detail),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidBody {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "detail": self.to_string() }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReadinessState;

    #[test]
    fn test_domain_errors_map_to_stable_statuses() {
        let cases = [
            (Error::RejectedEmpty, StatusCode::BAD_REQUEST),
            (
                Error::InvalidParameter("num_beams must be at least 1".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                Error::ServiceUnavailable(ReadinessState::Loading),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::ModelLoad("network down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                Error::GenerationFailed("shape mismatch".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_detail_keeps_underlying_message() {
        let app_error = AppError::from(Error::GenerationFailed("CUDA out of memory".into()));
        assert_eq!(
            app_error.to_string(),
            "Error during paraphrasing: CUDA out of memory"
        );

        let empty = AppError::from(Error::RejectedEmpty);
        assert!(empty.to_string().contains("cannot be empty"));
    }
}
