use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use agora_ai::AiError;
use agora_db::DbError;
use agora_types::api::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid access token")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("assistant is not configured")]
    AiUnavailable,

    #[error("upstream service failed: {0}")]
    Upstream(String),

    #[error("database error: {0}")]
    Database(#[from] DbError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::AiUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AiError> for ApiError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::MissingApiKey => Self::AiUnavailable,
            AiError::InvalidRequest(msg) => Self::BadRequest(msg),
            other => Self::Upstream(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Database(e) => {
                error!("Database error: {}", e);
                "internal server error".to_string()
            }
            Self::Upstream(e) => {
                warn!("Upstream error: {}", e);
                self.to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_failures_are_500_without_details() {
        let err = ApiError::from(DbError::Status {
            status: 500,
            body: "secret table layout".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn ai_errors_map_to_client_or_gateway_status() {
        assert_eq!(ApiError::from(AiError::MissingApiKey).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(AiError::InvalidRequest("x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(AiError::EmptyResponse).status(), StatusCode::BAD_GATEWAY);
    }
}
