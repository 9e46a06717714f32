//! Error responses
//!
//! Every failure leaves the server as
//! `{"error": {"category": "...", "message": "..."}}` with a status code
//! chosen by category.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use evo_core::{ErrorCategory, EvoError};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub struct ApiError(pub EvoError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::CapacityLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCategory::TransientService => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<EvoError> for ApiError {
    fn from(err: EvoError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(EvoError::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(EvoError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let category = self.0.category();

        if category == ErrorCategory::TransientService {
            error!("Request failed: {}", self.0);
        }

        let body = json!({
            "error": {
                "category": category,
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_by_category() {
        assert_eq!(
            ApiError(EvoError::validation("missing filePath")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError(EvoError::AgentNotFound("agent-1".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError(EvoError::Busy("agent-1".into())).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError(EvoError::Storage("locked".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
