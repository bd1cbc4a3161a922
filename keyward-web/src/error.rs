//! HTTP error mapping
//!
//! Token, credential and permission failures all collapse to the same 401 so
//! a client cannot tell which stage rejected it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use keyward_core::KeywardError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] KeywardError);

impl ApiError {
    pub fn validation(message: impl Into<String>, field: &str) -> Self {
        Self(KeywardError::validation(message, Some(field)))
    }

    pub fn inner(&self) -> &KeywardError {
        &self.0
    }
}

/// Body and status of every rejected credential
pub fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "unauthorized" })),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0.log();

        if self.0.is_auth_failure() {
            return unauthorized_response();
        }

        let (status, body) = match &self.0 {
            KeywardError::Validation { message, field } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": "validation_failed",
                    "message": message,
                    "field": field,
                }),
            ),
            KeywardError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "not_found",
                    "message": format!("{} not found", resource),
                }),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "internal_error",
                    "message": "Internal server error",
                }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let status = |e: KeywardError| ApiError::from(e).into_response().status();

        assert_eq!(status(KeywardError::invalid_token("expired")), StatusCode::UNAUTHORIZED);
        assert_eq!(status(KeywardError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(KeywardError::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(KeywardError::validation("role name is empty", Some("name"))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(KeywardError::not_found("role 'x'")), StatusCode::NOT_FOUND);
        assert_eq!(
            status(KeywardError::invalid_configuration("no keys")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
