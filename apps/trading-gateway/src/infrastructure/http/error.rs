//! HTTP mapping of [`GatewayError`].

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::error::GatewayError;

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    message: String,
}

/// Status code for an error category.
#[must_use]
pub const fn status_for(error: &GatewayError) -> StatusCode {
    match error {
        GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
        GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
        GatewayError::AlreadyExists(_) => StatusCode::CONFLICT,
        GatewayError::LimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            tracing::warn!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Turn an extractor rejection into a validation error.
pub fn rejected(rejection: impl std::fmt::Display) -> GatewayError {
    GatewayError::validation(rejection.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::to_bytes;
    use test_case::test_case;

    use super::*;
    use crate::domain::error::BackendError;

    #[test_case(GatewayError::validation("x"), StatusCode::BAD_REQUEST)]
    #[test_case(GatewayError::session_not_found("s"), StatusCode::NOT_FOUND)]
    #[test_case(GatewayError::AlreadyExists("x".into()), StatusCode::CONFLICT)]
    #[test_case(GatewayError::LimitExceeded("x".into()), StatusCode::TOO_MANY_REQUESTS)]
    #[test_case(GatewayError::Timeout(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT)]
    #[test_case(BackendError::Unavailable("x".into()).into(), StatusCode::BAD_GATEWAY)]
    #[test_case(GatewayError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn statuses(error: GatewayError, expected: StatusCode) {
        assert_eq!(status_for(&error), expected);
    }

    #[tokio::test]
    async fn body_carries_code_and_message() {
        let response = GatewayError::session_not_found("abc").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert!(json["error"]["message"].as_str().unwrap().contains("abc"));
    }
}
