use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub const UPSTREAM_BLOCKED_MESSAGE: &str = "Server IP blocked by YouTube. Cookies required.";

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Failure surfaced to the caller as `{"error": ...}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn upstream_blocked() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: UPSTREAM_BLOCKED_MESSAGE.to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn missing_url() -> Self {
        Self::bad_request("No URL provided")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renders_error_envelope() {
        let response = ApiError::upstream_blocked().into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "error": "Server IP blocked by YouTube. Cookies required." })
        );
    }

    #[test]
    fn missing_url_is_a_bad_request() {
        let error = ApiError::missing_url();
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.message, "No URL provided");
    }
}
