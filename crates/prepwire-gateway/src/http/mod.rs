pub mod sessions;
pub mod status;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use prepwire_core::PrepwireError;

/// Wrapper so `PrepwireError` can flow straight out of handlers as the
/// standard error envelope.
pub struct ApiError(pub PrepwireError);

impl From<PrepwireError> for ApiError {
    fn from(e: PrepwireError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Caller identity: the transport layer upstream authenticates and
/// forwards the stable user id. A missing header is a bad request,
/// not an ownership failure.
pub fn caller_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            ApiError(PrepwireError::Validation(
                "missing x-user-id header".to_string(),
            ))
        })
}
