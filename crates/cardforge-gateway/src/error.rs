use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use cardforge_core::error::CardforgeError;

/// Error returned by a handler.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Run(CardforgeError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Run(e) if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Run(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CardforgeError> for ApiError {
    fn from(e: CardforgeError) -> Self {
        ApiError::Run(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::BadRequest(message) => serde_json::json!({ "error": message }),
            ApiError::Run(e) => {
                error!(error = %e, "Request failed");
                serde_json::json!({
                    "error": e.to_string(),
                    "step": e.failed_step(),
                })
            }
        };
        (status, Json(body)).into_response()
    }
}
