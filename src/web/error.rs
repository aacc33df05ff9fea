// Error types for the API server

use crate::error::{EnhanceError, ErrorKind};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// API server error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    InternalServerError(String),
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            Self::BadRequest(msg)
            | Self::InternalServerError(msg)
            | Self::ServiceUnavailable(msg) => msg,
        };

        let body = Json(json!({
            "error": {
                "status": status.as_u16(),
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

// Unavailable capabilities are the only pipeline outcome that is not a 500
impl From<EnhanceError> for ApiError {
    fn from(error: EnhanceError) -> Self {
        match error.kind() {
            ErrorKind::CapabilityUnavailable => Self::ServiceUnavailable(error.to_string()),
            ErrorKind::Decode | ErrorKind::Inference | ErrorKind::Internal => {
                Self::InternalServerError(error.to_string())
            }
        }
    }
}
