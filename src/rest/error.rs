//! REST API Error Types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::dto::ApiErrorDto;
use crate::error::{FailureKind, QueryError};
use crate::export::ExportError;

/// REST API error that can be returned from handlers
#[derive(Debug)]
pub struct RestError {
    pub status: StatusCode,
    pub error: ApiErrorDto,
}

impl RestError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: ApiErrorDto {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "success": false,
            "error": self.error
        }));
        (self.status, body).into_response()
    }
}

impl From<QueryError> for RestError {
    fn from(err: QueryError) -> Self {
        let status = match err.kind {
            FailureKind::UnsupportedSql => StatusCode::BAD_REQUEST,
            FailureKind::AccessDenied => StatusCode::FORBIDDEN,
            FailureKind::ModeRejected | FailureKind::Timeout | FailureKind::Execution => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        RestError::new(status, err.kind.code(), err.message)
    }
}

impl From<ExportError> for RestError {
    fn from(err: ExportError) -> Self {
        RestError::bad_request(err.to_string())
    }
}
