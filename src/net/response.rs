use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::error::Error;

/// JSON body returned for every failed request
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
}

pub struct ResponseError(Response);

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        self.0
    }
}

impl From<Error> for ResponseError {
    fn from(value: Error) -> Self {
        let (status, summary) = match &value {
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "Not found"),
            Error::Forbidden(_) => (StatusCode::FORBIDDEN, "Access denied"),
            Error::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "Conflict"),
            Error::Gpx(_) => (StatusCode::BAD_REQUEST, "Invalid GPX"),
            Error::Upstream(_) => (StatusCode::BAD_GATEWAY, "Upstream failure"),
            Error::Database(_) | Error::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        if status.is_server_error() {
            error!("request failed: {value:?}");
        }
        ResponseError::with_status(
            status,
            Json(ErrorBody {
                error: summary.to_string(),
                details: value.to_string(),
            }),
        )
    }
}

impl From<MultipartError> for ResponseError {
    fn from(value: MultipartError) -> Self {
        Error::Validation(value.to_string()).into()
    }
}

impl ResponseError {
    pub fn with_status<T>(status_code: StatusCode, data: T) -> Self
    where
        (StatusCode, T): IntoResponse,
    {
        ResponseError((status_code, data).into_response())
    }

    pub fn bad_request(details: impl Into<String>) -> Self {
        Error::Validation(details.into()).into()
    }
}

pub type Result<T, E = ResponseError> = axum::response::Result<T, E>;
