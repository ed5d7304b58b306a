use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Local};
use serde_json::json;
use thiserror::Error;

use crate::accounts::StoreError;
use crate::admission::Denial;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Token not found")]
    AuthMissing,
    #[error("Invalid token")]
    AuthInvalid,
    #[error("Credentials not found")]
    MissingCredentials,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Caller address not found")]
    AddressUnavailable,
    #[error("Route not found")]
    RouteNotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("You have been blocked from accessing the API routes (RATE LIMIT)")]
    RateLimited(Denial),
    #[error("Internal Server Error")]
    HandlerTimeout,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::AuthMissing | GatewayError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            GatewayError::AuthInvalid => StatusCode::FORBIDDEN,
            GatewayError::MissingCredentials | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::AddressUnavailable | GatewayError::HandlerTimeout | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

/// Local time as `H:M:S D/M/YYYY`, without zero padding.
pub fn format_retry_at(at: &DateTime<Local>) -> String {
    at.format("%-H:%-M:%-S %-d/%-m/%Y").to_string()
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            GatewayError::RateLimited(denial) => {
                let mut body = json!({
                    "status": false,
                    "error": self.to_string(),
                    "endAt": format_retry_at(&denial.retry_at),
                });
                if let Some(penalty) = denial.penalty {
                    body["duration"] = json!(format!("{}s", penalty.as_secs()));
                }
                body
            }
            GatewayError::HandlerTimeout => json!({
                "status": false,
                "message": self.to_string(),
            }),
            _ => json!({
                "status": false,
                "error": self.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}
