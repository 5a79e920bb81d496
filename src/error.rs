use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::security::permissions::Permission;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("{0}")]
    Validation(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Insufficient permissions. Required: {0}")]
    Forbidden(Permission),

    #[error("Too many requests")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to send email: {0}")]
    Mail(String),

    #[error("Failed to render invoice: {0}")]
    Render(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = BillingError> = std::result::Result<T, E>;

impl BillingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BillingError::Validation(_) | BillingError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            BillingError::NotFound(_) => StatusCode::NOT_FOUND,
            BillingError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BillingError::Forbidden(_) => StatusCode::FORBIDDEN,
            BillingError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            BillingError::Database(_)
            | BillingError::Mail(_)
            | BillingError::Render(_)
            | BillingError::Serialization(_)
            | BillingError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BillingError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            BillingError::Forbidden(permission) => json!({
                "success": false,
                "error": self.to_string(),
                "required": permission.as_str(),
            }),
            _ => json!({
                "success": false,
                "error": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}
