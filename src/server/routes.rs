use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::error::{BillingError, Result};
use crate::models::InvoiceDraft;
use crate::security::Permission;
use crate::service::{LogsRequest, ResendRequest};

#[derive(Serialize)]
struct Success<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(flatten)]
    data: T,
}

fn success<T: Serialize>(message: Option<&'static str>, data: T) -> Response {
    Json(Success {
        success: true,
        message,
        data,
    })
    .into_response()
}

/// Bodies are JSON; an empty body reads as `{}`
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| BillingError::MalformedPayload(e.to_string()))
}

fn log_failure(function: &str, err: &BillingError) {
    if err.status_code().is_server_error() {
        error!(function, error = %err, "function failed");
    } else {
        info!(function, error = %err, "function rejected request");
    }
}

pub async fn generate_invoice(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    let result = async {
        state.guard.check(&headers, &body, Permission::InvoiceCreate)?;
        let draft: InvoiceDraft = parse_body(&body)?;
        state.services.generate_invoice(draft).await
    }
    .await;

    match result {
        Ok(generated) => Ok(success(Some("Invoice generated successfully"), generated)),
        Err(e) => {
            log_failure("generate-invoice", &e);
            Err(e)
        }
    }
}

pub async fn resend_invoice(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    let result = async {
        state.guard.check(&headers, &body, Permission::InvoiceResend)?;
        let request: ResendRequest = parse_body(&body)?;
        let invoice_id = request.invoice_id.unwrap_or_default();
        state
            .services
            .resend_invoice(&invoice_id, request.email_recipients)
            .await
    }
    .await;

    match result {
        Ok(outcome) => Ok(success(Some("Invoice resent successfully"), outcome)),
        Err(e) => {
            log_failure("resend-invoice", &e);
            Err(e)
        }
    }
}

pub async fn get_logs(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Response> {
    let result = async {
        state.guard.check(&headers, &body, Permission::LogsRead)?;
        let request: LogsRequest = parse_body(&body)?;
        state.services.get_logs(&request).await
    }
    .await;

    match result {
        Ok(page) => Ok(success(None, page)),
        Err(e) => {
            log_failure("get-logs", &e);
            Err(e)
        }
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
