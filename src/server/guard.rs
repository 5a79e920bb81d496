use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::Utc;
use tracing::warn;

use crate::config::Config;
use crate::error::{BillingError, Result};
use crate::security::hmac::verify_signature;
use crate::security::permissions::{self, Permission, Role};
use crate::security::{ApiKeyValidator, RateLimiter};

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const INVOICE_SIGNATURE_HEADER: &str = "x-invoice-signature";

/// Per-request checks run before any function body is looked at:
/// rate limit, then signature, then permission.
pub struct RequestGuard {
    limiter: Arc<RateLimiter>,
    max_requests: usize,
    window: Duration,
    signing: Option<Signing>,
    role: Role,
}

struct Signing {
    secret: String,
    validator: ApiKeyValidator,
}

impl RequestGuard {
    pub fn new(role: Role, max_requests: usize, window: Duration, secret: Option<String>, tolerance: Duration) -> Self {
        let signing = secret.filter(|s| !s.is_empty()).map(|secret| Signing {
            validator: ApiKeyValidator::new(secret.clone(), tolerance),
            secret,
        });

        Self {
            limiter: Arc::new(RateLimiter::new()),
            max_requests,
            window,
            signing,
            role,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.api_role()?,
            config.rate_limit_max,
            config.rate_limit_window(),
            config.hmac_secret.clone(),
            Duration::from_secs(config.signature_tolerance_secs),
        ))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn check(&self, headers: &HeaderMap, body: &[u8], permission: Permission) -> Result<()> {
        let caller = caller_id(headers);
        if !self.limiter.is_allowed(&caller, self.max_requests, self.window) {
            warn!(%caller, "rate limit exceeded");
            return Err(BillingError::RateLimited);
        }

        if let Some(signing) = &self.signing {
            signing.verify(headers, body).inspect_err(|e| {
                warn!(%caller, error = %e, "rejected request signature");
            })?;
        }

        permissions::require(self.role, permission)
    }
}

impl Signing {
    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<()> {
        if let Some(signature) = header(headers, SIGNATURE_HEADER) {
            let timestamp = header(headers, TIMESTAMP_HEADER)
                .and_then(|t| t.parse::<i64>().ok())
                .ok_or_else(|| BillingError::Unauthorized("Missing or invalid timestamp".to_string()))?;
            return self
                .validator
                .validate(body, signature, timestamp, Utc::now().timestamp());
        }

        match header(headers, INVOICE_SIGNATURE_HEADER) {
            Some(signature) if verify_signature(body, signature, &self.secret) => Ok(()),
            Some(_) => Err(BillingError::Unauthorized("Invalid signature".to_string())),
            None => Err(BillingError::Unauthorized("Missing signature".to_string())),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// First hop of `X-Forwarded-For`, or `anonymous`
fn caller_id(headers: &HeaderMap) -> String {
    header(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}
