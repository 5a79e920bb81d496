use std::time::Duration;

use super::hmac::{sign_parts, verify_parts};
use crate::error::{BillingError, Result};

/// Validates timestamped request signatures.
///
/// The signed message is `"{timestamp}.{body}"`, timestamps are unix seconds.
#[derive(Debug, Clone)]
pub struct ApiKeyValidator {
    secret: String,
    tolerance: Duration,
}

impl ApiKeyValidator {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    pub fn signature(&self, payload: &[u8], timestamp: i64) -> String {
        let prefix = format!("{timestamp}.");
        sign_parts(&[prefix.as_bytes(), payload], &self.secret)
    }

    pub fn validate(&self, payload: &[u8], signature: &str, timestamp: i64, now: i64) -> Result<()> {
        let age = now.abs_diff(timestamp);
        if age > self.tolerance.as_secs() {
            return Err(BillingError::Unauthorized("Request timestamp too old".to_string()));
        }

        let prefix = format!("{timestamp}.");
        if !verify_parts(&[prefix.as_bytes(), payload], signature, &self.secret) {
            return Err(BillingError::Unauthorized("Invalid signature".to_string()));
        }

        Ok(())
    }
}
