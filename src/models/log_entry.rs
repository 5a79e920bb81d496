use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum LogOperation {
    InvoiceGenerated,
    InvoiceSent,
    InvoiceResent,
    InvoiceStatusChanged,
}

impl LogOperation {
    pub const ALL: [LogOperation; 4] = [
        LogOperation::InvoiceGenerated,
        LogOperation::InvoiceSent,
        LogOperation::InvoiceResent,
        LogOperation::InvoiceStatusChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogOperation::InvoiceGenerated => "invoice_generated",
            LogOperation::InvoiceSent => "invoice_sent",
            LogOperation::InvoiceResent => "invoice_resent",
            LogOperation::InvoiceStatusChanged => "invoice_status_changed",
        }
    }
}

impl fmt::Display for LogOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown operation '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum LogStatus {
    Success,
    Failed,
    Pending,
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogStatus::Success => "success",
            LogStatus::Failed => "failed",
            LogStatus::Pending => "pending",
        })
    }
}

/// One entry of the append-only operation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub operation: LogOperation,
    pub invoice_id: String,
    pub status: LogStatus,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub operation: LogOperation,
    pub invoice_id: String,
    pub status: LogStatus,
    pub details: Value,
}

impl NewLogEntry {
    pub fn success(operation: LogOperation, invoice_id: &str, details: Value) -> Self {
        Self {
            operation,
            invoice_id: invoice_id.to_string(),
            status: LogStatus::Success,
            details,
        }
    }

    pub fn failed(operation: LogOperation, invoice_id: &str, error: impl fmt::Display) -> Self {
        Self {
            operation,
            invoice_id: invoice_id.to_string(),
            status: LogStatus::Failed,
            details: json!({ "error": error.to_string() }),
        }
    }

    pub fn into_entry(self, id: String, timestamp: DateTime<Utc>) -> LogEntry {
        LogEntry {
            id,
            operation: self.operation,
            invoice_id: self.invoice_id,
            status: self.status,
            timestamp,
            details: self.details,
        }
    }
}
