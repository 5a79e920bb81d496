use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Currency, LineItem};
use crate::totals::TotalsResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum InvoiceStatus {
    #[default]
    Generated,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 5] = [
        InvoiceStatus::Generated,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Generated => "generated",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn next(&self) -> InvoiceStatus {
        let idx = Self::ALL.iter().position(|s| s == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown invoice status '{s}'"))
    }
}

/// A generated invoice as persisted, with the totals computed at generation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub invoice_number: String,
    pub source_system: Option<String>,
    pub source_id: Option<String>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_address: Option<String>,
    pub client_tax_id: Option<String>,
    pub items: Vec<LineItem>,
    #[serde(flatten)]
    pub totals: TotalsResult,
    pub currency: Currency,
    pub due_date: Option<String>,
    pub notes: Option<String>,
    pub email_recipients: Vec<String>,
    pub pdf_file_id: String,
    pub status: InvoiceStatus,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Invoice fields supplied by the caller; the store assigns id and creation time
#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub source_system: Option<String>,
    pub source_id: Option<String>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_address: Option<String>,
    pub client_tax_id: Option<String>,
    pub items: Vec<LineItem>,
    pub totals: TotalsResult,
    pub currency: Currency,
    pub due_date: Option<String>,
    pub notes: Option<String>,
    pub email_recipients: Vec<String>,
    pub pdf_file_id: String,
    pub status: InvoiceStatus,
    pub metadata: Value,
}

impl NewInvoice {
    pub fn into_invoice(self, id: String, created_at: DateTime<Utc>) -> Invoice {
        Invoice {
            id,
            invoice_number: self.invoice_number,
            source_system: self.source_system,
            source_id: self.source_id,
            client_name: self.client_name,
            client_email: self.client_email,
            client_address: self.client_address,
            client_tax_id: self.client_tax_id,
            items: self.items,
            totals: self.totals,
            currency: self.currency,
            due_date: self.due_date,
            notes: self.notes,
            email_recipients: self.email_recipients,
            pdf_file_id: self.pdf_file_id,
            status: self.status,
            metadata: self.metadata,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_cycle_visits_every_status() {
        let mut status = InvoiceStatus::Generated;
        let mut seen = Vec::new();
        for _ in 0..InvoiceStatus::ALL.len() {
            seen.push(status);
            status = status.next();
        }
        assert_eq!(seen, InvoiceStatus::ALL);
        assert_eq!(status, InvoiceStatus::Generated);
    }

    #[test]
    fn status_parses_its_own_label() {
        for status in InvoiceStatus::ALL {
            assert_eq!(status.as_str().parse::<InvoiceStatus>().unwrap(), status);
        }
        assert!("pending".parse::<InvoiceStatus>().is_err());
    }
}
