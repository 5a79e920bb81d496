use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::Services;
use crate::db::StoredDocument;
use crate::error::{BillingError, Result};
use crate::mail::compose_invoice_mail;
use crate::models::{ClientInfo, InvoiceDraft, InvoiceStatus, LogOperation, NewInvoice, NewLogEntry};
use crate::render::{DocumentMeta, RenderedDocument};
use crate::totals::{TotalsResult, compute_totals};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedInvoice {
    pub invoice_id: String,
    pub invoice_number: String,
    pub totals: TotalsResult,
    pub file_id: String,
    pub content_type: String,
    pub pdf_base64: String,
    pub emailed: bool,
}

fn required_client(draft: &InvoiceDraft) -> Result<&ClientInfo> {
    let client = draft
        .client
        .as_ref()
        .filter(|client| !client.name.trim().is_empty());

    match client {
        Some(client) if !draft.items.is_empty() => Ok(client),
        _ => Err(BillingError::Validation("Missing required fields".to_string())),
    }
}

/// Recipients explicitly asked for in the draft, blanks dropped
fn explicit_recipients(draft: &InvoiceDraft) -> Vec<String> {
    draft
        .email_recipients
        .iter()
        .flatten()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

impl Services {
    /// Validate a draft, compute its totals, render and store the document,
    /// persist the invoice and, if the draft names recipients, mail it.
    pub async fn generate_invoice(&self, draft: InvoiceDraft) -> Result<GeneratedInvoice> {
        let client = required_client(&draft)?.clone();
        let totals = compute_totals(&draft, &self.rates);

        let invoice_number = draft
            .invoice_number
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("INV-{}", Utc::now().timestamp_millis()));

        info!(%invoice_number, client = %client.name, final_total = totals.final_total, "generating invoice");

        let stored = match self.render_and_store(&draft, &totals, &invoice_number).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(%invoice_number, error = %e, "invoice generation failed");
                self.record(NewLogEntry::failed(LogOperation::InvoiceGenerated, &invoice_number, &e))
                    .await;
                return Err(e);
            }
        };

        let explicit = explicit_recipients(&draft);
        let email_recipients = if explicit.is_empty() {
            client.email.iter().cloned().collect()
        } else {
            explicit.clone()
        };

        let new_invoice = NewInvoice {
            invoice_number: invoice_number.clone(),
            source_system: draft.source_system.clone(),
            source_id: draft.source_id.clone(),
            client_name: client.name.clone(),
            client_email: client.email.clone(),
            client_address: client.address.clone(),
            client_tax_id: client.tax_id.clone(),
            items: draft.items.clone(),
            totals,
            currency: draft.currency,
            due_date: draft.due_date.clone(),
            notes: draft.notes.clone(),
            email_recipients,
            pdf_file_id: stored.id.clone(),
            status: InvoiceStatus::Generated,
            metadata: serde_json::to_value(&draft.metadata)?,
        };

        let mut invoice = match self.invoices.create_invoice(new_invoice).await {
            Ok(invoice) => invoice,
            Err(e) => {
                warn!(%invoice_number, error = %e, "failed to persist invoice");
                self.record(NewLogEntry::failed(LogOperation::InvoiceGenerated, &invoice_number, &e))
                    .await;
                return Err(e);
            }
        };

        self.record(NewLogEntry::success(
            LogOperation::InvoiceGenerated,
            &invoice.id,
            json!({
                "invoiceNumber": invoice.invoice_number,
                "finalTotal": totals.final_total,
                "fileId": stored.id,
            }),
        ))
        .await;

        let mut emailed = false;
        if !explicit.is_empty() {
            let mail = compose_invoice_mail(&invoice, &self.company, &stored, explicit.clone(), false);
            match self.mailer.send(mail).await {
                Ok(()) => {
                    emailed = true;
                    match self.invoices.update_status(&invoice.id, InvoiceStatus::Sent).await {
                        Ok(()) => invoice.status = InvoiceStatus::Sent,
                        Err(e) => warn!(invoice_id = %invoice.id, error = %e, "failed to mark invoice as sent"),
                    }
                    self.record(NewLogEntry::success(
                        LogOperation::InvoiceSent,
                        &invoice.id,
                        json!({ "recipients": explicit }),
                    ))
                    .await;
                }
                Err(e) => {
                    warn!(invoice_id = %invoice.id, error = %e, "failed to email invoice");
                    self.record(NewLogEntry::failed(LogOperation::InvoiceSent, &invoice.id, &e))
                        .await;
                }
            }
        }

        info!(invoice_id = %invoice.id, %invoice_number, status = %invoice.status, "invoice generated");

        Ok(GeneratedInvoice {
            invoice_id: invoice.id,
            invoice_number,
            totals,
            file_id: stored.id,
            content_type: stored.content_type,
            pdf_base64: STANDARD.encode(&stored.bytes),
            emailed,
        })
    }

    async fn render_and_store(
        &self,
        draft: &InvoiceDraft,
        totals: &TotalsResult,
        invoice_number: &str,
    ) -> Result<StoredDocument> {
        let meta = DocumentMeta {
            invoice_number: invoice_number.to_string(),
            company: self.company.clone(),
            issued_on: Utc::now().date_naive(),
            rates: self.rates,
        };

        let renderer = Arc::clone(&self.renderer);
        let draft = draft.clone();
        let totals = *totals;
        let RenderedDocument {
            file_name,
            content_type,
            bytes,
        } = tokio::task::spawn_blocking(move || renderer.render(&draft, &totals, &meta))
            .await
            .map_err(|e| BillingError::Render(e.to_string()))??;

        let id = self
            .documents
            .put_document(&file_name, &content_type, bytes.clone())
            .await?;

        Ok(StoredDocument {
            id,
            file_name,
            content_type,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::LogQuery;
    use crate::models::{Adjustment, LogStatus};
    use crate::render::{DocumentRenderer, MARKDOWN_CONTENT_TYPE};
    use crate::service::test_support::{FailingMailer, draft, services, services_with};

    struct BrokenRenderer;

    impl DocumentRenderer for BrokenRenderer {
        fn render(&self, _: &InvoiceDraft, _: &TotalsResult, _: &DocumentMeta) -> Result<RenderedDocument> {
            Err(BillingError::Render("out of paper".to_string()))
        }
    }

    async fn all_logs(services: &Services) -> Vec<crate::models::LogEntry> {
        services.logs.query(&LogQuery::default()).await.unwrap().items
    }

    #[tokio::test]
    async fn generates_and_persists_invoice() {
        let (services, outbox) = services();
        let mut draft = draft();
        draft.markups = vec![Adjustment::percentage(5.0)];
        draft.invoice_number = Some("INV-7".to_string());

        let generated = services.generate_invoice(draft).await.unwrap();

        assert_eq!(generated.invoice_number, "INV-7");
        assert_eq!(generated.totals.subtotal, 50000.0);
        assert_eq!(generated.totals.markup_total, 2500.0);
        assert_eq!(generated.totals.total_tax, 10500.0);
        assert_eq!(generated.totals.final_total, 63000.0);
        assert_eq!(generated.content_type, MARKDOWN_CONTENT_TYPE);
        assert!(!generated.emailed);
        assert!(outbox.sent().is_empty());

        let bytes = STANDARD.decode(&generated.pdf_base64).unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("INV-7"));

        let invoice = services.get_invoice(&generated.invoice_id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Generated);
        assert_eq!(invoice.totals, generated.totals);
        assert_eq!(invoice.pdf_file_id, generated.file_id);
        assert_eq!(invoice.email_recipients, ["finance@acme.example"]);

        let logs = all_logs(&services).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].operation, LogOperation::InvoiceGenerated);
        assert_eq!(logs[0].status, LogStatus::Success);
        assert_eq!(logs[0].details["finalTotal"], json!(63000.0));
    }

    #[tokio::test]
    async fn assigns_invoice_number_when_missing() {
        let (services, _) = services();
        let generated = services.generate_invoice(draft()).await.unwrap();

        let millis = generated.invoice_number.strip_prefix("INV-").unwrap();
        assert!(millis.parse::<i64>().unwrap() > 0);
    }

    #[tokio::test]
    async fn missing_client_or_items_is_rejected() {
        let (services, _) = services();

        let mut no_items = draft();
        no_items.items.clear();
        let mut no_client = draft();
        no_client.client = None;
        let mut blank_name = draft();
        if let Some(client) = blank_name.client.as_mut() {
            client.name = "  ".to_string();
        }

        for bad in [no_items, no_client, blank_name] {
            let err = services.generate_invoice(bad).await.unwrap_err();
            assert_eq!(err.to_string(), "Missing required fields");
        }
        assert!(all_logs(&services).await.is_empty());
    }

    #[tokio::test]
    async fn explicit_recipients_are_emailed() {
        let (services, outbox) = services();
        let mut draft = draft();
        draft.email_recipients = Some(vec!["ap@acme.example".to_string(), " ".to_string()]);

        let generated = services.generate_invoice(draft).await.unwrap();

        assert!(generated.emailed);
        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, ["ap@acme.example"]);
        assert!(sent[0].subject.starts_with("Invoice INV-"));
        assert!(sent[0].subject.ends_with("from Northwind"));

        let invoice = services.get_invoice(&generated.invoice_id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Sent);
        assert_eq!(invoice.email_recipients, ["ap@acme.example"]);

        let operations: Vec<_> = all_logs(&services).await.iter().map(|l| l.operation).collect();
        assert_eq!(operations, [LogOperation::InvoiceSent, LogOperation::InvoiceGenerated]);
    }

    #[tokio::test]
    async fn mail_failure_keeps_invoice_generated() {
        let services = services_with(Arc::new(FailingMailer));
        let mut draft = draft();
        draft.email_recipients = Some(vec!["ap@acme.example".to_string()]);

        let generated = services.generate_invoice(draft).await.unwrap();

        assert!(!generated.emailed);
        let invoice = services.get_invoice(&generated.invoice_id).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Generated);

        let logs = all_logs(&services).await;
        assert_eq!(logs[0].operation, LogOperation::InvoiceSent);
        assert_eq!(logs[0].status, LogStatus::Failed);
        assert_eq!(
            logs[0].details,
            json!({ "error": "Failed to send email: connection refused" })
        );
    }

    #[tokio::test]
    async fn render_failure_is_logged_and_returned() {
        let (mut services, _) = services();
        services.renderer = Arc::new(BrokenRenderer);
        let mut draft = draft();
        draft.invoice_number = Some("INV-9".to_string());

        let err = services.generate_invoice(draft).await.unwrap_err();
        assert!(matches!(err, BillingError::Render(_)));

        let logs = all_logs(&services).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].invoice_id, "INV-9");
        assert_eq!(logs[0].status, LogStatus::Failed);
        assert_eq!(
            services.list_invoices(&Default::default()).await.unwrap().total,
            0
        );
    }
}
