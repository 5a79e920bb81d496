use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::Services;
use crate::error::{BillingError, Result};
use crate::mail::compose_invoice_mail;
use crate::models::{LogOperation, NewLogEntry};

/// Body of the resend function
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendRequest {
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub email_recipients: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResendOutcome {
    pub recipients: Vec<String>,
}

struct Delivery {
    recipients: Vec<String>,
    original: Vec<String>,
}

impl Services {
    /// Mail a stored invoice again, to `recipients` or to the ones it was created with
    pub async fn resend_invoice(&self, invoice_id: &str, recipients: Option<Vec<String>>) -> Result<ResendOutcome> {
        let invoice_id = invoice_id.trim();
        if invoice_id.is_empty() {
            return Err(BillingError::Validation("Invoice ID is required".to_string()));
        }

        info!(%invoice_id, "resending invoice");

        match self.deliver_again(invoice_id, recipients).await {
            Ok(Delivery { recipients, original }) => {
                self.record(NewLogEntry::success(
                    LogOperation::InvoiceResent,
                    invoice_id,
                    json!({ "recipients": recipients, "originalRecipients": original }),
                ))
                .await;
                info!(%invoice_id, ?recipients, "invoice resent");
                Ok(ResendOutcome { recipients })
            }
            Err(e) => {
                warn!(%invoice_id, error = %e, "failed to resend invoice");
                self.record(NewLogEntry::failed(LogOperation::InvoiceResent, invoice_id, &e))
                    .await;
                Err(e)
            }
        }
    }

    async fn deliver_again(&self, invoice_id: &str, recipients: Option<Vec<String>>) -> Result<Delivery> {
        let invoice = self.invoices.get_invoice(invoice_id).await?;
        let document = self.documents.get_document(&invoice.pdf_file_id).await?;

        let requested: Vec<String> = recipients
            .into_iter()
            .flatten()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        let recipients = if requested.is_empty() {
            invoice.email_recipients.clone()
        } else {
            requested
        };

        if recipients.is_empty() {
            return Err(BillingError::Validation(format!(
                "Invoice {} has no email recipients",
                invoice.invoice_number
            )));
        }

        let mail = compose_invoice_mail(&invoice, &self.company, &document, recipients.clone(), true);
        self.mailer.send(mail).await?;

        Ok(Delivery {
            recipients,
            original: invoice.email_recipients,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::LogQuery;
    use crate::models::{LogEntry, LogStatus};
    use crate::service::test_support::{FailingMailer, draft, services, services_with};

    async fn resend_logs(services: &Services) -> Vec<LogEntry> {
        services
            .logs
            .query(&LogQuery {
                operation: Some(LogOperation::InvoiceResent),
                ..LogQuery::default()
            })
            .await
            .unwrap()
            .items
    }

    #[tokio::test]
    async fn resends_to_stored_recipients() {
        let (services, outbox) = services();
        let generated = services.generate_invoice(draft()).await.unwrap();

        let outcome = services.resend_invoice(&generated.invoice_id, None).await.unwrap();

        assert_eq!(outcome.recipients, ["finance@acme.example"]);
        let sent = outbox.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].subject,
            format!("[RESENT] Invoice {} from Northwind", generated.invoice_number)
        );
        assert!(sent[0].attachment.as_ref().unwrap().file_name.ends_with(".md"));

        let logs = resend_logs(&services).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, LogStatus::Success);
        assert_eq!(logs[0].invoice_id, generated.invoice_id);
    }

    #[tokio::test]
    async fn explicit_recipients_override_stored_ones() {
        let (services, outbox) = services();
        let generated = services.generate_invoice(draft()).await.unwrap();

        services
            .resend_invoice(&generated.invoice_id, Some(vec!["cfo@acme.example".to_string()]))
            .await
            .unwrap();

        assert_eq!(outbox.sent()[0].to, ["cfo@acme.example"]);
        let logs = resend_logs(&services).await;
        assert_eq!(
            logs[0].details,
            json!({
                "recipients": ["cfo@acme.example"],
                "originalRecipients": ["finance@acme.example"],
            })
        );
    }

    #[tokio::test]
    async fn blank_invoice_id_is_rejected_without_logging() {
        let (services, _) = services();

        let err = services.resend_invoice("  ", None).await.unwrap_err();

        assert_eq!(err.to_string(), "Invoice ID is required");
        assert!(resend_logs(&services).await.is_empty());
    }

    #[tokio::test]
    async fn unknown_invoice_is_not_found_and_logged() {
        let (services, _) = services();

        let err = services.resend_invoice("missing", None).await.unwrap_err();

        assert!(matches!(err, BillingError::NotFound(_)));
        let logs = resend_logs(&services).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, LogStatus::Failed);
        assert_eq!(logs[0].invoice_id, "missing");
    }

    #[tokio::test]
    async fn invoice_without_recipients_cannot_be_resent() {
        let (services, outbox) = services();
        let mut draft = draft();
        if let Some(client) = draft.client.as_mut() {
            client.email = None;
        }
        let generated = services.generate_invoice(draft).await.unwrap();

        let err = services.resend_invoice(&generated.invoice_id, Some(Vec::new())).await.unwrap_err();

        assert!(matches!(err, BillingError::Validation(_)));
        assert!(outbox.sent().is_empty());
    }

    #[tokio::test]
    async fn mail_failure_is_logged_and_returned() {
        let services = services_with(Arc::new(FailingMailer));
        let generated = services.generate_invoice(draft()).await.unwrap();

        let err = services.resend_invoice(&generated.invoice_id, None).await.unwrap_err();

        assert!(matches!(err, BillingError::Mail(_)));
        let logs = resend_logs(&services).await;
        assert_eq!(logs[0].status, LogStatus::Failed);
        assert_eq!(
            logs[0].details,
            json!({ "error": "Failed to send email: connection refused" })
        );
    }
}
