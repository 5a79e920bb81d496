use std::sync::Mutex;

use async_trait::async_trait;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::{CompanyInfo, Config};
use crate::db::StoredDocument;
use crate::error::{BillingError, Result};
use crate::models::Invoice;

#[derive(Debug, Clone, PartialEq)]
pub struct MailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A composed invoice email
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceMail {
    pub from_name: String,
    pub from_email: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachment: Option<MailAttachment>,
}

#[async_trait]
pub trait MailSender: Send + Sync + 'static {
    async fn send(&self, mail: InvoiceMail) -> Result<()>;
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Build the email for an invoice, with its document attached.
/// `resend` prefixes the subject with `[RESENT]`.
pub fn compose_invoice_mail(
    invoice: &Invoice,
    company: &CompanyInfo,
    document: &StoredDocument,
    recipients: Vec<String>,
    resend: bool,
) -> InvoiceMail {
    let subject = format!(
        "{}Invoice {} from {}",
        if resend { "[RESENT] " } else { "" },
        invoice.invoice_number,
        company.name
    );

    let total = invoice.currency.format_amount(invoice.totals.final_total);
    let number = escape_html(&invoice.invoice_number);
    let intro = if resend {
        format!("As requested, we are resending your invoice <strong>{number}</strong> for the amount of <strong>{total}</strong>.")
    } else {
        format!("Please find attached invoice <strong>{number}</strong> for the amount of <strong>{total}</strong>.")
    };
    let due = invoice.due_date.as_deref().unwrap_or("On receipt");
    let notes = invoice
        .notes
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .map(|n| format!("<p><strong>Notes:</strong> {}</p>", escape_html(n)))
        .unwrap_or_default();

    let html_body = format!(
        r#"<html>
  <body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <h2 style="color: #2563eb;">Invoice {number} from {company_name}</h2>
    <p>Dear {client},</p>
    <p>{intro}</p>
    <ul>
      <li>Invoice Number: {number}</li>
      <li>Due Date: {due}</li>
      <li>Total Amount: {total} ({code})</li>
    </ul>
    {notes}
    <p>If you have any questions about this invoice, please don't hesitate to contact us.</p>
    <p>Best regards,<br>{company_name}<br>{company_email}</p>
  </body>
</html>"#,
        company_name = escape_html(&company.name),
        company_email = escape_html(&company.email),
        client = escape_html(&invoice.client_name),
        due = escape_html(due),
        code = invoice.currency.code(),
    );

    let extension = document.file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("pdf");

    InvoiceMail {
        from_name: company.name.clone(),
        from_email: company.email.clone(),
        to: recipients,
        subject,
        html_body,
        attachment: Some(MailAttachment {
            file_name: format!("invoice-{}.{extension}", invoice.invoice_number),
            content_type: document.content_type.clone(),
            bytes: document.bytes.clone(),
        }),
    }
}

fn mail_error(e: impl std::fmt::Display) -> BillingError {
    BillingError::Mail(e.to_string())
}

fn build_message(mail: &InvoiceMail) -> Result<Message> {
    let from = Mailbox::new(
        Some(mail.from_name.clone()),
        mail.from_email.parse().map_err(mail_error)?,
    );

    let mut builder = Message::builder().from(from).subject(mail.subject.clone());
    for recipient in &mail.to {
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| BillingError::Mail(format!("invalid recipient '{recipient}': {e}")))?;
        builder = builder.to(to);
    }

    let mut body = MultiPart::mixed().singlepart(SinglePart::html(mail.html_body.clone()));
    if let Some(attachment) = &mail.attachment {
        let content_type = ContentType::parse(&attachment.content_type).map_err(mail_error)?;
        body = body.singlepart(
            Attachment::new(attachment.file_name.clone()).body(attachment.bytes.clone(), content_type),
        );
    }

    builder.multipart(body).map_err(mail_error)
}

/// Sends mail through an SMTP relay
pub struct SmtpMailer {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
}

impl SmtpMailer {
    pub fn new(host: &str, port: u16, username: Option<&str>, password: Option<&str>) -> Self {
        let credentials = match (username, password) {
            (Some(user), Some(pass)) => Some(Credentials::new(user.to_string(), pass.to_string())),
            _ => None,
        };
        Self {
            host: host.to_string(),
            port,
            credentials,
        }
    }

    /// `None` when no SMTP host is configured
    pub fn from_config(config: &Config) -> Option<Self> {
        let host = config.smtp_host.as_deref()?;
        Some(Self::new(
            host,
            config.smtp_port,
            config.smtp_username.as_deref(),
            config.smtp_password.as_deref(),
        ))
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let builder = if self.port == 465 {
            SmtpTransport::relay(&self.host)
        } else {
            SmtpTransport::starttls_relay(&self.host)
        }
        .map_err(mail_error)?
        .port(self.port);

        let builder = match &self.credentials {
            Some(credentials) => builder.credentials(credentials.clone()),
            None => builder,
        };

        Ok(builder.build())
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, mail: InvoiceMail) -> Result<()> {
        let message = build_message(&mail)?;
        let transport = self.transport()?;

        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(mail_error)?
            .map_err(mail_error)?;

        info!(recipients = ?mail.to, subject = %mail.subject, "email sent");
        Ok(())
    }
}

/// Keeps mail in memory instead of sending it
#[derive(Debug, Default)]
pub struct OutboxMailer {
    outbox: Mutex<Vec<InvoiceMail>>,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<InvoiceMail> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl MailSender for OutboxMailer {
    async fn send(&self, mail: InvoiceMail) -> Result<()> {
        // still validate addresses like a real transport would
        build_message(&mail)?;

        info!(recipients = ?mail.to, subject = %mail.subject, "email queued in outbox");
        self.outbox
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(mail);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::models::{Currency, InvoiceStatus};
    use crate::totals::TotalsResult;

    fn invoice() -> Invoice {
        Invoice {
            id: "inv-1".to_string(),
            invoice_number: "INV-42".to_string(),
            source_system: None,
            source_id: None,
            client_name: "Acme <Corp>".to_string(),
            client_email: Some("finance@acme.example".to_string()),
            client_address: None,
            client_tax_id: None,
            items: Vec::new(),
            totals: TotalsResult {
                final_total: 60500.0,
                ..TotalsResult::default()
            },
            currency: Currency::Gbp,
            due_date: Some("2025-09-30".to_string()),
            notes: Some("Net 30".to_string()),
            email_recipients: vec!["finance@acme.example".to_string()],
            pdf_file_id: "doc-1".to_string(),
            status: InvoiceStatus::Generated,
            metadata: json!({}),
            created_at: Utc::now(),
        }
    }

    fn document() -> StoredDocument {
        StoredDocument {
            id: "doc-1".to_string(),
            file_name: "invoice-INV-42.md".to_string(),
            content_type: "text/markdown; charset=utf-8".to_string(),
            bytes: b"# Invoice".to_vec(),
        }
    }

    #[test]
    fn composes_first_send() {
        let mail = compose_invoice_mail(
            &invoice(),
            &CompanyInfo::default(),
            &document(),
            vec!["a@example.com".to_string()],
            false,
        );

        assert_eq!(mail.subject, "Invoice INV-42 from Your Company");
        assert!(mail.html_body.contains("£60500.00"));
        assert!(mail.html_body.contains("Due Date: 2025-09-30"));
        assert!(mail.html_body.contains("Acme &lt;Corp&gt;"));
        assert!(mail.html_body.contains("Net 30"));
        let attachment = mail.attachment.unwrap();
        assert_eq!(attachment.file_name, "invoice-INV-42.md");
        assert_eq!(attachment.bytes, b"# Invoice");
    }

    #[test]
    fn resend_subject_is_prefixed() {
        let mail = compose_invoice_mail(&invoice(), &CompanyInfo::default(), &document(), Vec::new(), true);
        assert_eq!(mail.subject, "[RESENT] Invoice INV-42 from Your Company");
        assert!(mail.html_body.contains("resending"));
    }

    #[tokio::test]
    async fn outbox_records_mail() {
        let outbox = OutboxMailer::new();
        let mail = compose_invoice_mail(
            &invoice(),
            &CompanyInfo::default(),
            &document(),
            vec!["a@example.com".to_string(), "b@example.com".to_string()],
            false,
        );

        outbox.send(mail.clone()).await.unwrap();

        assert_eq!(outbox.sent(), vec![mail]);
    }

    #[tokio::test]
    async fn invalid_recipient_is_a_mail_error() {
        let outbox = OutboxMailer::new();
        let mail = compose_invoice_mail(
            &invoice(),
            &CompanyInfo::default(),
            &document(),
            vec!["not an address".to_string()],
            false,
        );

        let err = outbox.send(mail).await.unwrap_err();

        assert!(matches!(err, BillingError::Mail(_)));
        assert!(outbox.sent().is_empty());
    }
}
