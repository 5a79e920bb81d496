//! Billing operations shared by the HTTP functions and the terminal UI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::config::{CompanyInfo, Config};
use crate::db::{Database, DocumentStore, InvoiceQuery, InvoiceStore, LogSink, MemoryStore, Page};
use crate::error::Result;
use crate::mail::{MailSender, OutboxMailer, SmtpMailer};
use crate::models::{Invoice, InvoiceStatus, LogOperation, NewLogEntry};
use crate::render::{DocumentRenderer, MarkdownPdfRenderer};
use crate::totals::TaxRateTable;

mod dashboard;
mod generate;
mod logs;
mod resend;

pub use dashboard::{DashboardStats, RECENT_INVOICES};
pub use generate::GeneratedInvoice;
pub use logs::{LogsPage, LogsRequest};
pub use resend::{ResendOutcome, ResendRequest};

#[derive(Clone)]
pub struct Services {
    pub invoices: Arc<dyn InvoiceStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub logs: Arc<dyn LogSink>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub mailer: Arc<dyn MailSender>,
    pub rates: TaxRateTable,
    pub company: CompanyInfo,
}

impl Services {
    /// Wire up the collaborators described by `config`.
    ///
    /// With `in_memory` the stores live in process and mail goes to an outbox.
    pub async fn connect(config: &Config, in_memory: bool) -> anyhow::Result<Self> {
        let renderer = Arc::new(MarkdownPdfRenderer::new(&config.pandoc_path, &config.output_dir));

        let services = if in_memory {
            info!("using in-memory store and outbox mailer");
            Self::in_memory(renderer, Arc::new(OutboxMailer::new()))
        } else {
            let db = Arc::new(Database::connect(config.database_url()?).await?);
            info!("database connection established");

            let mailer: Arc<dyn MailSender> = match SmtpMailer::from_config(config) {
                Some(smtp) => Arc::new(smtp),
                None => {
                    warn!("SMTP_HOST not set, invoice mail is kept in the outbox");
                    Arc::new(OutboxMailer::new())
                }
            };

            Self {
                invoices: db.clone(),
                documents: db.clone(),
                logs: db,
                renderer,
                mailer,
                rates: TaxRateTable::default(),
                company: CompanyInfo::default(),
            }
        };

        Ok(Self {
            rates: config.tax_rates(),
            company: config.company(),
            ..services
        })
    }

    /// Services over a fresh [`MemoryStore`]
    pub fn in_memory(renderer: Arc<dyn DocumentRenderer>, mailer: Arc<dyn MailSender>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            invoices: store.clone(),
            documents: store.clone(),
            logs: store,
            renderer,
            mailer,
            rates: TaxRateTable::default(),
            company: CompanyInfo::default(),
        }
    }

    pub async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Page<Invoice>> {
        self.invoices.list_invoices(query).await
    }

    pub async fn get_invoice(&self, id: &str) -> Result<Invoice> {
        self.invoices.get_invoice(id).await
    }

    /// Change an invoice's status and log the transition
    pub async fn update_status(&self, id: &str, status: InvoiceStatus) -> Result<Invoice> {
        let mut invoice = self.invoices.get_invoice(id).await?;
        let from = invoice.status;

        self.invoices.update_status(id, status).await?;
        invoice.status = status;

        self.record(NewLogEntry::success(
            LogOperation::InvoiceStatusChanged,
            id,
            json!({ "from": from, "to": status }),
        ))
        .await;

        info!(invoice_id = %id, %from, to = %status, "invoice status changed");
        Ok(invoice)
    }

    /// Write the stored document of an invoice into `dir` and return its path
    pub async fn export_document(&self, invoice_id: &str, dir: &Path) -> Result<PathBuf> {
        let invoice = self.invoices.get_invoice(invoice_id).await?;
        let document = self.documents.get_document(&invoice.pdf_file_id).await?;

        let file_name = Path::new(&document.file_name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("{}.pdf", invoice.invoice_number)));
        let path = dir.join(file_name);

        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, &document.bytes).await?;

        info!(%invoice_id, path = %path.display(), "invoice document exported");
        Ok(path)
    }

    /// Append to the operation log. Failures are reported but never fail the caller.
    async fn record(&self, entry: NewLogEntry) {
        let operation = entry.operation;
        if let Err(e) = self.logs.append(entry).await {
            warn!(%operation, error = %e, "failed to append log entry");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::Services;
    use crate::config::CompanyInfo;
    use crate::error::{BillingError, Result};
    use crate::mail::{InvoiceMail, MailSender, OutboxMailer};
    use crate::models::{ClientInfo, InvoiceDraft, LineItem, TaxCategory};
    use crate::render::MarkdownPdfRenderer;

    pub struct FailingMailer;

    #[async_trait]
    impl MailSender for FailingMailer {
        async fn send(&self, _mail: InvoiceMail) -> Result<()> {
            Err(BillingError::Mail("connection refused".to_string()))
        }
    }

    pub fn services_with(mailer: Arc<dyn MailSender>) -> Services {
        let renderer = Arc::new(MarkdownPdfRenderer::new(
            "/nonexistent/pandoc",
            std::env::temp_dir().join("invoice-billing-tests"),
        ));
        Services {
            company: CompanyInfo {
                name: "Northwind".to_string(),
                email: "billing@northwind.example".to_string(),
            },
            ..Services::in_memory(renderer, mailer)
        }
    }

    pub fn services() -> (Services, Arc<OutboxMailer>) {
        let outbox = Arc::new(OutboxMailer::new());
        (services_with(outbox.clone()), outbox)
    }

    pub fn draft() -> InvoiceDraft {
        InvoiceDraft {
            client: Some(ClientInfo {
                name: "Acme Corp".to_string(),
                email: Some("finance@acme.example".to_string()),
                address: None,
                tax_id: None,
            }),
            items: vec![LineItem::new("Design work", 40.0, 1250.0, TaxCategory::Standard)],
            ..InvoiceDraft::default()
        }
    }
}
