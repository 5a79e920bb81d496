use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Invoice, InvoiceStatus, LogEntry, LogOperation, NewInvoice, NewLogEntry};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::Database;

/// Invoice persistence
#[async_trait]
pub trait InvoiceStore: Send + Sync + 'static {
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice>;

    /// Fails with `NotFound` for an unknown id
    async fn get_invoice(&self, id: &str) -> Result<Invoice>;

    /// Newest first
    async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Page<Invoice>>;

    async fn update_status(&self, id: &str, status: InvoiceStatus) -> Result<()>;
}

/// Storage for rendered invoice documents
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Store the bytes and return the new document id
    async fn put_document(&self, file_name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String>;

    async fn get_document(&self, id: &str) -> Result<StoredDocument>;
}

/// Append-only operation log
#[async_trait]
pub trait LogSink: Send + Sync + 'static {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry>;

    /// Newest first
    async fn query(&self, query: &LogQuery) -> Result<Page<LogEntry>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// One page of results plus the number of matching records
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceQuery {
    pub status: Option<InvoiceStatus>,
    /// Case-insensitive substring of the client name
    pub search: Option<String>,
    /// 1-based
    pub page: usize,
    pub limit: usize,
}

impl Default for InvoiceQuery {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            page: 1,
            limit: 20,
        }
    }
}

impl InvoiceQuery {
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.limit
    }

    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    fn matches(&self, invoice: &Invoice) -> bool {
        if let Some(status) = self.status {
            if invoice.status != status {
                return false;
            }
        }
        match self.search_term() {
            Some(term) => invoice.client_name.to_lowercase().contains(&term),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogQuery {
    pub invoice_id: Option<String>,
    pub operation: Option<LogOperation>,
    /// Inclusive lower bound
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub end: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            invoice_id: None,
            operation: None,
            start: None,
            end: None,
            offset: 0,
            limit: 50,
        }
    }
}

impl LogQuery {
    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(invoice_id) = &self.invoice_id {
            if &entry.invoice_id != invoice_id {
                return false;
            }
        }
        if let Some(operation) = self.operation {
            if entry.operation != operation {
                return false;
            }
        }
        if let Some(start) = self.start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }
}
