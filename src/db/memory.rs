use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DocumentStore, InvoiceQuery, InvoiceStore, LogQuery, LogSink, Page, StoredDocument};
use crate::error::{BillingError, Result};
use crate::models::{Invoice, InvoiceStatus, LogEntry, NewInvoice, NewLogEntry};

/// In-process backend for `--in-memory` runs and tests.
///
/// Records are kept in insertion order, so iterating in reverse yields newest first.
#[derive(Debug, Default)]
pub struct MemoryStore {
    invoices: RwLock<Vec<Invoice>>,
    documents: RwLock<HashMap<String, StoredDocument>>,
    logs: RwLock<Vec<LogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(matching: Vec<&T>, offset: usize, limit: usize) -> Page<T> {
    let total = matching.len();
    let items = matching.into_iter().skip(offset).take(limit).cloned().collect();
    Page { items, total }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice> {
        let invoice = invoice.into_invoice(Uuid::new_v4().to_string(), Utc::now());
        self.invoices.write().await.push(invoice.clone());
        Ok(invoice)
    }

    async fn get_invoice(&self, id: &str) -> Result<Invoice> {
        self.invoices
            .read()
            .await
            .iter()
            .find(|invoice| invoice.id == id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("Invoice {id}")))
    }

    async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Page<Invoice>> {
        let invoices = self.invoices.read().await;
        let matching = invoices.iter().rev().filter(|i| query.matches(i)).collect();
        Ok(paginate(matching, query.offset(), query.limit))
    }

    async fn update_status(&self, id: &str, status: InvoiceStatus) -> Result<()> {
        let mut invoices = self.invoices.write().await;
        let invoice = invoices
            .iter_mut()
            .find(|invoice| invoice.id == id)
            .ok_or_else(|| BillingError::NotFound(format!("Invoice {id}")))?;
        invoice.status = status;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put_document(&self, file_name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let document = StoredDocument {
            id: id.clone(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes,
        };
        self.documents.write().await.insert(id.clone(), document);
        Ok(id)
    }

    async fn get_document(&self, id: &str) -> Result<StoredDocument> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| BillingError::NotFound(format!("Document {id}")))
    }
}

#[async_trait]
impl LogSink for MemoryStore {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry> {
        let entry = entry.into_entry(Uuid::new_v4().to_string(), Utc::now());
        self.logs.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn query(&self, query: &LogQuery) -> Result<Page<LogEntry>> {
        let logs = self.logs.read().await;
        let matching = logs.iter().rev().filter(|e| query.matches(e)).collect();
        Ok(paginate(matching, query.offset, query.limit))
    }
}
