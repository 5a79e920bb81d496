use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{DocumentStore, InvoiceQuery, InvoiceStore, LogQuery, LogSink, Page, StoredDocument};
use crate::error::{BillingError, Result};
use crate::models::{
    Currency, Invoice, InvoiceStatus, LineItem, LogEntry, LogOperation, LogStatus, NewInvoice,
    NewLogEntry,
};
use crate::totals::TotalsResult;

const INVOICE_COLUMNS: &str = "id, invoice_number, source_system, source_id, client_name, \
     client_email, client_address, client_tax_id, items, subtotal, markup_total, discount_total, \
     total_tax, final_total, currency, due_date, notes, email_recipients, pdf_file_id, status, \
     metadata, created_at";

/// PostgreSQL backend. The tables are described in `schema.sql`.
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new Database instance with a connection pool
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(FromRow)]
struct InvoiceRow {
    id: String,
    invoice_number: String,
    source_system: Option<String>,
    source_id: Option<String>,
    client_name: String,
    client_email: Option<String>,
    client_address: Option<String>,
    client_tax_id: Option<String>,
    items: Json<Vec<LineItem>>,
    subtotal: f64,
    markup_total: f64,
    discount_total: f64,
    total_tax: f64,
    final_total: f64,
    currency: Currency,
    due_date: Option<String>,
    notes: Option<String>,
    email_recipients: Json<Vec<String>>,
    pdf_file_id: String,
    status: InvoiceStatus,
    metadata: Json<Value>,
    created_at: DateTime<Utc>,
}

impl From<InvoiceRow> for Invoice {
    fn from(row: InvoiceRow) -> Self {
        Invoice {
            id: row.id,
            invoice_number: row.invoice_number,
            source_system: row.source_system,
            source_id: row.source_id,
            client_name: row.client_name,
            client_email: row.client_email,
            client_address: row.client_address,
            client_tax_id: row.client_tax_id,
            items: row.items.0,
            totals: TotalsResult {
                subtotal: row.subtotal,
                markup_total: row.markup_total,
                discount_total: row.discount_total,
                total_tax: row.total_tax,
                final_total: row.final_total,
            },
            currency: row.currency,
            due_date: row.due_date,
            notes: row.notes,
            email_recipients: row.email_recipients.0,
            pdf_file_id: row.pdf_file_id,
            status: row.status,
            metadata: row.metadata.0,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct LogRow {
    id: String,
    operation: LogOperation,
    invoice_id: String,
    status: LogStatus,
    logged_at: DateTime<Utc>,
    details: Json<Value>,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        LogEntry {
            id: row.id,
            operation: row.operation,
            invoice_id: row.invoice_id,
            status: row.status,
            timestamp: row.logged_at,
            details: row.details.0,
        }
    }
}

#[derive(FromRow)]
struct DocumentRow {
    id: String,
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

fn push_invoice_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &InvoiceQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status);
    }
    if let Some(term) = query.search_term() {
        builder
            .push(" AND LOWER(client_name) LIKE ")
            .push_bind(format!("%{term}%"));
    }
}

fn push_log_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &LogQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(invoice_id) = &query.invoice_id {
        builder.push(" AND invoice_id = ").push_bind(invoice_id.clone());
    }
    if let Some(operation) = query.operation {
        builder.push(" AND operation = ").push_bind(operation);
    }
    if let Some(start) = query.start {
        builder.push(" AND logged_at >= ").push_bind(start);
    }
    if let Some(end) = query.end {
        builder.push(" AND logged_at <= ").push_bind(end);
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl InvoiceStore for Database {
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO invoices (id, invoice_number, source_system, source_id, client_name,
                client_email, client_address, client_tax_id, items, subtotal, markup_total,
                discount_total, total_tax, final_total, currency, due_date, notes,
                email_recipients, pdf_file_id, status, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22)
            "#,
        )
        .bind(&id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.source_system)
        .bind(&invoice.source_id)
        .bind(&invoice.client_name)
        .bind(&invoice.client_email)
        .bind(&invoice.client_address)
        .bind(&invoice.client_tax_id)
        .bind(Json(&invoice.items))
        .bind(invoice.totals.subtotal)
        .bind(invoice.totals.markup_total)
        .bind(invoice.totals.discount_total)
        .bind(invoice.totals.total_tax)
        .bind(invoice.totals.final_total)
        .bind(invoice.currency)
        .bind(&invoice.due_date)
        .bind(&invoice.notes)
        .bind(Json(&invoice.email_recipients))
        .bind(&invoice.pdf_file_id)
        .bind(invoice.status)
        .bind(Json(&invoice.metadata))
        .bind(created_at)
        .execute(self.get_pool())
        .await?;

        Ok(invoice.into_invoice(id, created_at))
    }

    async fn get_invoice(&self, id: &str) -> Result<Invoice> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        row.map(Invoice::from)
            .ok_or_else(|| BillingError::NotFound(format!("Invoice {id}")))
    }

    async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Page<Invoice>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM invoices");
        push_invoice_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(self.get_pool()).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {INVOICE_COLUMNS} FROM invoices"));
        push_invoice_filters(&mut select, query);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(to_i64(query.limit))
            .push(" OFFSET ")
            .push_bind(to_i64(query.offset()));

        let rows: Vec<InvoiceRow> = select.build_query_as().fetch_all(self.get_pool()).await?;

        Ok(Page {
            items: rows.into_iter().map(Invoice::from).collect(),
            total: usize::try_from(total).unwrap_or_default(),
        })
    }

    async fn update_status(&self, id: &str, status: InvoiceStatus) -> Result<()> {
        let result = sqlx::query("UPDATE invoices SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(self.get_pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::NotFound(format!("Invoice {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for Database {
    async fn put_document(&self, file_name: &str, content_type: &str, bytes: Vec<u8>) -> Result<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO invoice_documents (id, file_name, content_type, bytes)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&id)
        .bind(file_name)
        .bind(content_type)
        .bind(bytes)
        .execute(self.get_pool())
        .await?;

        Ok(id)
    }

    async fn get_document(&self, id: &str) -> Result<StoredDocument> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, file_name, content_type, bytes FROM invoice_documents WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.get_pool())
        .await?;

        row.map(|row| StoredDocument {
            id: row.id,
            file_name: row.file_name,
            content_type: row.content_type,
            bytes: row.bytes,
        })
        .ok_or_else(|| BillingError::NotFound(format!("Document {id}")))
    }
}

#[async_trait]
impl LogSink for Database {
    async fn append(&self, entry: NewLogEntry) -> Result<LogEntry> {
        let id = Uuid::new_v4().to_string();
        let timestamp = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO invoice_logs (id, operation, invoice_id, status, logged_at, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&id)
        .bind(entry.operation)
        .bind(&entry.invoice_id)
        .bind(entry.status)
        .bind(timestamp)
        .bind(Json(&entry.details))
        .execute(self.get_pool())
        .await?;

        Ok(entry.into_entry(id, timestamp))
    }

    async fn query(&self, query: &LogQuery) -> Result<Page<LogEntry>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM invoice_logs");
        push_log_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(self.get_pool()).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            "SELECT id, operation, invoice_id, status, logged_at, details FROM invoice_logs",
        );
        push_log_filters(&mut select, query);
        select
            .push(" ORDER BY logged_at DESC LIMIT ")
            .push_bind(to_i64(query.limit))
            .push(" OFFSET ")
            .push_bind(to_i64(query.offset));

        let rows: Vec<LogRow> = select.build_query_as().fetch_all(self.get_pool()).await?;

        Ok(Page {
            items: rows.into_iter().map(LogEntry::from).collect(),
            total: usize::try_from(total).unwrap_or_default(),
        })
    }
}
