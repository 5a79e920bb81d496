use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::NaiveDate;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CompanyInfo;
use crate::error::{BillingError, Result};
use crate::models::InvoiceDraft;
use crate::totals::{LineBreakdown, TaxRateTable, TotalsResult};

pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

/// Everything a document needs besides the draft and its totals
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub invoice_number: String,
    pub company: CompanyInfo,
    pub issued_on: NaiveDate,
    pub rates: TaxRateTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Lays out an invoice document from precomputed totals
pub trait DocumentRenderer: Send + Sync + 'static {
    fn render(&self, draft: &InvoiceDraft, totals: &TotalsResult, meta: &DocumentMeta) -> Result<RenderedDocument>;
}

/// Renders invoices to Markdown and converts them to PDF with pandoc if available
pub struct MarkdownPdfRenderer {
    pandoc_path: String,
    output_dir: PathBuf,
}

impl MarkdownPdfRenderer {
    pub fn new(pandoc_path: &str, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            pandoc_path: pandoc_path.to_string(),
            output_dir: output_dir.into(),
        }
    }

    fn convert_to_pdf(&self, markdown: &str, stem: &str) -> Result<Vec<u8>> {
        fs::create_dir_all(&self.output_dir)?;

        let scratch = Uuid::new_v4();
        let md_path = self.output_dir.join(format!("{stem}-{scratch}.md"));
        let pdf_path = self.output_dir.join(format!("{stem}-{scratch}.pdf"));

        fs::write(&md_path, markdown)?;
        let result = self.run_pandoc(&md_path, &pdf_path);

        for path in [&md_path, &pdf_path] {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "failed to remove scratch file");
                }
            }
        }

        result
    }

    fn run_pandoc(&self, md_path: &Path, pdf_path: &Path) -> Result<Vec<u8>> {
        let output = Command::new(&self.pandoc_path)
            .arg(md_path)
            .arg("-o")
            .arg(pdf_path)
            .arg("-V")
            .arg("geometry:a4paper,landscape")
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BillingError::Render(stderr.trim().to_string()));
        }

        Ok(fs::read(pdf_path)?)
    }
}

impl DocumentRenderer for MarkdownPdfRenderer {
    fn render(&self, draft: &InvoiceDraft, totals: &TotalsResult, meta: &DocumentMeta) -> Result<RenderedDocument> {
        let markdown = generate_markdown(draft, totals, meta);
        let stem = format!("invoice-{}", file_stem(&meta.invoice_number));

        match self.convert_to_pdf(&markdown, &stem) {
            Ok(bytes) => {
                debug!(invoice_number = %meta.invoice_number, size = bytes.len(), "rendered PDF");
                Ok(RenderedDocument {
                    file_name: format!("{stem}.pdf"),
                    content_type: mime::APPLICATION_PDF.to_string(),
                    bytes,
                })
            }
            Err(e) => {
                warn!(invoice_number = %meta.invoice_number, error = %e, "PDF conversion unavailable, using Markdown");
                Ok(RenderedDocument {
                    file_name: format!("{stem}.md"),
                    content_type: MARKDOWN_CONTENT_TYPE.to_string(),
                    bytes: markdown.into_bytes(),
                })
            }
        }
    }
}

/// Invoice numbers come from callers, keep them safe for file names
fn file_stem(invoice_number: &str) -> String {
    invoice_number
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Markdown layout of an invoice
pub fn generate_markdown(draft: &InvoiceDraft, totals: &TotalsResult, meta: &DocumentMeta) -> String {
    let currency = draft.currency;
    let mut content = String::new();

    let _ = writeln!(content, "# {}\n", meta.company.name);
    let _ = writeln!(content, "{}\n", meta.company.email);

    let _ = writeln!(content, "## Sales Invoice {}\n", meta.invoice_number);
    let _ = writeln!(content, "| | |");
    let _ = writeln!(content, "|---|---|");
    let _ = writeln!(content, "| Invoice date | {} |", meta.issued_on.format("%d/%m/%Y"));
    if let Some(due) = &draft.due_date {
        let _ = writeln!(content, "| Due date | {due} |");
    }
    if let Some(code) = &draft.metadata.project_code {
        let _ = writeln!(content, "| Your reference | {code} |");
    }
    let _ = writeln!(content, "| Currency | {} |\n", currency.code());

    content.push_str("### Invoice address\n\n");
    if let Some(client) = &draft.client {
        let _ = writeln!(content, "**{}**  ", client.name);
        if let Some(tax_id) = &client.tax_id {
            let _ = writeln!(content, "TIN: {tax_id}  ");
        }
        if let Some(address) = &client.address {
            for line in address.lines() {
                let _ = writeln!(content, "{line}  ");
            }
        }
        if let Some(email) = &client.email {
            let _ = writeln!(content, "{email}  ");
        }
    }
    content.push('\n');

    content.push_str("| # | Description | Unit price | Qty | VAT (%) | VAT | Amount |\n");
    content.push_str("|---|---|--:|--:|--:|--:|--:|\n");
    for (index, item) in draft.items.iter().enumerate() {
        let line = LineBreakdown::for_item(item, &meta.rates);
        let description = if item.description.trim().is_empty() {
            "Service"
        } else {
            item.description.as_str()
        };
        let _ = writeln!(
            content,
            "| ITEM-{:03} | {} | {:.2} | {} | {:.0} | {:.2} | {:.2} |",
            index + 1,
            description.replace('|', "\\|"),
            item.unit_price.value().unwrap_or(0.0),
            item.qty.value().unwrap_or(0.0),
            line.tax_rate * 100.0,
            line.tax,
            line.line_total,
        );
    }
    content.push('\n');

    content.push_str("| | |\n|---|--:|\n");
    let _ = writeln!(content, "| Subtotal | {} |", currency.format_amount(totals.subtotal));
    if totals.markup_total != 0.0 {
        let _ = writeln!(content, "| Markups | {} |", currency.format_amount(totals.markup_total));
    }
    if totals.discount_total != 0.0 {
        let _ = writeln!(content, "| Discounts | -{} |", currency.format_amount(totals.discount_total));
    }
    let _ = writeln!(content, "| Add VAT | {} |", currency.format_amount(totals.total_tax));
    let _ = writeln!(content, "| **Grand total** | **{}** |\n", currency.format_amount(totals.final_total));

    if let Some(notes) = draft.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        let _ = writeln!(content, "**Notes**\n\n{notes}");
    }

    content
}
