use serde::Serialize;

use super::Services;
use crate::db::InvoiceQuery;
use crate::error::Result;
use crate::models::{Invoice, InvoiceStatus};

/// Invoices shown under the summary figures
pub const RECENT_INVOICES: usize = 10;

const SCAN_PAGE_SIZE: usize = 100;

/// Summary figures across all stored invoices.
///
/// Amounts are plain sums of final totals; invoices in different currencies
/// are not converted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_invoices: usize,
    pub total_revenue: f64,
    /// Invoices that were sent and are not paid yet
    pub pending_invoices: usize,
    pub pending_amount: f64,
    pub paid_invoices: usize,
    /// Newest first
    pub recent: Vec<Invoice>,
}

impl Services {
    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        let (total_invoices, total_revenue) = self.status_summary(None).await?;
        let (pending_invoices, pending_amount) = self.status_summary(Some(InvoiceStatus::Sent)).await?;

        let paid = self
            .invoices
            .list_invoices(&InvoiceQuery {
                status: Some(InvoiceStatus::Paid),
                limit: 1,
                ..InvoiceQuery::default()
            })
            .await?;
        let recent = self
            .invoices
            .list_invoices(&InvoiceQuery {
                limit: RECENT_INVOICES,
                ..InvoiceQuery::default()
            })
            .await?;

        Ok(DashboardStats {
            total_invoices,
            total_revenue,
            pending_invoices,
            pending_amount,
            paid_invoices: paid.total,
            recent: recent.items,
        })
    }

    /// Count and summed final totals of the invoices with `status`
    async fn status_summary(&self, status: Option<InvoiceStatus>) -> Result<(usize, f64)> {
        let mut query = InvoiceQuery {
            status,
            limit: SCAN_PAGE_SIZE,
            ..InvoiceQuery::default()
        };
        let mut amount = 0.0;

        loop {
            let page = self.invoices.list_invoices(&query).await?;
            amount += page.items.iter().map(|i| i.totals.final_total).sum::<f64>();
            if page.items.is_empty() || query.page * query.limit >= page.total {
                return Ok((page.total, amount));
            }
            query.page += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineItem, TaxCategory};
    use crate::service::test_support::{draft, services};

    #[tokio::test]
    async fn empty_store_has_zero_stats() {
        let (services, _) = services();
        assert_eq!(services.dashboard_stats().await.unwrap(), DashboardStats::default());
    }

    #[tokio::test]
    async fn stats_follow_invoice_statuses() {
        let (services, _) = services();
        let mut ids = Vec::new();
        for qty in [1.0, 2.0, 3.0] {
            let mut draft = draft();
            draft.items = vec![LineItem::new("Hours", qty, 100.0, TaxCategory::Zero)];
            ids.push(services.generate_invoice(draft).await.unwrap().invoice_id);
        }
        services.update_status(&ids[0], InvoiceStatus::Paid).await.unwrap();
        services.update_status(&ids[2], InvoiceStatus::Sent).await.unwrap();

        let stats = services.dashboard_stats().await.unwrap();

        assert_eq!(stats.total_invoices, 3);
        assert_eq!(stats.total_revenue, 600.0);
        assert_eq!(stats.paid_invoices, 1);
        assert_eq!(stats.recent.len(), 3);
        assert_eq!(stats.recent[0].id, ids[2]);
        assert_eq!(stats.pending_invoices, 1);
        assert_eq!(stats.pending_amount, 300.0);
    }

    #[tokio::test]
    async fn revenue_spans_more_than_one_scan_page() {
        let (services, _) = services();
        for _ in 0..(SCAN_PAGE_SIZE + 5) {
            let mut draft = draft();
            draft.items = vec![LineItem::new("Fee", 1.0, 10.0, TaxCategory::Zero)];
            services.generate_invoice(draft).await.unwrap();
        }

        let stats = services.dashboard_stats().await.unwrap();

        assert_eq!(stats.total_invoices, SCAN_PAGE_SIZE + 5);
        assert_eq!(stats.total_revenue, 1050.0);
        assert_eq!(stats.recent.len(), RECENT_INVOICES);
    }
}
