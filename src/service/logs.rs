use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Services;
use crate::db::LogQuery;
use crate::error::{BillingError, Result};
use crate::models::{LogEntry, LogOperation, NumericField};

pub const DEFAULT_LOG_LIMIT: usize = 50;
pub const MAX_LOG_LIMIT: usize = 100;

/// Body of the get-logs function
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsRequest {
    #[serde(default, rename = "invoiceID", alias = "invoiceId")]
    pub invoice_id: Option<String>,
    /// An operation name, or `all`
    #[serde(default, alias = "operation")]
    pub action: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub page: NumericField,
    #[serde(default)]
    pub limit: NumericField,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogsPage {
    pub logs: Vec<LogEntry>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_operation(action: Option<&str>) -> Result<Option<LogOperation>> {
    match action {
        None | Some("all") => Ok(None),
        Some(name) => name
            .parse()
            .map(Some)
            .map_err(|_| BillingError::Validation(format!("Unknown action '{name}'"))),
    }
}

/// RFC 3339 timestamp or a bare `YYYY-MM-DD` date. A bare date used as an
/// upper bound covers the whole day.
fn parse_bound(text: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(text) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| BillingError::Validation(format!("Invalid date '{text}'")))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    };

    time.map(|t| Utc.from_utc_datetime(&date.and_time(t)))
        .ok_or_else(|| BillingError::Validation(format!("Invalid date '{text}'")))
}

fn whole_number(field: NumericField, default: usize) -> usize {
    match field.value() {
        Some(v) if v >= 1.0 => v.floor().min(usize::MAX as f64) as usize,
        Some(_) => 1,
        None => default,
    }
}

impl LogsRequest {
    /// Resolve the request into a store query plus the effective page and limit
    pub fn to_query(&self) -> Result<(LogQuery, usize, usize)> {
        let page = whole_number(self.page, 1);
        let limit = whole_number(self.limit, DEFAULT_LOG_LIMIT).clamp(1, MAX_LOG_LIMIT);

        let query = LogQuery {
            invoice_id: non_blank(&self.invoice_id).map(str::to_string),
            operation: parse_operation(non_blank(&self.action))?,
            start: non_blank(&self.start_date).map(|d| parse_bound(d, false)).transpose()?,
            end: non_blank(&self.end_date).map(|d| parse_bound(d, true)).transpose()?,
            offset: (page - 1).saturating_mul(limit),
            limit,
        };

        Ok((query, page, limit))
    }
}

impl Services {
    pub async fn get_logs(&self, request: &LogsRequest) -> Result<LogsPage> {
        let (query, page, limit) = request.to_query()?;
        debug!(?query, "querying logs");

        let result = self.logs.query(&query).await?;

        Ok(LogsPage {
            logs: result.items,
            total: result.total,
            page,
            limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::NewLogEntry;
    use crate::service::test_support::services;

    fn request(body: serde_json::Value) -> LogsRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn defaults_to_first_page_of_fifty() {
        let (query, page, limit) = request(json!({})).to_query().unwrap();

        assert_eq!((page, limit), (1, 50));
        assert_eq!(query.offset, 0);
        assert!(query.operation.is_none());
        assert!(query.invoice_id.is_none());
    }

    #[test]
    fn limit_is_clamped_and_offset_follows_it() {
        let (query, page, limit) = request(json!({ "page": 3, "limit": 500 })).to_query().unwrap();
        assert_eq!((page, limit), (3, 100));
        assert_eq!(query.offset, 200);

        let (query, page, limit) = request(json!({ "page": "0", "limit": 0 })).to_query().unwrap();
        assert_eq!((page, limit), (1, 1));
        assert_eq!(query.offset, 0);
    }

    #[test]
    fn action_all_means_no_filter() {
        let (query, ..) = request(json!({ "action": "all" })).to_query().unwrap();
        assert!(query.operation.is_none());

        let (query, ..) = request(json!({ "operation": "invoice_resent" })).to_query().unwrap();
        assert_eq!(query.operation, Some(LogOperation::InvoiceResent));

        let err = request(json!({ "action": "invoice_deleted" })).to_query().unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[test]
    fn accepts_both_invoice_id_spellings() {
        let (query, ..) = request(json!({ "invoiceID": "a" })).to_query().unwrap();
        assert_eq!(query.invoice_id.as_deref(), Some("a"));

        let (query, ..) = request(json!({ "invoiceId": "b" })).to_query().unwrap();
        assert_eq!(query.invoice_id.as_deref(), Some("b"));
    }

    #[test]
    fn bare_end_date_covers_the_whole_day() {
        let (query, ..) = request(json!({ "startDate": "2025-08-01", "endDate": "2025-08-31" }))
            .to_query()
            .unwrap();

        assert_eq!(query.start.unwrap().to_rfc3339(), "2025-08-01T00:00:00+00:00");
        assert_eq!(query.end.unwrap().to_rfc3339(), "2025-08-31T23:59:59.999+00:00");

        let (query, ..) = request(json!({ "startDate": "2025-08-01T10:00:00+02:00" }))
            .to_query()
            .unwrap();
        assert_eq!(query.start.unwrap().to_rfc3339(), "2025-08-01T08:00:00+00:00");

        assert!(request(json!({ "endDate": "yesterday" })).to_query().is_err());
    }

    #[test]
    fn unparsable_date_is_rejected_not_ignored() {
        let err = request(json!({ "startDate": "2025-13-40" })).to_query().unwrap_err();
        assert_eq!(err.to_string(), "Invalid date '2025-13-40'");
    }

    #[tokio::test]
    async fn returns_newest_logs_with_paging_info() {
        let (services, _) = services();
        for n in 0..3 {
            services
                .logs
                .append(NewLogEntry::success(
                    LogOperation::InvoiceGenerated,
                    &format!("inv-{n}"),
                    json!({}),
                ))
                .await
                .unwrap();
        }

        let page = services
            .get_logs(&request(json!({ "page": 2, "limit": 2 })))
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        assert_eq!((page.page, page.limit), (2, 2));
        assert_eq!(page.logs.len(), 1);
        assert_eq!(page.logs[0].invoice_id, "inv-0");
    }
}
