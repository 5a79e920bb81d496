use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::{Currency, NumericField};

/// Billing details of the invoiced client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
}

/// Tax bucket of a line item. Unknown or missing categories are standard-rated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxCategory {
    #[default]
    Standard,
    Reduced,
    Zero,
}

impl TaxCategory {
    pub const ALL: [TaxCategory; 3] = [TaxCategory::Standard, TaxCategory::Reduced, TaxCategory::Zero];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaxCategory::Standard => "standard",
            TaxCategory::Reduced => "reduced",
            TaxCategory::Zero => "zero",
        }
    }

    /// Lenient lookup; anything unrecognised falls back to `Standard`.
    pub fn from_label(label: &str) -> TaxCategory {
        match label.trim().to_ascii_lowercase().as_str() {
            "reduced" => TaxCategory::Reduced,
            "zero" => TaxCategory::Zero,
            _ => TaxCategory::Standard,
        }
    }

    pub fn next(&self) -> TaxCategory {
        match self {
            TaxCategory::Standard => TaxCategory::Reduced,
            TaxCategory::Reduced => TaxCategory::Zero,
            TaxCategory::Zero => TaxCategory::Standard,
        }
    }
}

impl fmt::Display for TaxCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaxCategory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(s)) => TaxCategory::from_label(&s),
            _ => TaxCategory::Standard,
        })
    }
}

/// One billable row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub qty: NumericField,
    #[serde(default)]
    pub unit_price: NumericField,
    #[serde(default)]
    pub tax_category: TaxCategory,
}

impl LineItem {
    pub fn new(description: &str, qty: f64, unit_price: f64, tax_category: TaxCategory) -> Self {
        Self {
            description: description.to_string(),
            qty: NumericField::new(qty),
            unit_price: NumericField::new(unit_price),
            tax_category,
        }
    }
}

/// How an adjustment value is applied
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum AdjustmentKind {
    /// Percentage of the item subtotal
    #[default]
    Percentage,
    /// Fixed amount
    Amount,
    /// Any other label; contributes nothing
    Other(String),
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &str {
        match self {
            AdjustmentKind::Percentage => "percentage",
            AdjustmentKind::Amount => "amount",
            AdjustmentKind::Other(label) => label,
        }
    }

    pub fn from_label(label: &str) -> AdjustmentKind {
        match label {
            "percentage" => AdjustmentKind::Percentage,
            "amount" => AdjustmentKind::Amount,
            other => AdjustmentKind::Other(other.to_string()),
        }
    }

    /// Kind of an adjustment that arrived without a `type`
    fn unspecified() -> AdjustmentKind {
        AdjustmentKind::Other(String::new())
    }

    pub fn toggle(&self) -> AdjustmentKind {
        match self {
            AdjustmentKind::Percentage => AdjustmentKind::Amount,
            _ => AdjustmentKind::Percentage,
        }
    }
}

impl Serialize for AdjustmentKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AdjustmentKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(s)) => AdjustmentKind::from_label(&s),
            Some(other) => AdjustmentKind::Other(other.to_string()),
            None => AdjustmentKind::unspecified(),
        })
    }
}

/// A markup (extra charge) or a discount
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    #[serde(rename = "type", default = "AdjustmentKind::unspecified")]
    pub kind: AdjustmentKind,
    #[serde(default)]
    pub value: NumericField,
}

impl Adjustment {
    pub fn percentage(value: f64) -> Self {
        Self {
            kind: AdjustmentKind::Percentage,
            value: NumericField::new(value),
        }
    }

    pub fn amount(value: f64) -> Self {
        Self {
            kind: AdjustmentKind::Amount,
            value: NumericField::new(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_code: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Invoice input as held by the form or posted to the generation function.
/// Never persisted as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default)]
    pub client: Option<ClientInfo>,
    #[serde(default, deserialize_with = "lenient_items")]
    pub items: Vec<LineItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub markups: Vec<Adjustment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub discounts: Vec<Adjustment>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub currency: Currency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: DraftMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_recipients: Option<Vec<String>>,
}

/// An explicit `null` reads the same as a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Entries that are not line item objects become blank lines, which
/// contribute nothing to the totals.
fn lenient_items<'de, D>(deserializer: D) -> Result<Vec<LineItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            Value::Object(_) => serde_json::from_value(entry).unwrap_or_default(),
            _ => LineItem::default(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_external_system_payload() {
        let payload = r#"{
            "sourceSystem": "ExistingBillingSystem",
            "sourceId": "PO-2025-0812-123",
            "client": { "name": "Acme Corp", "email": "finance@acme.example", "taxId": "TAX-1" },
            "items": [
                { "description": "Development services", "qty": 120, "unitPrice": 30.5, "taxCategory": "standard" }
            ],
            "currency": "USD",
            "dueDate": "2025-09-30",
            "metadata": { "projectCode": "PRJ-7", "region": "emea" },
            "emailRecipients": ["finance@acme.example"]
        }"#;

        let draft: InvoiceDraft = serde_json::from_str(payload).unwrap();

        let client = draft.client.as_ref().unwrap();
        assert_eq!(client.name, "Acme Corp");
        assert_eq!(client.tax_id.as_deref(), Some("TAX-1"));
        assert_eq!(draft.items.len(), 1);
        assert_eq!(draft.items[0].qty.value(), Some(120.0));
        assert_eq!(draft.items[0].unit_price.value(), Some(30.5));
        assert!(draft.markups.is_empty());
        assert_eq!(draft.metadata.project_code.as_deref(), Some("PRJ-7"));
        assert_eq!(draft.metadata.extra.get("region"), Some(&Value::from("emea")));
        assert_eq!(draft.email_recipients.unwrap(), vec!["finance@acme.example"]);
    }

    #[test]
    fn missing_collections_and_currency_take_defaults() {
        let draft: InvoiceDraft = serde_json::from_str(r#"{ "client": { "name": "A" } }"#).unwrap();

        assert!(draft.items.is_empty());
        assert!(draft.discounts.is_empty());
        assert_eq!(draft.currency, Currency::Usd);
    }

    #[test]
    fn malformed_line_fields_do_not_fail_parsing() {
        let item: LineItem = serde_json::from_str(
            r#"{ "description": "x", "qty": "lots", "unitPrice": null, "taxCategory": "luxury" }"#,
        )
        .unwrap();

        assert_eq!(item.qty, NumericField::ABSENT);
        assert_eq!(item.unit_price, NumericField::ABSENT);
        assert_eq!(item.tax_category, TaxCategory::Standard);
    }

    #[test]
    fn adjustment_kinds_round_trip_their_labels() {
        let adj: Adjustment = serde_json::from_str(r#"{ "type": "bonus", "value": 3 }"#).unwrap();
        assert_eq!(adj.kind, AdjustmentKind::Other("bonus".to_string()));
        assert_eq!(serde_json::to_value(&adj).unwrap()["type"], "bonus");

        let adj: Adjustment = serde_json::from_str(r#"{ "type": "amount", "value": "2000" }"#).unwrap();
        assert_eq!(adj, Adjustment::amount(2000.0));
    }

    #[test]
    fn adjustment_without_type_is_not_a_percentage() {
        let adj: Adjustment = serde_json::from_str(r#"{ "value": 10 }"#).unwrap();
        assert_eq!(adj.kind, AdjustmentKind::Other(String::new()));
    }

    #[test]
    fn null_collections_read_as_missing() {
        let draft: InvoiceDraft = serde_json::from_str(
            r#"{
                "client": { "name": "A" },
                "items": [ { "description": "x", "qty": 1, "unitPrice": 10 } ],
                "markups": null,
                "discounts": null,
                "currency": null,
                "metadata": null
            }"#,
        )
        .unwrap();

        assert_eq!(draft.items.len(), 1);
        assert!(draft.markups.is_empty());
        assert!(draft.discounts.is_empty());
        assert_eq!(draft.currency, Currency::Usd);
        assert_eq!(draft.metadata, DraftMetadata::default());
    }

    #[test]
    fn non_object_items_become_blank_lines() {
        let draft: InvoiceDraft = serde_json::from_str(
            r#"{ "items": [ 5, "text", { "description": 7 }, { "description": "ok", "qty": 2, "unitPrice": 3 } ] }"#,
        )
        .unwrap();

        assert_eq!(draft.items.len(), 4);
        assert_eq!(draft.items[0], LineItem::default());
        assert_eq!(draft.items[1], LineItem::default());
        assert_eq!(draft.items[2], LineItem::default());
        assert_eq!(draft.items[3], LineItem::new("ok", 2.0, 3.0, TaxCategory::Standard));
    }

    #[test]
    fn items_that_are_not_a_sequence_fail_parsing() {
        assert!(serde_json::from_str::<InvoiceDraft>(r#"{ "items": "many" }"#).is_err());
        let draft: InvoiceDraft = serde_json::from_str(r#"{ "items": null }"#).unwrap();
        assert!(draft.items.is_empty());
    }

    #[test]
    fn unsupported_currency_is_a_parse_error() {
        let result = serde_json::from_str::<InvoiceDraft>(r#"{ "currency": "JPY" }"#);
        assert!(result.is_err());
    }
}
