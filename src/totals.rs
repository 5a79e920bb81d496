//! Invoice money math.
//!
//! This is the one place totals are computed. The invoice form preview, the
//! generation service and the `totals` command all call [`compute_totals`]
//! with the configured [`TaxRateTable`], so a preview can never disagree with
//! the persisted invoice.
//!
//! Tax is charged on the raw line totals. Markups and discounts move the
//! subtotal but leave the tax untouched.

use serde::{Deserialize, Serialize};

use crate::models::{Adjustment, AdjustmentKind, InvoiceDraft, LineItem, TaxCategory};

/// Tax rate per category, as a fraction (0.21 = 21%)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxRateTable {
    pub standard: f64,
    pub reduced: f64,
    pub zero: f64,
}

impl Default for TaxRateTable {
    fn default() -> Self {
        Self {
            standard: 0.21,
            reduced: 0.09,
            zero: 0.0,
        }
    }
}

impl TaxRateTable {
    pub fn rate_for(&self, category: TaxCategory) -> f64 {
        match category {
            TaxCategory::Standard => self.standard,
            TaxCategory::Reduced => self.reduced,
            TaxCategory::Zero => self.zero,
        }
    }
}

/// The five derived figures of an invoice
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsResult {
    pub subtotal: f64,
    pub markup_total: f64,
    pub discount_total: f64,
    pub total_tax: f64,
    pub final_total: f64,
}

impl TotalsResult {
    pub fn adjusted_subtotal(&self) -> f64 {
        self.subtotal + self.markup_total - self.discount_total
    }
}

/// Per-line figures, shared by the totals and by anything that lays out lines
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LineBreakdown {
    pub line_total: f64,
    pub tax_rate: f64,
    pub tax: f64,
}

impl LineBreakdown {
    /// Breakdown of a single line. Lines without a positive quantity and unit
    /// price, or whose amount overflows, are skipped and break down to zero.
    pub fn for_item(item: &LineItem, rates: &TaxRateTable) -> LineBreakdown {
        let tax_rate = rates.rate_for(item.tax_category);
        let amount = item
            .qty
            .contributing()
            .zip(item.unit_price.contributing())
            .map(|(qty, unit_price)| qty * unit_price)
            .filter(|amount| amount.is_finite() && (amount * tax_rate).is_finite());
        match amount {
            Some(line_total) => LineBreakdown {
                line_total,
                tax_rate,
                tax: line_total * tax_rate,
            },
            None => LineBreakdown {
                tax_rate,
                ..LineBreakdown::default()
            },
        }
    }
}

/// Compute the totals of a draft.
///
/// Never fails: missing, non-numeric or non-positive quantities, prices and
/// adjustment values contribute nothing. Percentages of markups and discounts
/// are both taken from the item subtotal.
pub fn compute_totals(draft: &InvoiceDraft, rates: &TaxRateTable) -> TotalsResult {
    let mut subtotal = 0.0;
    let mut total_tax = 0.0;

    for item in &draft.items {
        let line = LineBreakdown::for_item(item, rates);
        if line.line_total != 0.0 && (subtotal + line.line_total + total_tax + line.tax).is_finite() {
            subtotal += line.line_total;
            total_tax += line.tax;
        }
    }

    let markup_total = adjustment_total(&draft.markups, subtotal);
    let discount_total = adjustment_total(&draft.discounts, subtotal);

    let adjusted_subtotal = subtotal + markup_total - discount_total;
    let final_total = adjusted_subtotal + total_tax;

    TotalsResult {
        subtotal,
        markup_total,
        discount_total,
        total_tax,
        final_total,
    }
}

fn adjustment_total(adjustments: &[Adjustment], subtotal: f64) -> f64 {
    let mut total = 0.0;
    for adjustment in adjustments {
        let Some(value) = adjustment.value.contributing() else {
            continue;
        };
        let amount = match adjustment.kind {
            AdjustmentKind::Percentage => subtotal * (value / 100.0),
            AdjustmentKind::Amount => value,
            AdjustmentKind::Other(_) => continue,
        };
        if (total + amount).is_finite() {
            total += amount;
        }
    }
    total
}
