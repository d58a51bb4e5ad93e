//! Ratio engine: derive financial ratios from a merged record.
//!
//! ## Missing, not zero
//!
//! Extracted amounts are OCR text: `"$1,000"`, `"(250)"`, `"n/a"`, or a list of
//! candidates when several chunks reported the same field. [`safe_convert`]
//! turns what it can into a number and reports everything else as `None`. A
//! ratio is only emitted when every input resolved and its divisor is not
//! zero, so a blurry page never turns into a `0.00` ratio.

use crate::record::{lookup, ExtractedRecord, FieldValue, VALUE_KEY};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ── Field paths used by the extraction processor ─────────────────────────────

pub const ASSETS: &str = "Assets";
pub const LIABILITIES: &str = "Liabilities";
pub const PROFIT_LOSS: &str = "Profit-Loss-Statement";
pub const YEAR: &str = "Year";

// ── Numeric coercion ─────────────────────────────────────────────────────────

/// Unsigned decimal with at most one decimal point: `12`, `12.5`, `12.`, `.5`.
static RE_UNSIGNED_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9]+\.?[0-9]*|\.[0-9]+)$").unwrap());

/// Parse one amount after removing `$` and `,`.
pub fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| *c != '$' && *c != ',').collect();
    if !RE_UNSIGNED_DECIMAL.is_match(&cleaned) {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Best-effort conversion of a field to a number.
///
/// * Group → its `"value"` entry, then the rules below.
/// * Sequence → the first scalar element that parses.
/// * Scalar → [`parse_amount`].
pub fn safe_convert(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Group(group) => match group.get(VALUE_KEY)? {
            FieldValue::Group(_) => None,
            inner => safe_convert(inner),
        },
        FieldValue::Sequence(items) => {
            let found = items
                .iter()
                .filter_map(FieldValue::as_scalar)
                .find_map(parse_amount);
            if found.is_none() {
                warn!("No valid numbers found in list: {:?}", items);
            }
            found
        }
        FieldValue::Scalar(text) => parse_amount(text),
    }
}

fn field(record: &ExtractedRecord, parent: &str, child: &str) -> Option<f64> {
    lookup(record, parent, child).and_then(safe_convert)
}

// ── Inputs ───────────────────────────────────────────────────────────────────

/// The amounts the ratios are built from, each `None` when missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FinancialInputs {
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub borrowings: Option<f64>,
    pub net_profit: Option<f64>,
    pub ebitda: Option<f64>,
    pub total_expenses: Option<f64>,
    pub total_income: Option<f64>,
    pub total_revenue: Option<f64>,
    pub total_equity: Option<f64>,
}

impl FinancialInputs {
    pub fn from_record(record: &ExtractedRecord) -> Self {
        Self {
            total_assets: field(record, ASSETS, "Total-Assets"),
            total_liabilities: field(record, LIABILITIES, "Total-Liabilities"),
            borrowings: field(record, LIABILITIES, "Borrowings"),
            net_profit: field(record, PROFIT_LOSS, "Net-Profit"),
            ebitda: field(record, PROFIT_LOSS, "EBIDTA"),
            total_expenses: field(record, PROFIT_LOSS, "Total-Expenses"),
            total_income: field(record, PROFIT_LOSS, "Total-Income"),
            total_revenue: field(record, PROFIT_LOSS, "Total-Revenue"),
            total_equity: field(record, PROFIT_LOSS, "Total-Equity"),
        }
    }
}

// ── Ratios ───────────────────────────────────────────────────────────────────

/// The fixed set of ratios, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ratio {
    DebtToAssets,
    DebtToEquity,
    ReturnOnAssets,
    ReturnOnEquity,
    NetProfitMargin,
    TotalAssetTurnover,
    EbitdaMargin,
    DebtServiceCoverage,
    ExpenseToRevenue,
    GrossProfitMargin,
    Leverage,
    EquityMultiplier,
}

impl Ratio {
    pub const ALL: [Ratio; 12] = [
        Ratio::DebtToAssets,
        Ratio::DebtToEquity,
        Ratio::ReturnOnAssets,
        Ratio::ReturnOnEquity,
        Ratio::NetProfitMargin,
        Ratio::TotalAssetTurnover,
        Ratio::EbitdaMargin,
        Ratio::DebtServiceCoverage,
        Ratio::ExpenseToRevenue,
        Ratio::GrossProfitMargin,
        Ratio::Leverage,
        Ratio::EquityMultiplier,
    ];

    /// Key used in the JSON and CSV artifacts.
    pub fn label(self) -> &'static str {
        match self {
            Ratio::DebtToAssets => "Debt-to-Assets-Ratio",
            Ratio::DebtToEquity => "Debt-to-Equity-Ratio",
            Ratio::ReturnOnAssets => "Return on Assets",
            Ratio::ReturnOnEquity => "Return on Equity",
            Ratio::NetProfitMargin => "Net Profit Margin",
            Ratio::TotalAssetTurnover => "Total Asset Turnover Ratio",
            Ratio::EbitdaMargin => "EBITDA Margin",
            Ratio::DebtServiceCoverage => "Debt Service Coverage Ratio",
            Ratio::ExpenseToRevenue => "Expense-to-Revenue Ratio",
            Ratio::GrossProfitMargin => "Gross Profit Margin",
            Ratio::Leverage => "Leverage Ratio",
            Ratio::EquityMultiplier => "Equity Multiplier",
        }
    }

    /// Compute this ratio, or `None` when an input is missing or the divisor
    /// is zero.
    pub fn compute(self, i: &FinancialInputs) -> Option<f64> {
        match self {
            Ratio::DebtToAssets | Ratio::Leverage => divide(i.total_liabilities, i.total_assets),
            Ratio::DebtToEquity => divide(i.total_liabilities, i.total_equity),
            Ratio::ReturnOnAssets => divide(i.net_profit, i.total_assets),
            Ratio::ReturnOnEquity => divide(i.net_profit, i.total_equity),
            Ratio::NetProfitMargin => percent(i.net_profit, i.total_revenue),
            Ratio::TotalAssetTurnover => divide(i.total_revenue, i.total_assets),
            Ratio::EbitdaMargin => percent(i.ebitda, i.total_revenue),
            Ratio::DebtServiceCoverage => divide(i.ebitda, i.borrowings),
            Ratio::ExpenseToRevenue => divide(i.total_expenses, i.total_revenue),
            Ratio::GrossProfitMargin => {
                let gross = i.total_revenue.zip(i.total_expenses).map(|(r, e)| r - e);
                percent(gross, i.total_revenue)
            }
            Ratio::EquityMultiplier => divide(i.total_assets, i.total_equity),
        }
    }
}

fn quotient(numerator: Option<f64>, divisor: Option<f64>) -> Option<f64> {
    let (n, d) = (numerator?, divisor?);
    if d == 0.0 {
        return None;
    }
    Some(n / d)
}

fn divide(numerator: Option<f64>, divisor: Option<f64>) -> Option<f64> {
    quotient(numerator, divisor).and_then(round2)
}

fn percent(numerator: Option<f64>, divisor: Option<f64>) -> Option<f64> {
    quotient(numerator, divisor).and_then(|q| round2(q * 100.0))
}

/// Round to two decimals on the exact binary value.
pub fn round2(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    format!("{value:.2}").parse().ok()
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Ratio label → rounded value, in [`Ratio::ALL`] order, missing ratios absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalculatedMetrics(IndexMap<String, f64>);

impl CalculatedMetrics {
    pub fn get(&self, ratio: Ratio) -> Option<f64> {
        self.0.get(ratio.label()).copied()
    }

    /// Look a metric up by its artifact label.
    pub fn get_label(&self, label: &str) -> Option<f64> {
        self.0.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Compute every ratio whose inputs are available.
pub fn calculate_metrics(record: &ExtractedRecord) -> CalculatedMetrics {
    let inputs = FinancialInputs::from_record(record);

    if let Some(year) = record.get(YEAR) {
        let year = year.child(VALUE_KEY).unwrap_or(year);
        info!("Calculations for year: {}", year);
    }

    let mut metrics = IndexMap::new();
    for ratio in Ratio::ALL {
        match ratio.compute(&inputs) {
            Some(value) => {
                metrics.insert(ratio.label().to_string(), value);
            }
            None => debug!("Skipping {}: missing input or zero divisor", ratio.label()),
        }
    }

    info!(
        "Extracted values: Total-Assets={:?}, Total-Liabilities={:?}, Total-Equity={:?}, \
         Net-Profit={:?}, Total-Revenue={:?}, Total-Expenses={:?}",
        inputs.total_assets,
        inputs.total_liabilities,
        inputs.total_equity,
        inputs.net_profit,
        inputs.total_revenue,
        inputs.total_expenses
    );
    info!("Calculated {} of {} financial metrics", metrics.len(), Ratio::ALL.len());

    CalculatedMetrics(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldGroup;

    fn record(sections: &[(&str, &[(&str, &str)])]) -> ExtractedRecord {
        let mut r = ExtractedRecord::new();
        for (section, fields) in sections {
            let mut g = FieldGroup::new();
            for (k, v) in *fields {
                g.insert((*k).to_string(), FieldValue::scalar(*v));
            }
            r.insert((*section).to_string(), FieldValue::Group(g));
        }
        r
    }

    #[test]
    fn parse_amount_accepts_currency_text() {
        assert_eq!(parse_amount("$1,000"), Some(1000.0));
        assert_eq!(parse_amount("1,234.56"), Some(1234.56));
        assert_eq!(parse_amount("12."), Some(12.0));
        assert_eq!(parse_amount(".5"), Some(0.5));
        assert_eq!(parse_amount("0"), Some(0.0));
    }

    #[test]
    fn parse_amount_rejects_non_numbers() {
        for text in ["", ".", "-5", "(250)", "1.2.3", "n/a", "1e5", " 12", "12\n", "$"] {
            assert_eq!(parse_amount(text), None, "{text:?} should be missing");
        }
    }

    #[test]
    fn safe_convert_unwraps_value_groups() {
        assert_eq!(safe_convert(&FieldValue::wrapped("$2,500".into())), Some(2500.0));
        assert_eq!(safe_convert(&FieldValue::empty_group()), None);
    }

    #[test]
    fn safe_convert_takes_first_numeric_list_element() {
        let list = FieldValue::Sequence(vec![
            FieldValue::scalar("n/a"),
            FieldValue::wrapped("7".into()),
            FieldValue::scalar("$3"),
            FieldValue::scalar("4"),
        ]);
        assert_eq!(safe_convert(&list), Some(3.0));
        assert_eq!(safe_convert(&FieldValue::Sequence(vec![])), None);
    }

    #[test]
    fn debt_to_assets_from_currency_strings() {
        let r = record(&[
            (ASSETS, &[("Total-Assets", "$1,000")]),
            (LIABILITIES, &[("Total-Liabilities", "500")]),
        ]);
        let m = calculate_metrics(&r);
        assert_eq!(m.get(Ratio::DebtToAssets), Some(0.5));
        assert_eq!(m.get(Ratio::Leverage), Some(0.5));
    }

    #[test]
    fn missing_liabilities_omits_ratio() {
        let r = record(&[(ASSETS, &[("Total-Assets", "1000")])]);
        let m = calculate_metrics(&r);
        assert_eq!(m.get(Ratio::DebtToAssets), None);
        assert!(m.is_empty());
    }

    #[test]
    fn zero_divisor_omits_ratio() {
        let r = record(&[
            (ASSETS, &[("Total-Assets", "0")]),
            (LIABILITIES, &[("Total-Liabilities", "500")]),
        ]);
        let m = calculate_metrics(&r);
        assert_eq!(m.get(Ratio::DebtToAssets), None);
        assert_eq!(m.get(Ratio::Leverage), None);
    }

    #[test]
    fn zero_numerator_is_reported() {
        let r = record(&[
            (ASSETS, &[("Total-Assets", "1000")]),
            (LIABILITIES, &[("Total-Liabilities", "0")]),
        ]);
        assert_eq!(calculate_metrics(&r).get(Ratio::DebtToAssets), Some(0.0));
    }

    #[test]
    fn full_statement_produces_all_ratios_in_order() {
        let r = record(&[
            (ASSETS, &[("Total-Assets", "2,000")]),
            (
                LIABILITIES,
                &[("Total-Liabilities", "800"), ("Borrowings", "300")],
            ),
            (
                PROFIT_LOSS,
                &[
                    ("Net-Profit", "180"),
                    ("EBIDTA", "450"),
                    ("Total-Expenses", "600"),
                    ("Total-Revenue", "1,000"),
                    ("Total-Equity", "1,200"),
                ],
            ),
        ]);
        let m = calculate_metrics(&r);
        let labels: Vec<&str> = m.iter().map(|(k, _)| k).collect();
        let expected: Vec<&str> = Ratio::ALL.iter().map(|r| r.label()).collect();
        assert_eq!(labels, expected);

        assert_eq!(m.get(Ratio::DebtToAssets), Some(0.4));
        assert_eq!(m.get(Ratio::DebtToEquity), Some(0.67));
        assert_eq!(m.get(Ratio::ReturnOnAssets), Some(0.09));
        assert_eq!(m.get(Ratio::ReturnOnEquity), Some(0.15));
        assert_eq!(m.get(Ratio::NetProfitMargin), Some(18.0));
        assert_eq!(m.get(Ratio::TotalAssetTurnover), Some(0.5));
        assert_eq!(m.get(Ratio::EbitdaMargin), Some(45.0));
        assert_eq!(m.get(Ratio::DebtServiceCoverage), Some(1.5));
        assert_eq!(m.get(Ratio::ExpenseToRevenue), Some(0.6));
        assert_eq!(m.get(Ratio::GrossProfitMargin), Some(40.0));
        assert_eq!(m.get(Ratio::Leverage), Some(0.4));
        assert_eq!(m.get(Ratio::EquityMultiplier), Some(1.67));
    }

    #[test]
    fn gross_margin_may_be_negative() {
        let r = record(&[(
            PROFIT_LOSS,
            &[("Total-Revenue", "100"), ("Total-Expenses", "150")],
        )]);
        assert_eq!(calculate_metrics(&r).get(Ratio::GrossProfitMargin), Some(-50.0));
    }

    #[test]
    fn scalar_section_is_missing_not_fatal() {
        let mut r = ExtractedRecord::new();
        r.insert(ASSETS.into(), FieldValue::scalar("Assets"));
        r.insert(LIABILITIES.into(), FieldValue::scalar("Liabilities"));
        assert!(calculate_metrics(&r).is_empty());
    }

    #[test]
    fn section_reported_by_several_chunks_is_searched() {
        let mut assets = FieldGroup::new();
        assets.insert("Total-Assets".into(), FieldValue::scalar("400"));
        let mut liabilities = FieldGroup::new();
        liabilities.insert("Total-Liabilities".into(), FieldValue::scalar("100"));

        let mut r = ExtractedRecord::new();
        r.insert(
            ASSETS.into(),
            FieldValue::Sequence(vec![FieldValue::scalar("cover"), FieldValue::Group(assets)]),
        );
        r.insert(LIABILITIES.into(), FieldValue::Group(liabilities));
        assert_eq!(calculate_metrics(&r).get(Ratio::DebtToAssets), Some(0.25));
    }

    #[test]
    fn round2_uses_binary_value() {
        assert_eq!(round2(2.675), Some(2.67));
        assert_eq!(round2(1.0 / 3.0), Some(0.33));
        assert_eq!(round2(2.0 / 3.0), Some(0.67));
        assert_eq!(round2(f64::INFINITY), None);
    }
}
