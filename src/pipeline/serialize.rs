//! Render a [`FinalRecord`] as the two downloadable artifacts.
//!
//! * JSON: the record pretty-printed with two-space indentation, keys in
//!   insertion order, every character from U+007F up escaped as `\uXXXX`
//!   (UTF-16 surrogate pairs above the BMP), so the artifact is pure ASCII.
//! * CSV: a fixed 34-column sheet with two header rows (section, field) and a
//!   single data row. Columns never appear or disappear with the data; a
//!   missing field is an empty cell.

use crate::error::FinExtractError;
use crate::output::FinalRecord;
use crate::pipeline::ratios::{Ratio, ASSETS, LIABILITIES, PROFIT_LOSS, YEAR};
use crate::record::{lookup, FieldValue, VALUE_KEY};
use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use std::io;
use tracing::debug;

/// Where a CSV cell takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellSource {
    /// A top-level field.
    Field(&'static str),
    /// `parent.child` in the extracted data.
    Child(&'static str, &'static str),
    /// A calculated ratio.
    Metric(Ratio),
}

/// One CSV column: its two header cells and its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvColumn {
    pub section: &'static str,
    pub label: &'static str,
    pub source: CellSource,
}

const fn col(section: &'static str, label: &'static str, source: CellSource) -> CsvColumn {
    CsvColumn {
        section,
        label,
        source,
    }
}

const fn asset(label: &'static str, field: &'static str) -> CsvColumn {
    col("Assets", label, CellSource::Child(ASSETS, field))
}

const fn liability(label: &'static str, field: &'static str) -> CsvColumn {
    col("Liabilities", label, CellSource::Child(LIABILITIES, field))
}

const fn profit_loss(label: &'static str, field: &'static str) -> CsvColumn {
    col("Profit & Loss", label, CellSource::Child(PROFIT_LOSS, field))
}

const fn metric(label: &'static str, ratio: Ratio) -> CsvColumn {
    col("Calculated Metrics", label, CellSource::Metric(ratio))
}

/// The fixed column layout. `Equity Multiplier` is computed but not exported.
pub const CSV_COLUMNS: [CsvColumn; 34] = [
    col(YEAR, "", CellSource::Field(YEAR)),
    asset("Total Assets", "Total-Assets"),
    asset("Cash and Cash Equivalents", "Cash-and-cash-Equivalents"),
    asset("Fixed Assets", "Fixed-Assets"),
    asset("Investments", "Investments"),
    asset("Loans-and-Advances", "Loans-and-Advances"),
    asset("Other Assets", "Other-Assets"),
    asset("Total Current Assets", "Total-Current-Assets"),
    asset("Total Non-current Assets", "Total-Non-current-Assets"),
    liability("Total Liabilities", "Total-Liabilities"),
    liability("Accounts Payable", "Accounts-Payable"),
    liability("Borrowings", "Borrowings"),
    liability("Capital", "Capital"),
    liability("Deposits", "Deposits"),
    liability("Liabilities-and-Provisions", "Liabilities-and-Provisions"),
    liability("Other-Current-liabilities", "Other-Current-liabilities"),
    liability("Long-term Debt", "Long-term-debt"),
    liability("Reserves and Surplus", "Reserves-and-Surplus"),
    profit_loss("Net Profit", "Net-Profit"),
    profit_loss("EBITDA", "EBIDTA"),
    profit_loss("Total Revenue", "Total-Revenue"),
    profit_loss("Total Expenses", "Total-Expenses"),
    profit_loss("Total-Income", "Total-Income"),
    metric("Debt-to-Assets Ratio", Ratio::DebtToAssets),
    metric("Debt-to-Equity Ratio", Ratio::DebtToEquity),
    metric("Return on Assets", Ratio::ReturnOnAssets),
    metric("Return on Equity", Ratio::ReturnOnEquity),
    metric("Net Profit Margin", Ratio::NetProfitMargin),
    metric("Total Asset Turnover Ratio", Ratio::TotalAssetTurnover),
    metric("EBITDA Margin", Ratio::EbitdaMargin),
    metric("Debt Service Coverage Ratio", Ratio::DebtServiceCoverage),
    metric("Expense-to-Revenue Ratio", Ratio::ExpenseToRevenue),
    metric("Gross Profit Margin", Ratio::GrossProfitMargin),
    metric("Leverage Ratio", Ratio::Leverage),
];

// ── JSON ─────────────────────────────────────────────────────────────────────

/// Two-space pretty printing with ASCII-only string output.
struct AsciiPrettyFormatter<'a> {
    pretty: PrettyFormatter<'a>,
}

impl AsciiPrettyFormatter<'_> {
    fn new() -> Self {
        Self {
            pretty: PrettyFormatter::with_indent(b"  "),
        }
    }
}

impl Formatter for AsciiPrettyFormatter<'_> {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.pretty.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.pretty.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.pretty.end_object_value(writer)
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if ch.is_ascii() && ch != '\x7f' {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..idx])?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units).iter() {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}

/// Pretty-printed, ASCII-only JSON artifact.
pub fn to_json(record: &FinalRecord) -> Result<String, FinExtractError> {
    let json_err = |e: serde_json::Error| FinExtractError::ConversionError(format!("JSON encoding failed: {e}"));

    let mut buf = Vec::with_capacity(1024);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, AsciiPrettyFormatter::new());
    record.serialize(&mut serializer).map_err(json_err)?;
    String::from_utf8(buf)
        .map_err(|e| FinExtractError::ConversionError(format!("JSON is not UTF-8: {e}")))
}

// ── CSV ──────────────────────────────────────────────────────────────────────

/// Text shown in a CSV cell for an extracted field.
pub fn cell_text(value: &FieldValue) -> String {
    match value {
        FieldValue::Scalar(text) => text.clone(),
        FieldValue::Group(group) => group
            .get(VALUE_KEY)
            .and_then(FieldValue::as_scalar)
            .unwrap_or_default()
            .to_string(),
        FieldValue::Sequence(items) => items
            .iter()
            .map(cell_text)
            .find(|text| !text.is_empty())
            .unwrap_or_default(),
    }
}

/// JSON number formatting: `0.5`, `50.0`.
fn metric_text(value: f64) -> String {
    serde_json::Number::from_f64(value)
        .map(|n| n.to_string())
        .unwrap_or_default()
}

fn cell(record: &FinalRecord, source: CellSource) -> String {
    let data = &record.extracted_data;
    match source {
        CellSource::Field(name) => data.get(name).map(cell_text).unwrap_or_default(),
        CellSource::Child(parent, child) => {
            lookup(data, parent, child).map(cell_text).unwrap_or_default()
        }
        CellSource::Metric(ratio) => record
            .calculated_metrics
            .get(ratio)
            .map(metric_text)
            .unwrap_or_default(),
    }
}

/// Flattened CSV artifact: two header rows and one data row, CRLF-terminated.
pub fn to_csv(record: &FinalRecord) -> Result<String, FinExtractError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(Vec::new());

    let csv_err = |e: csv::Error| FinExtractError::ConversionError(format!("CSV encoding failed: {e}"));

    writer
        .write_record(CSV_COLUMNS.iter().map(|c| c.section))
        .map_err(csv_err)?;
    writer
        .write_record(CSV_COLUMNS.iter().map(|c| c.label))
        .map_err(csv_err)?;
    writer
        .write_record(CSV_COLUMNS.iter().map(|c| cell(record, c.source)))
        .map_err(csv_err)?;

    let bytes = writer
        .into_inner()
        .map_err(|e| FinExtractError::ConversionError(format!("CSV flush failed: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| FinExtractError::ConversionError(format!("CSV is not UTF-8: {e}")))?;

    debug!("Rendered CSV: {} bytes", text.len());
    Ok(text)
}

/// Convert a JSON artifact to the CSV artifact.
pub fn csv_from_json(json: &str) -> Result<String, FinExtractError> {
    let record = FinalRecord::from_json(json)?;
    to_csv(&record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ratios::calculate_metrics;
    use crate::record::{ExtractedRecord, FieldGroup};

    fn sample() -> FinalRecord {
        let mut assets = FieldGroup::new();
        assets.insert("Total-Assets".into(), FieldValue::scalar("$1,000"));
        assets.insert("Investments".into(), FieldValue::scalar("200"));
        let mut liabilities = FieldGroup::new();
        liabilities.insert("Total-Liabilities".into(), FieldValue::scalar("500"));
        liabilities.insert("Long-term-debt".into(), FieldValue::scalar("120"));

        let mut data = ExtractedRecord::new();
        data.insert("Year".into(), FieldValue::scalar("2023"));
        data.insert("Assets".into(), FieldValue::Group(assets));
        data.insert("Liabilities".into(), FieldValue::Group(liabilities));
        data.insert("Auditor".into(), FieldValue::scalar("Smith, Jones & Co"));

        let metrics = calculate_metrics(&data);
        FinalRecord::new(data, metrics)
    }

    fn rows(csv_text: &str) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(csv_text.as_bytes())
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn column_layout_is_fixed() {
        assert_eq!(CSV_COLUMNS.len(), 34);
        let count = |section: &str| CSV_COLUMNS.iter().filter(|c| c.section == section).count();
        assert_eq!(count("Year"), 1);
        assert_eq!(count("Assets"), 8);
        assert_eq!(count("Liabilities"), 9);
        assert_eq!(count("Profit & Loss"), 5);
        assert_eq!(count("Calculated Metrics"), 11);
        assert!(!CSV_COLUMNS
            .iter()
            .any(|c| c.source == CellSource::Metric(Ratio::EquityMultiplier)));
    }

    #[test]
    fn json_is_pretty_and_ordered() {
        let json = to_json(&sample()).unwrap();
        assert!(json.starts_with("{\n  \"Extracted Data\": {\n    \"Year\": \"2023\","));
        let data_at = json.find("Extracted Data").unwrap();
        let metrics_at = json.find("Calculated Metrics").unwrap();
        assert!(data_at < metrics_at);
    }

    #[test]
    fn json_escapes_non_ascii_text() {
        let mut assets = FieldGroup::new();
        assets.insert("Total-Assets".into(), FieldValue::scalar("₹1,000"));
        let mut data = ExtractedRecord::new();
        data.insert("Assets".into(), FieldValue::Group(assets));
        data.insert("Note".into(), FieldValue::scalar("up 😀 \"net\"\u{7f}"));
        let record = FinalRecord::new(data, Default::default());

        let json = to_json(&record).unwrap();

        let expected = concat!(
            "{\n",
            "  \"Extracted Data\": {\n",
            "    \"Assets\": {\n",
            "      \"Total-Assets\": \"\\u20b91,000\"\n",
            "    },\n",
            "    \"Note\": \"up \\ud83d\\ude00 \\\"net\\\"\\u007f\"\n",
            "  },\n",
            "  \"Calculated Metrics\": {}\n",
            "}"
        );
        assert_eq!(json, expected);
        assert!(json.is_ascii());
        assert_eq!(FinalRecord::from_json(&json).unwrap(), record);
    }

    #[test]
    fn json_round_trip_reproduces_record() {
        let record = sample();
        let back = FinalRecord::from_json(&to_json(&record).unwrap()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn csv_has_two_headers_and_one_row() {
        let text = to_csv(&sample()).unwrap();
        assert!(text.ends_with("\r\n"));
        let rows = rows(&text);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.len() == 34));

        assert_eq!(rows[0][0], "Year");
        assert_eq!(rows[0][1], "Assets");
        assert_eq!(rows[1][1], "Total Assets");
        assert_eq!(rows[0][18], "Profit & Loss");

        let data = &rows[2];
        assert_eq!(data[0], "2023");
        assert_eq!(data[1], "$1,000");
        assert_eq!(data[2], "");
        assert_eq!(data[4], "200");
        assert_eq!(data[9], "500");
        assert_eq!(data[16], "120");
        assert_eq!(data[23], "0.5");
        assert_eq!(data[24], "");
        assert_eq!(data[33], "0.5");
    }

    #[test]
    fn extra_fields_never_add_columns() {
        let rows = rows(&to_csv(&sample()).unwrap());
        assert!(!rows.iter().flatten().any(|c| c.contains("Smith")));
    }

    #[test]
    fn whole_numbers_keep_json_formatting() {
        assert_eq!(metric_text(50.0), "50.0");
        assert_eq!(metric_text(0.5), "0.5");
        assert_eq!(metric_text(-12.25), "-12.25");
    }

    #[test]
    fn cell_text_by_shape() {
        assert_eq!(cell_text(&FieldValue::scalar("7")), "7");
        assert_eq!(cell_text(&FieldValue::wrapped("2022".into())), "2022");
        assert_eq!(cell_text(&FieldValue::empty_group()), "");
        let seq = FieldValue::Sequence(vec![
            FieldValue::empty_group(),
            FieldValue::scalar(""),
            FieldValue::wrapped("2021".into()),
            FieldValue::scalar("2020"),
        ]);
        assert_eq!(cell_text(&seq), "2021");
    }

    #[test]
    fn csv_from_json_rejects_non_records() {
        let err = csv_from_json("[1, 2]").unwrap_err();
        assert!(matches!(err, FinExtractError::ConversionError(_)));
    }

    #[test]
    fn csv_from_json_matches_direct_rendering() {
        let record = sample();
        let json = to_json(&record).unwrap();
        assert_eq!(csv_from_json(&json).unwrap(), to_csv(&record).unwrap());
    }
}
