//! Output rows: the per-document field-to-value mapping handed back to the
//! caller, plus report date and cadence derivation.

use std::path::Path;

use chrono::{Datelike, NaiveDate};

use crate::error::{ExtractError, Result};
use crate::value::{merge, Value};

/// First field of every output row.
pub const DATE_FIELD: &str = "date";

/// Mandatory second field of spreadsheet-derived rows: the rounding unit
/// the report is denominated in.
pub const ROUNDING_FIELD: &str = "pembulatan";

/// Reports denominated in base currency units instead of millions show up
/// with absurdly large figures; anything past this is rescaled.
const BASE_UNIT_THRESHOLD: f64 = 1e9;
const MILLION: f64 = 1e6;

/// Reporting cadence, derived from the report month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPeriod {
    Monthly,
    Quarterly,
}

impl ReportPeriod {
    /// Quarter-end months (March, June, September, December) publish the
    /// quarterly layout; every other month is a monthly filing.
    pub fn of(date: NaiveDate) -> Self {
        match date.month() {
            3 | 6 | 9 | 12 => ReportPeriod::Quarterly,
            _ => ReportPeriod::Monthly,
        }
    }
}

/// Derive the report date from a file named after it, e.g.
/// `BBCA/2021-03-31.txt`.
pub fn report_date_from_path(path: &Path) -> Result<NaiveDate> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ExtractError::Date {
            message: format!("no file name in \"{}\"", path.display()),
        })?;
    let stem = name.split('.').next().unwrap_or(name);
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").map_err(|_| ExtractError::Date {
        message: format!("file name \"{name}\" does not start with a YYYY-MM-DD date"),
    })
}

/// Insertion-ordered field-to-value mapping for one parsed document.
///
/// Field order is part of the contract: spreadsheet-derived rows must lead
/// with [`DATE_FIELD`] and carry [`ROUNDING_FIELD`] second, which
/// [`ReportRow::finalize_sheet_row`] enforces.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportRow {
    fields: Vec<(String, Value)>,
}

impl ReportRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row seeded with its date field, as the text extractor emits it.
    pub fn for_date(date: NaiveDate) -> Self {
        let mut row = Self::new();
        row.assign(DATE_FIELD, Value::Text(date.format("%Y-%m-%d").to_string()));
        row
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Overwrite the field, or append it if absent. Overwriting keeps the
    /// field's original position.
    pub fn assign(&mut self, field: &str, value: Value) {
        if let Some(index) = self.fields.iter().position(|(name, _)| name == field) {
            self.fields[index].1 = value;
        } else {
            self.fields.push((field.to_string(), value));
        }
    }

    /// Fold the incoming value into the field through the accumulator
    /// policy (see [`crate::value::merge`]).
    pub fn merge(&mut self, field: &str, incoming: Value) {
        let merged = merge(self.get(field), incoming);
        self.assign(field, merged);
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Enforce the spreadsheet key-order contract and rescale reports
    /// denominated in base currency units back to millions.
    ///
    /// The third field is the first real figure; when its magnitude exceeds
    /// 1e9 every numeric field except the date is divided by 1e6.
    pub(crate) fn finalize_sheet_row(&mut self) -> Result<()> {
        if self.fields.first().map(|(name, _)| name.as_str()) != Some(DATE_FIELD) {
            return Err(ExtractError::InvalidConfig {
                message: format!("spreadsheet output row must lead with \"{DATE_FIELD}\""),
            });
        }
        if self.fields.get(1).map(|(name, _)| name.as_str()) != Some(ROUNDING_FIELD) {
            return Err(ExtractError::InvalidConfig {
                message: format!("spreadsheet output row must carry \"{ROUNDING_FIELD}\" second"),
            });
        }

        let base_units = matches!(
            self.fields.get(2),
            Some((_, Value::Number(n))) if n.abs() > BASE_UNIT_THRESHOLD
        );
        if base_units {
            for (_, value) in self.fields.iter_mut().skip(1) {
                if let Value::Number(n) = value {
                    *n /= MILLION;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_period_of_quarter_end_months() {
        assert_eq!(ReportPeriod::of(date("2021-03-31")), ReportPeriod::Quarterly);
        assert_eq!(ReportPeriod::of(date("2021-06-30")), ReportPeriod::Quarterly);
        assert_eq!(ReportPeriod::of(date("2021-09-30")), ReportPeriod::Quarterly);
        assert_eq!(ReportPeriod::of(date("2021-12-31")), ReportPeriod::Quarterly);
    }

    #[test]
    fn test_period_of_other_months() {
        assert_eq!(ReportPeriod::of(date("2021-01-31")), ReportPeriod::Monthly);
        assert_eq!(ReportPeriod::of(date("2021-07-31")), ReportPeriod::Monthly);
        assert_eq!(ReportPeriod::of(date("2021-11-30")), ReportPeriod::Monthly);
    }

    #[test]
    fn test_report_date_from_path() {
        let parsed = report_date_from_path(Path::new("BBCA/2021-03-31.txt")).unwrap();
        assert_eq!(parsed, date("2021-03-31"));

        // Extra extensions after the stem are fine
        let parsed = report_date_from_path(Path::new("2022-11-30.konsol.txt")).unwrap();
        assert_eq!(parsed, date("2022-11-30"));
    }

    #[test]
    fn test_report_date_from_path_rejects_non_dates() {
        assert!(report_date_from_path(Path::new("BBCA/spec.xlsx")).is_err());
        assert!(report_date_from_path(Path::new("laporan.txt")).is_err());
    }

    #[test]
    fn test_for_date_seeds_date_first() {
        let row = ReportRow::for_date(date("2021-03-31"));
        let fields: Vec<_> = row.fields().collect();
        assert_eq!(fields, vec![("date", &Value::Text("2021-03-31".into()))]);
    }

    #[test]
    fn test_assign_keeps_field_position() {
        let mut row = ReportRow::new();
        row.assign("a", Value::Number(1.0));
        row.assign("b", Value::Number(2.0));
        row.assign("a", Value::Missing);

        let names: Vec<_> = row.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(row.get("a"), Some(&Value::Missing));
    }

    #[test]
    fn test_merge_accumulates_in_place() {
        let mut row = ReportRow::new();
        row.merge("laba", Value::Number(10.0));
        row.merge("laba", Value::Number(5.0));
        row.merge("laba", Value::Missing);
        assert_eq!(row.get("laba"), Some(&Value::Number(15.0)));
    }

    fn sheet_row(third: Value) -> ReportRow {
        let mut row = ReportRow::new();
        row.assign(DATE_FIELD, Value::Text("2021-03-31".into()));
        row.assign(ROUNDING_FIELD, Value::Number(1_000_000.0));
        row.assign("pendapatan bunga", third);
        row.assign("beban bunga", Value::Number(-1_500_000_000.0));
        row
    }

    #[test]
    fn test_finalize_requires_date_then_pembulatan() {
        let mut row = ReportRow::new();
        row.assign("laba", Value::Number(1.0));
        assert!(row.finalize_sheet_row().is_err());

        let mut row = ReportRow::new();
        row.assign(DATE_FIELD, Value::Text("2021-03-31".into()));
        row.assign("laba", Value::Number(1.0));
        assert!(row.finalize_sheet_row().is_err());

        assert!(sheet_row(Value::Number(10.0)).finalize_sheet_row().is_ok());
    }

    #[test]
    fn test_finalize_rescales_base_unit_reports() {
        let mut row = sheet_row(Value::Number(2_500_000_000.0));
        row.finalize_sheet_row().unwrap();

        assert_eq!(row.get(DATE_FIELD), Some(&Value::Text("2021-03-31".into())));
        assert_eq!(row.get(ROUNDING_FIELD), Some(&Value::Number(1.0)));
        assert_eq!(row.get("pendapatan bunga"), Some(&Value::Number(2500.0)));
        assert_eq!(row.get("beban bunga"), Some(&Value::Number(-1500.0)));
    }

    #[test]
    fn test_finalize_rescale_uses_magnitude() {
        let mut row = sheet_row(Value::Number(-2_500_000_000.0));
        row.finalize_sheet_row().unwrap();
        assert_eq!(row.get("pendapatan bunga"), Some(&Value::Number(-2500.0)));
    }

    #[test]
    fn test_finalize_leaves_million_denominated_reports_alone() {
        let mut row = sheet_row(Value::Number(1e9));
        row.finalize_sheet_row().unwrap();
        assert_eq!(row.get("pendapatan bunga"), Some(&Value::Number(1e9)));
        assert_eq!(row.get(ROUNDING_FIELD), Some(&Value::Number(1_000_000.0)));
    }

    #[test]
    fn test_finalize_skips_text_third_field() {
        let mut row = sheet_row(Value::Text("n/a".into()));
        row.finalize_sheet_row().unwrap();
        assert_eq!(row.get("beban bunga"), Some(&Value::Number(-1_500_000_000.0)));
    }
}
