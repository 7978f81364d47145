//! Spec table rows and the pieces shared by both extractors.
//!
//! A spec table is authored per company as a small spreadsheet; an external
//! loader is expected to deserialize it into [`SpecRow`]s. The extractors
//! interpret each row once into a compiled rule at load time, so nothing is
//! re-dispatched by string comparison while a document is being parsed.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};
use crate::value::Value;

/// Sentinel pattern marking a row that assigns a literal instead of
/// searching the document.
pub(crate) const ASSIGN_VALUE: &str = "assign_value";

fn default_mandatory() -> bool {
    true
}

/// One row of a company's extraction spec, as loaded.
///
/// Field defaults reproduce the normalization applied when the authoring
/// spreadsheet is read: absent sign and token positions read as 0, absent
/// mandatory flags read as mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecRow {
    /// Search pattern (regex). Empty means the row is skipped entirely.
    #[serde(default)]
    pub pattern: String,
    /// Output field written by this row. A pattern row without a target only
    /// advances the text cursor.
    #[serde(default)]
    pub target: Option<String>,
    /// Sign override: negative coerces the value negative, positive coerces
    /// it positive, zero keeps the source sign.
    #[serde(default)]
    pub force_sign: i8,
    #[serde(default)]
    pub monthly_token_pos: usize,
    #[serde(default)]
    pub quarterly_token_pos: usize,
    #[serde(default = "default_mandatory")]
    pub monthly_mandatory: bool,
    #[serde(default = "default_mandatory")]
    pub quarterly_mandatory: bool,
    /// Worksheet searched by the spreadsheet extractor.
    #[serde(default)]
    pub sheet: Option<String>,
    /// One-based column letter searched for the pattern (default column A).
    #[serde(default)]
    pub pattern_col: Option<String>,
    /// One-based column letter read for the value (default: pattern column
    /// plus one).
    #[serde(default)]
    pub value_col: Option<String>,
    /// Minimum indentation level a candidate cell must have to match.
    #[serde(default)]
    pub min_indent: Option<u32>,
    /// `get` (direct cell read) or `group` (parent-plus-children sum).
    #[serde(default)]
    pub src_operation: Option<String>,
    #[serde(default)]
    pub test_date0: Option<NaiveDate>,
    #[serde(default)]
    pub test_value0: Option<String>,
    #[serde(default)]
    pub test_date1: Option<NaiveDate>,
    #[serde(default)]
    pub test_value1: Option<String>,
}

impl Default for SpecRow {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            target: None,
            force_sign: 0,
            monthly_token_pos: 0,
            quarterly_token_pos: 0,
            monthly_mandatory: true,
            quarterly_mandatory: true,
            sheet: None,
            pattern_col: None,
            value_col: None,
            min_indent: None,
            src_operation: None,
            test_date0: None,
            test_value0: None,
            test_date1: None,
            test_value1: None,
        }
    }
}

impl SpecRow {
    /// Literal payload of an `assign_value` row: numeric when the raw text
    /// parses as a plain float, text otherwise.
    pub(crate) fn literal_value(&self) -> Value {
        match self.test_value0.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw
                .parse::<f64>()
                .map(Value::Number)
                .unwrap_or_else(|_| Value::Text(raw.to_string())),
            _ => Value::Missing,
        }
    }

    /// Both inline assertions of a text row, in declaration order.
    pub(crate) fn checks(&self) -> Result<Vec<ValueCheck>> {
        let mut checks = Vec::new();
        if let Some(check) = ValueCheck::from_parts(self.test_date0, self.test_value0.as_deref())? {
            checks.push(check);
        }
        if let Some(check) = ValueCheck::from_parts(self.test_date1, self.test_value1.as_deref())? {
            checks.push(check);
        }
        Ok(checks)
    }
}

/// Post-extraction sign override declared by a spec row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForceSign {
    Negative,
    #[default]
    Keep,
    Positive,
}

impl ForceSign {
    pub(crate) fn from_raw(raw: i8) -> Self {
        match raw {
            n if n < 0 => ForceSign::Negative,
            0 => ForceSign::Keep,
            _ => ForceSign::Positive,
        }
    }

    /// Coerce a number's sign. Zero (`Keep`) is strictly a no-op, and
    /// non-numeric values pass through untouched.
    pub fn apply(self, value: Value) -> Value {
        match (self, value) {
            (ForceSign::Negative, Value::Number(n)) if n > 0.0 => Value::Number(-n),
            (ForceSign::Positive, Value::Number(n)) if n < 0.0 => Value::Number(-n),
            (_, value) => value,
        }
    }
}

/// How the spreadsheet extractor reads the value once the pattern cell is
/// found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrcOperation {
    /// Direct read of the value cell.
    Get,
    /// Sum of the value cell plus the indented child rows below it.
    Group,
}

impl SrcOperation {
    pub(crate) fn parse(raw: Option<&str>, target: &str) -> Result<Self> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(SrcOperation::Get),
            Some("get") => Ok(SrcOperation::Get),
            Some("group") => Ok(SrcOperation::Group),
            Some(other) => Err(ExtractError::InvalidConfig {
                message: format!("invalid src_operation \"{other}\" in spec for target \"{target}\""),
            }),
        }
    }
}

/// Inline regression assertion embedded in a spec row: at `date`, the
/// accumulated value of the row's target must equal `expected`.
///
/// These guard against parsing drift when a bank changes its report layout;
/// they run as a side effect of normal extraction, not as a separate pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueCheck {
    pub date: NaiveDate,
    pub expected: f64,
}

impl ValueCheck {
    /// A check exists only when both the date and a numeric expected value
    /// are present.
    pub(crate) fn from_parts(date: Option<NaiveDate>, raw_value: Option<&str>) -> Result<Option<Self>> {
        let (Some(date), Some(raw)) = (date, raw_value.map(str::trim).filter(|s| !s.is_empty()))
        else {
            return Ok(None);
        };
        let expected = raw.parse::<f64>().map_err(|_| ExtractError::InvalidConfig {
            message: format!("test value \"{raw}\" is not numeric"),
        })?;
        Ok(Some(Self { date, expected }))
    }

    /// Compare the accumulated value against the expectation when the
    /// document date matches the check date.
    pub(crate) fn verify(
        &self,
        report_date: NaiveDate,
        field: &str,
        pattern: &str,
        actual: Option<&Value>,
    ) -> Result<()> {
        if self.date != report_date {
            return Ok(());
        }
        match actual {
            Some(Value::Number(n)) if *n == self.expected => Ok(()),
            other => Err(ExtractError::CheckMismatch {
                field: field.to_string(),
                pattern: pattern.to_string(),
                expected: self.expected,
                actual: other.map(Value::display).unwrap_or_else(|| "missing".to_string()),
            }),
        }
    }
}

/// Resolve a one-based spreadsheet column letter to a zero-based index.
pub(crate) fn column_index(letter: &str) -> Result<usize> {
    let trimmed = letter.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            Ok(c.to_ascii_uppercase() as usize - 'A' as usize)
        }
        _ => Err(ExtractError::InvalidConfig {
            message: format!("\"{letter}\" is not a column letter"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_force_sign_from_raw() {
        assert_eq!(ForceSign::from_raw(-1), ForceSign::Negative);
        assert_eq!(ForceSign::from_raw(0), ForceSign::Keep);
        assert_eq!(ForceSign::from_raw(1), ForceSign::Positive);
    }

    #[test]
    fn test_force_sign_negative_flips_positive_values_only() {
        assert_eq!(
            ForceSign::Negative.apply(Value::Number(1000.0)),
            Value::Number(-1000.0)
        );
        assert_eq!(
            ForceSign::Negative.apply(Value::Number(-7.0)),
            Value::Number(-7.0)
        );
    }

    #[test]
    fn test_force_sign_positive_flips_negative_values_only() {
        assert_eq!(
            ForceSign::Positive.apply(Value::Number(-3.0)),
            Value::Number(3.0)
        );
        assert_eq!(
            ForceSign::Positive.apply(Value::Number(3.0)),
            Value::Number(3.0)
        );
    }

    #[test]
    fn test_force_sign_keep_is_noop() {
        assert_eq!(ForceSign::Keep.apply(Value::Number(-5.0)), Value::Number(-5.0));
        assert_eq!(ForceSign::Keep.apply(Value::Number(0.0)), Value::Number(0.0));
    }

    #[test]
    fn test_force_sign_ignores_missing_and_text() {
        assert_eq!(ForceSign::Negative.apply(Value::Missing), Value::Missing);
        assert_eq!(
            ForceSign::Positive.apply(Value::Text("n/a".into())),
            Value::Text("n/a".into())
        );
    }

    #[test]
    fn test_src_operation_parse() {
        assert_eq!(SrcOperation::parse(None, "x").unwrap(), SrcOperation::Get);
        assert_eq!(SrcOperation::parse(Some(""), "x").unwrap(), SrcOperation::Get);
        assert_eq!(SrcOperation::parse(Some("get"), "x").unwrap(), SrcOperation::Get);
        assert_eq!(SrcOperation::parse(Some("group"), "x").unwrap(), SrcOperation::Group);
    }

    #[test]
    fn test_src_operation_unknown_is_invalid_config() {
        let err = SrcOperation::parse(Some("sum"), "beban bunga").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("sum"));
        assert!(msg.contains("beban bunga"));
    }

    #[test]
    fn test_check_requires_both_date_and_value() {
        assert!(ValueCheck::from_parts(None, Some("5")).unwrap().is_none());
        assert!(ValueCheck::from_parts(Some(date("2021-03-31")), None)
            .unwrap()
            .is_none());
        assert!(ValueCheck::from_parts(Some(date("2021-03-31")), Some(""))
            .unwrap()
            .is_none());

        let check = ValueCheck::from_parts(Some(date("2021-03-31")), Some("15234.5"))
            .unwrap()
            .unwrap();
        assert_eq!(check.expected, 15234.5);
    }

    #[test]
    fn test_check_non_numeric_value_is_invalid_config() {
        assert!(ValueCheck::from_parts(Some(date("2021-03-31")), Some("lots")).is_err());
    }

    #[test]
    fn test_check_only_fires_on_its_date() {
        let check = ValueCheck {
            date: date("2021-03-31"),
            expected: 10.0,
        };
        // Wrong document date: mismatching value passes silently
        assert!(check
            .verify(date("2021-04-30"), "f", "p", Some(&Value::Number(99.0)))
            .is_ok());
        // Matching date: value must agree
        assert!(check
            .verify(date("2021-03-31"), "f", "p", Some(&Value::Number(10.0)))
            .is_ok());
        assert!(check
            .verify(date("2021-03-31"), "f", "p", Some(&Value::Number(99.0)))
            .is_err());
    }

    #[test]
    fn test_check_missing_actual_is_a_mismatch() {
        let check = ValueCheck {
            date: date("2021-03-31"),
            expected: 10.0,
        };
        let err = check
            .verify(date("2021-03-31"), "laba", "Laba", Some(&Value::Missing))
            .unwrap_err();
        assert!(err.to_string().contains("got: missing"));

        assert!(check.verify(date("2021-03-31"), "laba", "Laba", None).is_err());
    }

    #[test]
    fn test_column_index() {
        assert_eq!(column_index("A").unwrap(), 0);
        assert_eq!(column_index("C").unwrap(), 2);
        assert_eq!(column_index("i").unwrap(), 8);
        assert!(column_index("AA").is_err());
        assert!(column_index("3").is_err());
        assert!(column_index("").is_err());
    }

    #[test]
    fn test_literal_value() {
        let mut row = SpecRow {
            pattern: ASSIGN_VALUE.to_string(),
            target: Some("pembulatan".to_string()),
            test_value0: Some("1000000".to_string()),
            ..Default::default()
        };
        assert_eq!(row.literal_value(), Value::Number(1000000.0));

        row.test_value0 = Some("konsolidasi".to_string());
        assert_eq!(row.literal_value(), Value::Text("konsolidasi".to_string()));

        row.test_value0 = None;
        assert_eq!(row.literal_value(), Value::Missing);
    }

    #[test]
    fn test_spec_row_deserializes_with_loader_defaults() {
        let row: SpecRow =
            serde_json::from_str(r#"{"pattern": "Laba bersih", "target": "laba bersih"}"#).unwrap();
        assert_eq!(row.force_sign, 0);
        assert_eq!(row.monthly_token_pos, 0);
        assert!(row.monthly_mandatory);
        assert!(row.quarterly_mandatory);
        assert!(row.src_operation.is_none());
        assert!(row.test_date0.is_none());
    }
}
