//! Indent-aware extractor for spreadsheet filings.
//!
//! Each rule searches one column of one sheet top-to-bottom for the first
//! cell matching its pattern (optionally filtered by indentation level),
//! then reads a value cell on the same row - either directly or as a group
//! sum over the indented child rows below it. Unlike the text extractor
//! there is no optional/mandatory distinction: a pattern that matches
//! nothing is always fatal, while a sheet absent from the workbook records
//! the field as missing.

use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{ExtractError, Result};
use crate::report::ReportRow;
use crate::spec::{column_index, ForceSign, SpecRow, SrcOperation, ValueCheck, ASSIGN_VALUE};
use crate::value::Value;
use crate::workbook::{Cell, CellValue, Sheet, Workbook};

/// Only the first few columns ever hold row names in these reports.
const MAX_PATTERN_COL: usize = 8;

/// A spec row compiled for the spreadsheet extractor.
#[derive(Debug)]
enum SheetRule {
    /// Set the target to a literal value; no search.
    Assign { target: String, value: Value },
    /// Locate a cell by pattern and indentation, then read its value cell.
    Capture {
        sheet: String,
        pattern: Regex,
        target: String,
        pattern_col: usize,
        value_col: usize,
        min_indent: Option<u32>,
        operation: SrcOperation,
        force_sign: ForceSign,
        check: Option<ValueCheck>,
    },
}

/// A spec table compiled for spreadsheet extraction.
#[derive(Debug)]
pub struct SheetRules {
    rules: Vec<SheetRule>,
}

impl SheetRules {
    pub fn compile(rows: &[SpecRow]) -> Result<Self> {
        let mut rules = Vec::new();

        for row in rows {
            if row.pattern.is_empty() {
                continue;
            }

            let target = row
                .target
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .ok_or_else(|| ExtractError::InvalidConfig {
                    message: format!("spreadsheet rule \"{}\" has no target", row.pattern),
                })?
                .to_string();

            if row.pattern == ASSIGN_VALUE {
                rules.push(SheetRule::Assign {
                    target,
                    value: row.literal_value(),
                });
                continue;
            }

            let pattern = Regex::new(&row.pattern).map_err(|e| ExtractError::InvalidConfig {
                message: format!("bad pattern \"{}\": {e}", row.pattern),
            })?;

            let sheet = row
                .sheet
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ExtractError::InvalidConfig {
                    message: format!("spreadsheet rule \"{}\" has no sheet", row.pattern),
                })?
                .to_string();

            let pattern_col = match row.pattern_col.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                Some(letter) => column_index(letter)?,
                None => 0,
            };
            if pattern_col > MAX_PATTERN_COL {
                return Err(ExtractError::InvalidConfig {
                    message: format!(
                        "pattern column for \"{}\" must be between A and I",
                        row.pattern
                    ),
                });
            }

            let value_col = match row.value_col.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                Some(letter) => column_index(letter)?,
                None => pattern_col + 1,
            };

            rules.push(SheetRule::Capture {
                sheet,
                pattern,
                target,
                pattern_col,
                value_col,
                min_indent: row.min_indent,
                operation: SrcOperation::parse(row.src_operation.as_deref(), &target)?,
                force_sign: ForceSign::from_raw(row.force_sign),
                check: ValueCheck::from_parts(row.test_date0, row.test_value0.as_deref())?,
            });
        }

        Ok(Self { rules })
    }
}

fn column_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}

/// First row whose pattern-column cell matches, honoring the indentation
/// filter.
fn find_pattern_row(
    sheet: &Sheet,
    col: usize,
    pattern: &Regex,
    min_indent: Option<u32>,
) -> Option<usize> {
    (0..sheet.row_count()).find(|&row| {
        sheet.cell(row, col).is_some_and(|cell| {
            pattern.is_match(&cell.display_text())
                && min_indent.map_or(true, |min| cell.indent >= min)
        })
    })
}

/// Read one cell through its display format. A format containing `#` is
/// numeric - empty reads as 0 and a `(` within the format's first two
/// characters marks the negative-parenthesized convention. `General`
/// passes the raw value through.
fn read_cell(cell: &Cell) -> Result<Value> {
    let format = cell.number_format.as_str();
    if format.contains('#') {
        let sign = if format.chars().take(2).any(|c| c == '(') {
            -1.0
        } else {
            1.0
        };
        let raw = match &cell.value {
            CellValue::Number(n) => *n,
            CellValue::Empty => 0.0,
            CellValue::Text(text) => {
                return Err(ExtractError::Format {
                    message: format!("cell with numeric format \"{format}\" holds text \"{text}\""),
                })
            }
        };
        Ok(Value::Number(raw * sign))
    } else if format == "General" {
        Ok(match &cell.value {
            CellValue::Number(n) => Value::Number(*n),
            CellValue::Text(s) => Value::Text(s.clone()),
            CellValue::Empty => Value::Text(String::new()),
        })
    } else {
        Err(ExtractError::InvalidConfig {
            message: format!("unsupported cell number format \"{format}\""),
        })
    }
}

/// Numeric coercion for group sums: empty cells add nothing.
fn read_cell_number(cell: Option<&Cell>) -> Result<f64> {
    let Some(cell) = cell else { return Ok(0.0) };
    match read_cell(cell)? {
        Value::Number(n) => Ok(n),
        Value::Text(s) if s.is_empty() => Ok(0.0),
        Value::Text(s) => Err(ExtractError::Format {
            message: format!("cannot sum over text cell \"{s}\""),
        }),
        Value::Missing => Ok(0.0),
    }
}

/// Sum the matched row's value cell with every row below it whose
/// name-column indent strictly exceeds the matched cell's. The walk ends
/// when the indent returns to the parent level or the grid runs out.
fn group_sum(sheet: &Sheet, start_row: usize, name_col: usize, value_col: usize) -> Result<f64> {
    let parent_indent = sheet.cell(start_row, name_col).map_or(0, |cell| cell.indent);
    let mut total = read_cell_number(sheet.cell(start_row, value_col))?;

    let mut row = start_row + 1;
    while let Some(name_cell) = sheet.cell(row, name_col) {
        if name_cell.indent <= parent_indent {
            break;
        }
        total += read_cell_number(sheet.cell(row, value_col))?;
        row += 1;
    }

    Ok(total)
}

/// Run compiled rules over one spreadsheet report, producing its output
/// row. The report date (from the file name) only gates the inline checks;
/// the row's own `date` field comes from the spec rules.
pub fn parse_sheet_report(
    rules: &SheetRules,
    workbook: &Workbook,
    report_date: NaiveDate,
) -> Result<ReportRow> {
    info!("Parsing spreadsheet report dated {report_date}");

    let mut row = ReportRow::new();

    for rule in &rules.rules {
        match rule {
            SheetRule::Assign { target, value } => {
                row.assign(target, value.clone());
            }

            SheetRule::Capture {
                sheet,
                pattern,
                target,
                pattern_col,
                value_col,
                min_indent,
                operation,
                force_sign,
                check,
            } => {
                let Some(worksheet) = workbook.sheet(sheet) else {
                    debug!("Sheet \"{sheet}\" absent; recording \"{target}\" as missing");
                    row.assign(target, Value::Missing);
                    continue;
                };

                let hit = find_pattern_row(worksheet, *pattern_col, pattern, *min_indent)
                    .ok_or_else(|| ExtractError::PatternNotFound {
                        pattern: pattern.as_str().to_string(),
                        location: format!("sheet {} col {}", sheet, column_letter(*pattern_col)),
                    })?;
                debug!("Matched \"{}\" on sheet \"{sheet}\" row {}", pattern.as_str(), hit + 1);

                let empty = Cell::default();
                let value = match operation {
                    SrcOperation::Get => {
                        read_cell(worksheet.cell(hit, *value_col).unwrap_or(&empty))?
                    }
                    SrcOperation::Group => {
                        Value::Number(group_sum(worksheet, hit, *pattern_col, *value_col)?)
                    }
                };

                row.merge(target, force_sign.apply(value));
                if let Some(check) = check {
                    check.verify(report_date, target, pattern.as_str(), row.get(target))?;
                }
            }
        }
    }

    row.finalize_sheet_row()?;
    Ok(row)
}
