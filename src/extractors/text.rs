//! Line-oriented extractor for plain-text filings.
//!
//! The extractor folds the compiled rules over the document with a single
//! forward-only line cursor. The cursor survives across rules: a capture
//! leaves it on the matched line so several rules can read different tokens
//! off the same physical line, a header skip moves one line past its match,
//! and a miss leaves it untouched so a missed optional field cannot
//! desynchronize the search for later mandatory fields.

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{ExtractError, Result};
use crate::report::{report_date_from_path, ReportPeriod, ReportRow};
use crate::spec::{ForceSign, SpecRow, ValueCheck, ASSIGN_VALUE};
use crate::value::{parse_amount, Value};

/// A plain-text report: ordered lines plus the report date.
#[derive(Debug, Clone)]
pub struct TextDocument {
    name: String,
    lines: Vec<String>,
    date: NaiveDate,
}

impl TextDocument {
    pub fn new(name: impl Into<String>, lines: Vec<String>, date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            lines,
            date,
        }
    }

    /// Load a report file. The report date comes from the file stem, e.g.
    /// `2021-03-31.txt`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        info!("Loading text report {:?}", path);

        let date = report_date_from_path(path)?;
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read report file {}", path.display()))?;
        let lines = raw.lines().map(str::to_string).collect();

        Ok(Self {
            name: path.display().to_string(),
            lines,
            date,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Token position and mandatory flag for one reporting cadence. Quarterly
/// filings lay values out differently from monthly ones, so every rule
/// carries both and the document's month picks one.
#[derive(Debug, Clone, Copy)]
struct TokenSpec {
    token_pos: usize,
    mandatory: bool,
}

/// A spec row compiled for the text extractor.
#[derive(Debug)]
enum TextRule {
    /// Set the target to a literal value; no search.
    Assign { target: String, value: Value },
    /// Advance the cursor one line past the next match (header skip).
    Skip {
        pattern: Regex,
        monthly_mandatory: bool,
        quarterly_mandatory: bool,
    },
    /// Extract a whitespace-separated token from the next matching line.
    Capture {
        pattern: Regex,
        target: String,
        force_sign: ForceSign,
        monthly: TokenSpec,
        quarterly: TokenSpec,
        checks: Vec<ValueCheck>,
    },
}

/// A spec table compiled for text extraction: regexes built, literals
/// resolved, empty rows dropped.
#[derive(Debug)]
pub struct TextRules {
    rules: Vec<TextRule>,
}

impl TextRules {
    pub fn compile(rows: &[SpecRow]) -> Result<Self> {
        let mut rules = Vec::new();

        for row in rows {
            if row.pattern.is_empty() {
                continue;
            }

            if row.pattern == ASSIGN_VALUE {
                let target = row.target.clone().ok_or_else(|| ExtractError::InvalidConfig {
                    message: "assign_value row has no target".to_string(),
                })?;
                rules.push(TextRule::Assign {
                    target,
                    value: row.literal_value(),
                });
                continue;
            }

            let pattern = Regex::new(&row.pattern).map_err(|e| ExtractError::InvalidConfig {
                message: format!("bad pattern \"{}\": {e}", row.pattern),
            })?;

            match row.target.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                None => rules.push(TextRule::Skip {
                    pattern,
                    monthly_mandatory: row.monthly_mandatory,
                    quarterly_mandatory: row.quarterly_mandatory,
                }),
                Some(target) => rules.push(TextRule::Capture {
                    pattern,
                    target: target.to_string(),
                    force_sign: ForceSign::from_raw(row.force_sign),
                    monthly: TokenSpec {
                        token_pos: row.monthly_token_pos,
                        mandatory: row.monthly_mandatory,
                    },
                    quarterly: TokenSpec {
                        token_pos: row.quarterly_token_pos,
                        mandatory: row.quarterly_mandatory,
                    },
                    checks: row.checks()?,
                }),
            }
        }

        Ok(Self { rules })
    }
}

/// Forward-only line cursor threaded through the rule fold.
#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    line: usize,
}

/// First line at or after `start` the pattern matches (regex search, not
/// anchored).
fn find_from(lines: &[String], start: usize, pattern: &Regex) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, line)| pattern.is_match(line.as_str()))
        .map(|(lineno, _)| lineno)
}

/// Run compiled rules over one text report, producing its output row.
pub fn parse_text_report(rules: &TextRules, doc: &TextDocument) -> Result<ReportRow> {
    info!("Parsing text report {} dated {}", doc.name, doc.date);

    let period = ReportPeriod::of(doc.date);
    let mut row = ReportRow::for_date(doc.date);
    let mut cursor = Cursor::default();

    for rule in &rules.rules {
        match rule {
            TextRule::Assign { target, value } => {
                row.assign(target, value.clone());
            }

            TextRule::Skip {
                pattern,
                monthly_mandatory,
                quarterly_mandatory,
            } => {
                let mandatory = match period {
                    ReportPeriod::Monthly => *monthly_mandatory,
                    ReportPeriod::Quarterly => *quarterly_mandatory,
                };
                match find_from(&doc.lines, cursor.line, pattern) {
                    Some(lineno) => {
                        debug!("Skipping past \"{}\" at line {}", pattern.as_str(), lineno + 1);
                        cursor.line = lineno + 1;
                    }
                    None if mandatory => {
                        return Err(ExtractError::PatternNotFound {
                            pattern: pattern.as_str().to_string(),
                            location: doc.name.clone(),
                        })
                    }
                    None => {}
                }
            }

            TextRule::Capture {
                pattern,
                target,
                force_sign,
                monthly,
                quarterly,
                checks,
            } => {
                let token_spec = match period {
                    ReportPeriod::Monthly => monthly,
                    ReportPeriod::Quarterly => quarterly,
                };

                match find_from(&doc.lines, cursor.line, pattern) {
                    Some(lineno) => {
                        let line = &doc.lines[lineno];
                        debug!("Matched \"{}\" at line {}", pattern.as_str(), lineno + 1);

                        let token = line
                            .split_whitespace()
                            .nth(token_spec.token_pos)
                            .ok_or_else(|| ExtractError::Format {
                                message: format!(
                                    "no token at position {} on line matched by \"{}\" in {}",
                                    token_spec.token_pos,
                                    pattern.as_str(),
                                    doc.name
                                ),
                            })?;

                        let value = match parse_amount(token) {
                            Ok(value) => force_sign.apply(value),
                            Err(ExtractError::Format { message }) => {
                                return Err(ExtractError::Format {
                                    message: format!(
                                        "check \"{}\" value in {}: {message}",
                                        pattern.as_str(),
                                        doc.name
                                    ),
                                })
                            }
                            Err(e) => return Err(e),
                        };

                        row.merge(target, value);
                        for check in checks {
                            check.verify(doc.date, target, pattern.as_str(), row.get(target))?;
                        }

                        // Stay on the matched line: another rule may read a
                        // different token off it.
                        cursor.line = lineno;
                    }
                    None => {
                        if token_spec.mandatory {
                            return Err(ExtractError::PatternNotFound {
                                pattern: pattern.as_str().to_string(),
                                location: doc.name.clone(),
                            });
                        }
                        warn!(
                            "Pattern \"{}\" not found in {}; recording \"{}\" as missing",
                            pattern.as_str(),
                            doc.name,
                            target
                        );
                        row.assign(target, Value::Missing);
                        // Cursor untouched: keep scanning from the last
                        // confirmed position.
                    }
                }
            }
        }
    }

    Ok(row)
}
