//! Lapkeu - spec-driven extraction of financial line items from Indonesian
//! bank reports (laporan keuangan).
//!
//! A per-company spec table declares, for each output field, a textual
//! pattern to search for, where the value sits on the matched line or cell,
//! and sign/aggregation rules. The extractors run that table over a single
//! report document - a plain-text filing or a spreadsheet filing - and
//! produce one date-keyed output row, running the regression checks embedded
//! in the spec along the way.
//!
//! Fetching reports, deciding which files to process and persisting the
//! accumulated time series are the caller's concern.

pub mod error;
pub mod extractors;
pub mod report;
pub mod spec;
pub mod value;
pub mod workbook;

pub use error::{ExtractError, Result};
pub use extractors::{parse_sheet_report, parse_text_report, SheetRules, TextDocument, TextRules};
pub use report::{report_date_from_path, ReportPeriod, ReportRow, DATE_FIELD, ROUNDING_FIELD};
pub use spec::{ForceSign, SpecRow, SrcOperation, ValueCheck};
pub use value::Value;
pub use workbook::{Cell, CellValue, Sheet, Workbook};
