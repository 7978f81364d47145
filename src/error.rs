//! Error handling for report extraction
//!
//! Every fatal kind aborts the current document's parse with no partial
//! output row. A non-mandatory pattern that never matches is not an error;
//! it is recorded as a missing value in the row.

use thiserror::Error;

/// Fatal extraction failures.
///
/// The operator's remediation is to fix either the spec table or the source
/// document, so messages carry the offending pattern, field and location.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// A mandatory pattern matched nothing before the end of the document.
    #[error("unable to find pattern \"{pattern}\" in {location}")]
    PatternNotFound { pattern: String, location: String },

    /// A numeric token or cell could not be normalized.
    #[error("{message}")]
    Format { message: String },

    /// The spec table itself is malformed.
    #[error("invalid spec: {message}")]
    InvalidConfig { message: String },

    /// An inline regression check embedded in the spec failed.
    #[error("field \"{field}\" mismatch: expected: {expected}, got: {actual}, pattern: \"{pattern}\"")]
    CheckMismatch {
        field: String,
        pattern: String,
        expected: f64,
        actual: String,
    },

    /// A report date could not be derived from a file name.
    #[error("bad report date: {message}")]
    Date { message: String },
}

/// Result type alias for extraction operations
pub type Result<T, E = ExtractError> = std::result::Result<T, E>;
