// ⚠️ Pipeline errors - every fatal condition a census run can hit
//
// All variants are fatal for the run and propagate unmodified with `?`.
// Non-fatal conditions (unresolved columns, dropped coordinates, zero-count
// holdings) are returned as values, never as errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The extract cannot be opened or decoded under the stated encoding
    #[error("Source unreadable ({source_name}): {reason}")]
    SourceUnreadable { source_name: String, reason: String },

    /// A data row does not have as many fields as the header
    #[error("Malformed row at line {line}: expected {expected} fields, found {found}")]
    MalformedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    /// A numeric field is garbled (not merely empty)
    #[error("Numeric parse error at line {line}, field '{field}': cannot parse {value:?}")]
    NumericParse {
        line: u64,
        field: String,
        value: String,
    },

    /// A column the pipeline cannot work without is not in the header
    #[error("Missing required column for {role} (release {release})")]
    MissingColumn { role: String, release: String },

    /// No catalog release matches the extract header (or an unknown id was requested)
    #[error("Unknown release: {0}")]
    UnknownRelease(String),

    /// The release catalog itself is inconsistent
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
