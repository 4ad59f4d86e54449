//! Error types for the txedit export and reconciliation pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`CsvError`] - CSV reading/writing errors
//! - [`DocumentError`] - Source-of-truth JSON errors
//! - [`ConvertError`] - Generic JSON to CSV conversion errors
//! - [`ConfigError`] - Environment configuration errors
//! - [`RemoteError`] - Errors reported by the remote configuration store
//! - [`BatchError`] - Fatal errors that abort a whole import
//! - [`RowError`] - Row-scoped errors that are counted and skipped over
//! - [`ReconciliationError`] - Top-level error (fatal vs recoverable)
//! - [`ServerError`] - HTTP server errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors while reading or writing CSV.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read or write a file.
    #[error("Failed to access file: {0}")]
    IoError(#[from] std::io::Error),

    /// Content could not be decoded.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Malformed CSV content.
    #[error("Line {line}: {message}")]
    Malformed { line: u64, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// Failed to serialize rows.
    #[error("Failed to write CSV: {0}")]
    WriteError(String),
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(io) => CsvError::IoError(io),
            csv::ErrorKind::Utf8 { err, .. } => CsvError::EncodingError(err.to_string()),
            other => CsvError::Malformed {
                line,
                message: format!("{:?}", other),
            },
        }
    }
}

// =============================================================================
// Document Errors
// =============================================================================

/// Errors while loading or saving a source-of-truth configuration document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Failed to read or write the document.
    #[error("Document IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid JSON.
    #[error("Invalid JSON document: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Top-level value is not an object.
    #[error("Configuration document must be a JSON object")]
    NotAnObject,

    /// A record section is present but is not an array.
    #[error("Section '{0}' must be an array")]
    NotAnArray(String),
}

// =============================================================================
// Conversion Errors
// =============================================================================

/// Errors from the generic JSON/NDJSON to CSV converter.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Failed to read input.
    #[error("Failed to read input: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid JSON line in NDJSON input.
    #[error("Invalid JSON on line {line}: {message}")]
    InvalidLine { line: usize, message: String },

    /// Invalid JSON file.
    #[error("Invalid JSON file: {0}")]
    InvalidJson(String),

    /// Input shape is not a record collection.
    #[error("Unsupported JSON structure: {0}")]
    Unsupported(String),

    /// Invalid field path token.
    #[error("Invalid field token: {0}")]
    InvalidPath(String),

    /// CSV output failed.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Missing configuration: {0} not set")]
    MissingVar(String),

    /// A variable is set but cannot be parsed.
    #[error("Invalid value for {var}: {message}")]
    Invalid { var: String, message: String },
}

// =============================================================================
// Remote Errors
// =============================================================================

/// Errors reported by the remote configuration store.
///
/// Mapped from HTTP status codes: 409, 404, 401, everything else.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// A conflicting resource already exists.
    #[error("Conflicting resource already exists: {0}")]
    Conflict(String),

    /// The resource does not exist.
    #[error("Requested resource was not found: {0}")]
    NotFound(String),

    /// The API token was rejected.
    #[error("Request denied: {0}")]
    Unauthorized(String),

    /// Any other failure, including transport errors.
    #[error("Remote error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Unknown { status: Option<u16>, message: String },
}

impl RemoteError {
    /// Build an error from a non-success HTTP status.
    pub fn from_status(status: u16, context: impl Into<String>) -> Self {
        let context = context.into();
        match status {
            409 => RemoteError::Conflict(context),
            404 => RemoteError::NotFound(context),
            401 => RemoteError::Unauthorized(context),
            _ => RemoteError::Unknown {
                status: Some(status),
                message: context,
            },
        }
    }

    /// Build an error for a failure with no HTTP status (transport, decoding).
    pub fn transport(message: impl Into<String>) -> Self {
        RemoteError::Unknown {
            status: None,
            message: message.into(),
        }
    }
}

// =============================================================================
// Batch Errors (fatal)
// =============================================================================

/// Errors that abort the whole import before any row is dispatched.
#[derive(Debug, Error)]
pub enum BatchError {
    /// CSV input could not be parsed.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Source-of-truth document could not be loaded.
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// No edge scope could be determined for a row.
    #[error("Row {row}: cannot determine which edge the record belongs to (no 'mwedge' value and no default edge)")]
    ScopeResolution { row: usize },

    /// The record kind of a row is unknown.
    #[error("Row {row}: unknown object type '{value}'")]
    UnknownKind { row: usize, value: String },

    /// The record kind of a row could not be determined.
    #[error("Row {row}: no 'objectType' value and no record kind given")]
    MissingKind { row: usize },

    /// The CSV uses bare leaf names as columns and cannot be rebuilt into records.
    #[error("Row {row}: last-key export (column '_layout'); apply it offline with `txedit merge` instead")]
    LastKeyExport { row: usize },

    /// Remote call needed before planning failed (baseline fetch, connect).
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

// =============================================================================
// Row Errors (recoverable)
// =============================================================================

/// Errors scoped to a single row; counted as `failed`, the batch continues.
#[derive(Debug, Clone, Error)]
pub enum RowError {
    /// The remote store raised an error.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The update call reported failure without raising.
    #[error("Update of '{0}' was rejected")]
    Rejected(String),

    /// The create call returned a record without identity.
    #[error("Created record carries no identity")]
    MissingIdentity,
}

// =============================================================================
// Reconciliation Errors (top-level)
// =============================================================================

/// Top-level reconciliation error.
///
/// `Batch` errors are fatal and surface to the operator with no partial
/// results; `Row` errors are recovered locally and only reported in the
/// batch summary.
#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// Fatal, batch-scoped error.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// Recoverable, row-scoped error.
    #[error("Row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: RowError,
    },
}

impl ReconciliationError {
    /// Wrap a row error with its row number.
    pub fn row(row: usize, source: impl Into<RowError>) -> Self {
        ReconciliationError::Row {
            row,
            source: source.into(),
        }
    }

    /// Whether this error aborts the whole batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReconciliationError::Batch(_))
    }
}

impl From<CsvError> for ReconciliationError {
    fn from(err: CsvError) -> Self {
        ReconciliationError::Batch(err.into())
    }
}

impl From<DocumentError> for ReconciliationError {
    fn from(err: DocumentError) -> Self {
        ReconciliationError::Batch(err.into())
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Reconciliation error.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconciliationError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// A batch is already running.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for batch preparation.
pub type BatchResult<T> = Result<T, BatchError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
