//! # txedit - bulk editing of tx edge configuration through CSV
//!
//! Streams, sources and outputs of a tx edge are exported to spreadsheets,
//! edited by hand, and written back through the tx core API. Only rows that
//! actually changed are sent.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Edited CSV │────▶│  Unflatten  │────▶│   Planner   │────▶│  Executor   │──▶ tx core
//! │  (auto-enc) │     │  + coerce   │     │ (vs baseline│     │ (sequential)│
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use txedit::{parse_file_auto, reconcile, BaselineIndex, ConfigDocument, CoreClient,
//!              CoreConfig, ReconciliationConfig, RecordKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rows = parse_file_auto("sources.csv")?.records;
//!     let baseline = BaselineIndex::from_document(&ConfigDocument::load("edge-config.json")?);
//!     let client = CoreClient::connect(&CoreConfig::from_env()?).await?;
//!     let config = ReconciliationConfig::default().with_default_edge("edge-id");
//!
//!     let summary = reconcile(&client, &rows, Some(RecordKind::Source), &baseline, &config, |_| {}).await?;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Records, kinds, identities, configuration documents
//! - [`parser`] - CSV reading with auto-detection, and writing
//! - [`transform`] - Flatten/unflatten, coercion, columns, exports, merge
//! - [`reconcile`] - Differ, planner and batch executor
//! - [`remote`] - Remote store trait and tx core client
//! - [`validation`] - Declared field types and JSON Schema checks
//! - [`config`] - Batch and core connection settings
//! - [`api`] - HTTP API server and log broadcasting

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Reconciliation
pub mod reconcile;

// Remote store
pub mod remote;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    BatchError, ConfigError, ConvertError, CsvError, DocumentError, ReconciliationError,
    RemoteError, RowError, ServerError,
};

// =============================================================================
// Re-exports - Models and configuration
// =============================================================================

pub use config::{CoreConfig, ReconciliationConfig};
pub use models::{ConfigDocument, FlatRow, Record, RecordId, RecordKind};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes, parse_bytes_auto,
    parse_file_auto, ParseResult, Table,
};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    coerce, convert_file, export_combined, export_kind, failover_report, flatten, merge_file,
    unflatten, ConvertOptions, FlattenMode, MergeSummary,
};

// =============================================================================
// Re-exports - Reconciliation
// =============================================================================

pub use reconcile::{
    execute_plan, plan, prepare_parsed, prepare_rows, reconcile, scopes, BaselineIndex,
    BatchSummary, DiffOutcome, PlanAction, PlanEntry, PlanSummary, RowOutcome, RowState,
};

// =============================================================================
// Re-exports - Remote
// =============================================================================

pub use remote::{connect_first, fetch_baseline, fetch_edge_configs, CoreClient, RemoteStore};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{cast_record, is_valid, validate, validate_record};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
