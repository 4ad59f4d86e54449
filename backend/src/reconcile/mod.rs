//! Reconciliation of edited rows against a remote store.
//!
//! ```text
//! rows ─► prepare_rows ─► plan (differ vs baseline) ─► execute_plan ─► BatchSummary
//! ```
//!
//! Preparation and planning are pure; only [`execute_plan`] talks to the
//! [`RemoteStore`](crate::remote::RemoteStore).

pub mod differ;
pub mod executor;
pub mod planner;

use serde_json::Value;

use crate::config::ReconciliationConfig;
use crate::error::{BatchError, BatchResult, ReconciliationError};
use crate::models::{
    FlatRow, Record, RecordId, RecordKind, EDGE_KEY, ID_KEY, LAST_KEY_LAYOUT, LAYOUT_KEY,
    OBJECT_TYPE_KEY, STREAM_KEY, STREAM_NAME_KEY,
};
use crate::parser::ParseResult;
use crate::remote::RemoteStore;
use crate::transform::coerce::CoercionWarning;
use crate::transform::flatten::{flatten, unflatten};

pub use differ::{diff, BaselineIndex, ColumnChange, DiffOutcome};
pub use executor::{execute_plan, BatchSummary, RowOutcome, RowState};
pub use planner::{classify, plan, PlanAction, PlanEntry, PlanSummary};

/// A row rebuilt into a record, with kind and scope resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRow {
    /// 1-based position among the data rows.
    pub row: usize,
    pub kind: RecordKind,
    pub identity: RecordId,
    /// Edge the record belongs to.
    pub scope: String,
    /// Display name of the parent stream, when the row carries one.
    pub stream_name: Option<String>,
    /// Record to send.
    pub record: Record,
    /// Canonical flat form of `record`, compared against the baseline.
    pub candidate: FlatRow,
    pub warnings: Vec<CoercionWarning>,
}

fn cell<'a>(row: &'a FlatRow, key: &str) -> Option<&'a str> {
    row.get(key).map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn resolve_kind(row_no: usize, row: &FlatRow, kind: Option<RecordKind>) -> BatchResult<RecordKind> {
    match cell(row, OBJECT_TYPE_KEY) {
        Some(value) => value.parse().map_err(|_| BatchError::UnknownKind {
            row: row_no,
            value: value.to_string(),
        }),
        None => kind.ok_or(BatchError::MissingKind { row: row_no }),
    }
}

/// Rebuild rows into records and resolve kind and scope for each.
///
/// Fails for the whole batch when any row has no usable kind or edge, or
/// when the rows come from a last-key export. Rows are numbered from 1.
pub fn prepare_rows(
    rows: &[FlatRow],
    kind: Option<RecordKind>,
    config: &ReconciliationConfig,
) -> BatchResult<Vec<PreparedRow>> {
    prepare_numbered(rows.iter().enumerate().map(|(i, row)| (i + 1, row)), kind, config)
}

/// [`prepare_rows`] over a parsed file, keeping the file's row numbers.
pub fn prepare_parsed(
    parsed: &ParseResult,
    kind: Option<RecordKind>,
    config: &ReconciliationConfig,
) -> BatchResult<Vec<PreparedRow>> {
    prepare_numbered(parsed.numbered_records(), kind, config)
}

fn prepare_numbered<'a>(
    rows: impl IntoIterator<Item = (usize, &'a FlatRow)>,
    kind: Option<RecordKind>,
    config: &ReconciliationConfig,
) -> BatchResult<Vec<PreparedRow>> {
    let default_edge = config
        .default_edge
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());

    rows.into_iter()
        .map(|(row_no, row)| {
            if cell(row, LAYOUT_KEY).is_some_and(|l| l.eq_ignore_ascii_case(LAST_KEY_LAYOUT)) {
                return Err(BatchError::LastKeyExport { row: row_no });
            }
            let kind = resolve_kind(row_no, row, kind)?;
            let scope = cell(row, EDGE_KEY)
                .or(default_edge)
                .ok_or(BatchError::ScopeResolution { row: row_no })?
                .to_string();

            let identity = RecordId::from_cell(row.get(ID_KEY).map(String::as_str));
            let stream_name = cell(row, STREAM_NAME_KEY).map(str::to_string);

            let rebuilt = unflatten(row);
            let mut record = rebuilt.record;
            record.remove(OBJECT_TYPE_KEY);
            record.remove(STREAM_NAME_KEY);

            // identities stay strings even when they look numeric
            identity.apply_to(&mut record);
            if let Some(stream) = cell(row, STREAM_KEY) {
                record.insert(STREAM_KEY.to_string(), Value::String(stream.to_string()));
            }
            record.insert(EDGE_KEY.to_string(), Value::String(scope.clone()));

            let candidate = flatten(&record);

            Ok(PreparedRow {
                row: row_no,
                kind,
                identity,
                scope,
                stream_name,
                record,
                candidate,
                warnings: rebuilt.warnings,
            })
        })
        .collect()
}

/// Distinct edges named by prepared rows, in first-seen order.
pub fn scopes(rows: &[PreparedRow]) -> Vec<String> {
    let mut seen = indexmap::IndexSet::new();
    for row in rows {
        seen.insert(row.scope.clone());
    }
    seen.into_iter().collect()
}

/// Prepare, plan and execute a batch.
///
/// Fatal problems (kind, scope) are returned before anything is sent;
/// row failures are folded into the summary.
pub async fn reconcile<S, F>(
    store: &S,
    rows: &[FlatRow],
    kind: Option<RecordKind>,
    baseline: &BaselineIndex,
    config: &ReconciliationConfig,
    on_row: F,
) -> Result<BatchSummary, ReconciliationError>
where
    S: RemoteStore,
    F: FnMut(&RowOutcome) + Send,
{
    let prepared = prepare_rows(rows, kind, config)?;
    let entries = plan(prepared, baseline);
    Ok(execute_plan(store, entries, config, on_row).await)
}
