//! Snapshot differ.
//!
//! Compares a candidate row against the last-known state of the same record.
//! Comparison is on rendered strings: `"1.0"` and `"1"` differ.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{
    text_field, ConfigDocument, FlatRow, RecordKind, EDGE_KEY, ID_KEY, OBJECT_TYPE_KEY,
    STREAM_NAME_KEY,
};
use crate::transform::flatten::{flatten, normalize};

/// Columns never compared.
const IGNORED_COLUMNS: [&str; 4] = [ID_KEY, EDGE_KEY, STREAM_NAME_KEY, OBJECT_TYPE_KEY];

/// Last-known flat state of records, by identity. Read-only during a batch.
#[derive(Debug, Clone, Default)]
pub struct BaselineIndex {
    rows: HashMap<String, FlatRow>,
}

impl BaselineIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every identified record of a configuration document.
    pub fn from_document(doc: &ConfigDocument) -> Self {
        let mut index = Self::new();
        index.extend_from_document(doc);
        index
    }

    pub fn extend_from_document(&mut self, doc: &ConfigDocument) {
        for kind in RecordKind::ALL {
            for record in doc.records(kind) {
                if let Some(id) = text_field(record, ID_KEY) {
                    self.rows.insert(id.into_owned(), flatten(record));
                }
            }
        }
    }

    /// Index rows of a previously exported CSV.
    pub fn from_rows(rows: &[FlatRow]) -> Self {
        let mut index = Self::new();
        for row in rows {
            let Some(id) = row.get(ID_KEY).map(|s| s.trim()).filter(|s| !s.is_empty()) else {
                continue;
            };
            index.rows.insert(id.to_string(), normalize(row));
        }
        index
    }

    pub fn insert(&mut self, id: impl Into<String>, row: FlatRow) {
        self.rows.insert(id.into(), row);
    }

    pub fn get(&self, id: &str) -> Option<&FlatRow> {
        self.rows.get(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One differing column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnChange {
    pub column: String,
    /// Baseline value; `None` when the baseline lacks the column.
    pub before: Option<String>,
    pub after: String,
}

/// Result of comparing a row against the baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOutcome {
    /// The baseline has no entry for this identity.
    NoBaseline,
    Unchanged,
    Changed(Vec<ColumnChange>),
}

impl DiffOutcome {
    pub fn changes(&self) -> &[ColumnChange] {
        match self {
            DiffOutcome::Changed(changes) => changes,
            _ => &[],
        }
    }
}

/// Compare `candidate` to the baseline entry for `id`.
///
/// Only candidate columns are compared; a column present in the baseline
/// but missing from the candidate is not a change.
pub fn diff(id: &str, candidate: &FlatRow, baseline: &BaselineIndex) -> DiffOutcome {
    let Some(known) = baseline.get(id) else {
        return DiffOutcome::NoBaseline;
    };

    let changes: Vec<ColumnChange> = candidate
        .iter()
        .filter(|(column, _)| !IGNORED_COLUMNS.contains(&column.as_str()))
        .filter(|(column, value)| known.get(*column) != Some(*value))
        .map(|(column, value)| ColumnChange {
            column: column.clone(),
            before: known.get(column).cloned(),
            after: value.clone(),
        })
        .collect();

    if changes.is_empty() {
        DiffOutcome::Unchanged
    } else {
        DiffOutcome::Changed(changes)
    }
}
