//! Editable CSV exports of an edge configuration.
//!
//! - [`export_kind`] - one kind per file, dotted columns
//! - [`export_combined`] - every kind in one file, grouped by stream and
//!   tagged with `objectType`

use super::columns::ColumnProjector;
use super::flatten::{flatten, flatten_with, FlattenMode};
use crate::api::logs::log_warning;
use crate::models::{
    text_field, ConfigDocument, FlatRow, Record, RecordKind, ID_KEY, LAST_KEY_LAYOUT, LAYOUT_KEY,
    OBJECT_TYPE_KEY, STREAM_KEY, STREAM_NAME_KEY,
};
use crate::parser::Table;

/// Export records of one kind.
///
/// Sources and Outputs are stably sorted by `stream` and gain a
/// `streamName` column with the parent stream's name.
pub fn export_kind(doc: &ConfigDocument, kind: RecordKind) -> Table {
    let mut records = doc.records(kind);

    let rows: Vec<FlatRow> = if kind.has_parent_stream() {
        records.sort_by_key(|r| parent_stream(r).unwrap_or_default());
        let names = doc.stream_names();

        records
            .into_iter()
            .map(|record| {
                let mut row = flatten(record);
                let name = parent_stream(record)
                    .and_then(|id| names.get(&id).cloned())
                    .unwrap_or_default();
                row.insert(STREAM_NAME_KEY.to_string(), name);
                row
            })
            .collect()
    } else {
        records.into_iter().map(flatten).collect()
    };

    let headers = ColumnProjector::for_kind(kind).project(&rows);
    Table::new(headers, rows)
}

/// Result of a combined export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedExport {
    pub table: Table,
    /// Identities of Sources/Outputs whose stream is unknown.
    pub orphans: Vec<String>,
}

/// Export Streams, Sources and Outputs together.
///
/// Each Stream row is followed by its Sources, then its Outputs. Rows whose
/// stream is not in the document are appended at the end.
///
/// In [`FlattenMode::LastKey`] every row also carries a trailing
/// `_layout = last-key` column: such files only go back through the
/// offline merge, the importer refuses them.
pub fn export_combined(doc: &ConfigDocument, mode: FlattenMode) -> CombinedExport {
    let streams = doc.records(RecordKind::Stream);
    let children: Vec<(RecordKind, &Record)> = [RecordKind::Source, RecordKind::Output]
        .into_iter()
        .flat_map(|kind| doc.records(kind).into_iter().map(move |r| (kind, r)))
        .collect();

    let tagged = |kind: RecordKind, record: &Record| {
        let mut row = flatten_with(record, mode);
        row.insert(OBJECT_TYPE_KEY.to_string(), kind.label().to_string());
        row
    };

    let mut rows = Vec::with_capacity(streams.len() + children.len());
    let mut placed = vec![false; children.len()];

    for stream in &streams {
        rows.push(tagged(RecordKind::Stream, stream));

        let Some(stream_id) = text_field(stream, ID_KEY) else {
            continue;
        };
        for kind in [RecordKind::Source, RecordKind::Output] {
            for (i, (child_kind, child)) in children.iter().enumerate() {
                if *child_kind == kind
                    && !placed[i]
                    && parent_stream(child).as_deref() == Some(&*stream_id)
                {
                    rows.push(tagged(kind, child));
                    placed[i] = true;
                }
            }
        }
    }

    let mut orphans = Vec::new();
    for (i, (kind, child)) in children.iter().enumerate() {
        if placed[i] {
            continue;
        }
        let id = text_field(child, ID_KEY).unwrap_or_default().into_owned();
        log_warning(format!(
            "{} '{}' references unknown stream '{}'",
            kind,
            id,
            parent_stream(child).unwrap_or_default()
        ));
        rows.push(tagged(*kind, child));
        orphans.push(id);
    }

    let mut headers = ColumnProjector::combined().project(&rows);
    if mode == FlattenMode::LastKey {
        for row in &mut rows {
            row.insert(LAYOUT_KEY.to_string(), LAST_KEY_LAYOUT.to_string());
        }
        headers.push(LAYOUT_KEY.to_string());
    }
    CombinedExport {
        table: Table::new(headers, rows),
        orphans,
    }
}

fn parent_stream(record: &Record) -> Option<String> {
    text_field(record, STREAM_KEY).map(|s| s.into_owned())
}
