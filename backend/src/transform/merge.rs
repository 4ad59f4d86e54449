//! Offline merge of an edited last-key CSV back onto a configuration
//! document.
//!
//! Rows are matched to records by `id`. Every leaf whose name appears as
//! a column is overwritten with the cell, coerced to the leaf's current
//! type. Nothing is sent anywhere.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};

use super::coerce::coerce_like;
use crate::error::BatchResult;
use crate::models::{
    text_field, ConfigDocument, FlatRow, RecordKind, ID_KEY, LAYOUT_KEY, OBJECT_TYPE_KEY, STATE_KEY,
    STREAM_KEY,
};
use crate::parser::parse_bytes;

/// Keys a merge never writes.
const PROTECTED_KEYS: [&str; 5] = [ID_KEY, OBJECT_TYPE_KEY, STREAM_KEY, STATE_KEY, LAYOUT_KEY];

/// Outcome of a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeSummary {
    /// Records a row was applied to.
    pub merged: usize,
    /// Row identities with no matching record.
    pub unmatched: Vec<String>,
}

/// Apply rows to the document in place.
///
/// Rows without an `id` are ignored; when several rows share one, the last
/// one is used.
pub fn merge_rows(doc: &mut ConfigDocument, rows: &[FlatRow]) -> MergeSummary {
    let mut by_id: HashMap<&str, &FlatRow> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for row in rows {
        let Some(id) = row.get(ID_KEY).map(|s| s.trim()).filter(|s| !s.is_empty()) else {
            continue;
        };
        if by_id.insert(id, row).is_none() {
            order.push(id);
        }
    }

    let mut summary = MergeSummary::default();
    let mut matched = std::collections::HashSet::new();

    for kind in RecordKind::ALL {
        for record in doc.records_mut(kind) {
            let Some(id) = text_field(record, ID_KEY).map(|id| id.into_owned()) else {
                continue;
            };
            if let Some(row) = by_id.get(id.as_str()) {
                apply_row(record, row);
                summary.merged += 1;
                matched.insert(id);
            }
        }
    }

    summary.unmatched = order
        .into_iter()
        .filter(|id| !matched.contains(*id))
        .map(str::to_string)
        .collect();
    summary
}

fn apply_row(node: &mut Map<String, Value>, row: &FlatRow) {
    for (key, value) in node.iter_mut() {
        if PROTECTED_KEYS.contains(&key.as_str()) {
            continue;
        }
        match value {
            Value::Object(children) => apply_row(children, row),
            _ => {
                if let Some(cell) = row.get(key) {
                    *value = coerce_like(value, cell);
                }
            }
        }
    }
}

/// Merge a CSV file onto a JSON document and write the result as pretty
/// JSON to `output`.
pub fn merge_file(
    csv_path: &Path,
    document_path: &Path,
    output: &Path,
    delimiter: Option<char>,
) -> BatchResult<MergeSummary> {
    let bytes = std::fs::read(csv_path).map_err(crate::error::CsvError::from)?;
    let parsed = parse_bytes(&bytes, delimiter, None)?;

    let mut doc = ConfigDocument::load(document_path)?;
    let summary = merge_rows(&mut doc, &parsed.records);
    doc.save(output)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, &str)]) -> FlatRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn doc() -> ConfigDocument {
        ConfigDocument::from_value(json!({
            "version": 3,
            "configuredStreams": [{
                "id": "s1",
                "name": "News",
                "enableThumbnails": false,
                "options": {"failoverWaitTime": 5, "ratio": 0.5},
                "state": {"name": "runtime"}
            }],
            "configuredSources": [{
                "id": "in1",
                "stream": "s1",
                "name": "Main",
                "priority": 0,
                "tags": ["a"]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_merge_preserves_types() {
        let mut doc = doc();
        let summary = merge_rows(
            &mut doc,
            &[row(&[
                ("id", "s1"),
                ("objectType", "Stream"),
                ("name", "News HD"),
                ("enableThumbnails", "yes"),
                ("failoverWaitTime", "8"),
                ("ratio", ""),
            ])],
        );

        assert_eq!(summary.merged, 1);
        let stream = doc.records(RecordKind::Stream)[0].clone();
        assert_eq!(stream["name"], "News HD");
        assert_eq!(stream["enableThumbnails"], true);
        assert_eq!(stream["options"]["failoverWaitTime"], 8);
        assert_eq!(stream["options"]["ratio"], 0.5);
        assert_eq!(stream["state"]["name"], "runtime");
    }

    #[test]
    fn test_protected_keys_untouched() {
        let mut doc = doc();
        merge_rows(
            &mut doc,
            &[row(&[("id", "in1"), ("stream", "s9"), ("priority", "x"), ("tags", "[\"b\"]")])],
        );

        let source = doc.records(RecordKind::Source)[0].clone();
        assert_eq!(source["stream"], "s1");
        assert_eq!(source["priority"], 0);
        assert_eq!(source["tags"], json!(["b"]));
    }

    #[test]
    fn test_last_key_export_merges_back_unchanged() {
        let original = doc();
        let export = crate::transform::export_combined(&original, crate::transform::FlattenMode::LastKey);

        let mut merged = doc();
        let summary = merge_rows(&mut merged, &export.table.rows);

        assert_eq!(summary.merged, 2);
        assert_eq!(merged, original);
    }

    #[test]
    fn test_unmatched_and_blank_ids() {
        let mut doc = doc();
        let summary = merge_rows(
            &mut doc,
            &[row(&[("id", ""), ("name", "x")]), row(&[("id", "ghost"), ("name", "y")])],
        );

        assert_eq!(summary.merged, 0);
        assert_eq!(summary.unmatched, vec!["ghost"]);
    }

    #[test]
    fn test_merge_file_keeps_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("edge.csv");
        let json_path = dir.path().join("edge-config.json");
        let out_path = dir.path().join("edge-merged.json");

        std::fs::write(&csv_path, "id,objectType,name\nin1,Source,Backup\n").unwrap();
        doc().save(&json_path).unwrap();

        let summary = merge_file(&csv_path, &json_path, &out_path, None).unwrap();
        assert_eq!(summary.merged, 1);

        let merged = ConfigDocument::load(&out_path).unwrap().into_value();
        assert_eq!(merged["version"], 3);
        assert_eq!(merged["configuredSources"][0]["name"], "Backup");
    }
}
