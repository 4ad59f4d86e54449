//! Reconciliation planner: decides what each row needs.
//!
//! Pure: no remote calls, no clock, no filesystem.

use serde::Serialize;

use super::differ::{diff, BaselineIndex, ColumnChange, DiffOutcome};
use super::PreparedRow;
use crate::models::{Record, RecordId, RecordKind};
use crate::transform::coerce::CoercionWarning;

/// What to do with a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Create,
    Update,
    Skip,
}

/// A classified row, ready for dispatch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEntry {
    pub row: usize,
    pub identity: RecordId,
    pub kind: RecordKind,
    pub scope: String,
    pub action: PlanAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_name: Option<String>,
    pub record: Record,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ColumnChange>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CoercionWarning>,
}

/// Counts of a plan, per action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub skip: usize,
}

impl PlanSummary {
    pub fn of(entries: &[PlanEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            match entry.action {
                PlanAction::Create => summary.create += 1,
                PlanAction::Update => summary.update += 1,
                PlanAction::Skip => summary.skip += 1,
            }
        }
        summary
    }
}

/// Classify one row against the baseline.
pub fn classify(row: &PreparedRow, baseline: &BaselineIndex) -> (PlanAction, Vec<ColumnChange>) {
    let Some(id) = row.identity.as_str() else {
        return (PlanAction::Create, Vec::new());
    };

    match diff(id, &row.candidate, baseline) {
        DiffOutcome::Unchanged => (PlanAction::Skip, Vec::new()),
        DiffOutcome::NoBaseline => (PlanAction::Update, Vec::new()),
        DiffOutcome::Changed(changes) => (PlanAction::Update, changes),
    }
}

/// Plan every row, in file order.
pub fn plan(rows: Vec<PreparedRow>, baseline: &BaselineIndex) -> Vec<PlanEntry> {
    rows.into_iter()
        .map(|row| {
            let (action, changes) = classify(&row, baseline);
            PlanEntry {
                row: row.row,
                identity: row.identity,
                kind: row.kind,
                scope: row.scope,
                action,
                stream_name: row.stream_name,
                record: row.record,
                changes,
                warnings: row.warnings,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconciliationConfig;
    use crate::models::{ConfigDocument, FlatRow};
    use crate::reconcile::prepare_rows;
    use serde_json::json;

    fn row(pairs: &[(&str, &str)]) -> FlatRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config() -> ReconciliationConfig {
        ReconciliationConfig::default().with_default_edge("e1")
    }

    fn remote_state() -> ConfigDocument {
        ConfigDocument::from_value(json!({
            "configuredStreams": [{"id": "s1", "name": "old", "mwedge": "e1", "enableThumbnails": true}],
            "configuredSources": [{"id": "in1", "stream": "s1", "name": "Main", "priority": 1}]
        }))
        .unwrap()
    }

    #[test]
    fn test_edited_row_is_update() {
        let baseline = BaselineIndex::from_document(&remote_state());
        let rows = prepare_rows(
            &[row(&[("id", "s1"), ("name", "new")])],
            Some(RecordKind::Stream),
            &config(),
        )
        .unwrap();
        let entries = plan(rows, &baseline);

        assert_eq!(entries[0].action, PlanAction::Update);
        assert_eq!(entries[0].changes[0].column, "name");
        assert_eq!(entries[0].changes[0].after, "new");
    }

    #[test]
    fn test_blank_identity_is_create() {
        let rows = prepare_rows(
            &[row(&[("id", ""), ("name", "fresh")])],
            Some(RecordKind::Stream),
            &config(),
        )
        .unwrap();
        let entries = plan(rows, &BaselineIndex::new());

        assert_eq!(entries[0].action, PlanAction::Create);
        assert_eq!(entries[0].identity, RecordId::Unassigned);
        assert!(!entries[0].record.contains_key("id"));
    }

    #[test]
    fn test_unknown_identity_is_update() {
        let rows = prepare_rows(
            &[row(&[("id", "s9"), ("name", "x")])],
            Some(RecordKind::Stream),
            &config(),
        )
        .unwrap();
        assert_eq!(plan(rows, &BaselineIndex::new())[0].action, PlanAction::Update);
    }

    #[test]
    fn test_plan_is_idempotent_against_remote_state() {
        let doc = remote_state();
        let baseline = BaselineIndex::from_document(&doc);
        let exported = vec![
            row(&[("id", "s1"), ("objectType", "Stream"), ("name", "old"), ("enableThumbnails", "true"), ("mwedge", "e1")]),
            row(&[("id", "in1"), ("objectType", "Source"), ("stream", "s1"), ("streamName", "old"), ("name", "Main"), ("priority", "1")]),
        ];

        for _ in 0..2 {
            let rows = prepare_rows(&exported, None, &config()).unwrap();
            let entries = plan(rows, &baseline);
            assert!(entries.iter().all(|e| e.action == PlanAction::Skip));
        }
    }

    #[test]
    fn test_exported_csv_plans_to_skip() {
        use crate::parser::parse_str;
        use crate::reconcile::prepare_parsed;
        use crate::transform::{export_combined, export_kind, FlattenMode};

        let doc = ConfigDocument::from_value(json!({
            "configuredStreams": [{
                "id": "s1", "name": "News", "mwedge": "e1", "enableThumbnails": true,
                "options": {"failoverMode": "priority", "failoverWaitTime": 5},
                "state": {"health": "up"}
            }],
            "configuredSources": [{"id": "in1", "stream": "s1", "name": "Main", "priority": 1, "paused": false}],
            "configuredOutputs": [{"id": "out1", "stream": "s1", "name": "SRT", "tags": ["hd", "backup"]}]
        }))
        .unwrap();
        let baseline = BaselineIndex::from_document(&doc);

        let exports = vec![
            (export_combined(&doc, FlattenMode::Dotted).table, None),
            (export_kind(&doc, RecordKind::Stream), Some(RecordKind::Stream)),
            (export_kind(&doc, RecordKind::Source), Some(RecordKind::Source)),
            (export_kind(&doc, RecordKind::Output), Some(RecordKind::Output)),
        ];
        for (table, kind) in exports {
            let csv = table.to_csv_string(';').unwrap();
            let parsed = parse_str(&csv, ';', "utf-8".to_string()).unwrap();

            let entries = plan(prepare_parsed(&parsed, kind, &config()).unwrap(), &baseline);
            assert!(!entries.is_empty());
            for entry in &entries {
                assert_eq!(entry.action, PlanAction::Skip, "{}: {:?}", entry.identity, entry.changes);
            }
        }
    }

    #[test]
    fn test_summary_counts() {
        let baseline = BaselineIndex::from_document(&remote_state());
        let rows = prepare_rows(
            &[
                row(&[("id", "s1"), ("name", "old")]),
                row(&[("id", "s1"), ("name", "new")]),
                row(&[("name", "third")]),
            ],
            Some(RecordKind::Stream),
            &config(),
        )
        .unwrap();
        let summary = PlanSummary::of(&plan(rows, &baseline));
        assert_eq!(summary, PlanSummary { create: 1, update: 1, skip: 1 });
    }
}
