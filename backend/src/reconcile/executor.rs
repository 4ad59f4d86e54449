//! Batch executor: dispatches a plan to a remote store, one row at a time.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use super::planner::{PlanAction, PlanEntry};
use crate::api::logs::{
    log_info, log_info_indent, log_success, log_warning_indent, LogEntry, LogFile, LOG_BROADCASTER,
};
use crate::config::ReconciliationConfig;
use crate::error::{ReconciliationError, RowError};
use crate::models::{text_field, Record, RecordId, RecordKind, EDGE_KEY, NAME_KEY, STREAM_KEY};
use crate::remote::RemoteStore;
use crate::validation::{cast_record, validate_record};

/// Where a dispatched (or skipped) row ended up.
///
/// The earlier phases are the row's types: a [`PreparedRow`](super::PreparedRow)
/// is unflattened, a [`PlanEntry`] is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RowState {
    Succeeded,
    Failed,
    NotDispatched,
}

/// Outcome of one row, reported to the progress callback.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub row: usize,
    pub kind: RecordKind,
    pub identity: RecordId,
    pub action: PlanAction,
    pub state: RowState,
    /// Identity assigned by the store to a created record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Totals of a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// First failure descriptions, bounded by the batch configuration.
    pub failures: Vec<String>,
    /// The batch stopped at the first failure.
    pub stopped_early: bool,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "created={} updated={} skipped={} failed={}",
            self.created, self.updated, self.skipped, self.failed
        )?;
        if self.stopped_early {
            write!(f, " (stopped early)")?;
        }
        Ok(())
    }
}

/// Fill a blank `stream` from the streams created earlier in the batch.
fn link_created_stream(
    entry: &PlanEntry,
    record: &mut Record,
    created_streams: &HashMap<String, String>,
) {
    if !entry.kind.has_parent_stream() || text_field(record, STREAM_KEY).is_some() {
        return;
    }
    let Some(id) = entry
        .stream_name
        .as_ref()
        .and_then(|name| created_streams.get(name))
    else {
        return;
    };
    record.insert(STREAM_KEY.to_string(), Value::String(id.clone()));
}

/// Cast declared fields and log what does not fit. Never fails the row.
fn cast_and_check(entry: &PlanEntry, record: &mut Record) {
    for warning in cast_record(entry.kind, record) {
        log_warning_indent(format!("Row {}: {}", entry.row, warning), 1);
    }
    if let Err(errors) = validate_record(entry.kind, record) {
        for error in errors {
            log_warning_indent(format!("Row {}: schema: {}", entry.row, error), 1);
        }
    }
}

async fn dispatch<S: RemoteStore>(
    store: &S,
    entry: &PlanEntry,
    mut record: Record,
) -> Result<Option<String>, RowError> {
    record.insert(EDGE_KEY.to_string(), Value::String(entry.scope.clone()));

    match entry.action {
        PlanAction::Create => {
            RecordId::Unassigned.apply_to(&mut record);
            let created = store.create(entry.kind, &entry.scope, &record).await?;
            match RecordId::from_value(created.get("id")) {
                RecordId::Assigned(id) => Ok(Some(id)),
                RecordId::Unassigned => Err(RowError::MissingIdentity),
            }
        }
        PlanAction::Update => {
            if store.update(entry.kind, &entry.scope, &record).await? {
                Ok(None)
            } else {
                Err(RowError::Rejected(entry.identity.to_string()))
            }
        }
        PlanAction::Skip => Ok(None),
    }
}

/// Dispatch every entry in order and return the totals.
///
/// Row failures are logged, appended to the configured log file and
/// counted; the batch goes on unless `fail_fast` is set. Two dispatched
/// rows are at least `call_delay` apart. `on_row` sees every row once,
/// in its final state.
pub async fn execute_plan<S, F>(
    store: &S,
    entries: Vec<PlanEntry>,
    config: &ReconciliationConfig,
    mut on_row: F,
) -> BatchSummary
where
    S: RemoteStore,
    F: FnMut(&RowOutcome) + Send,
{
    let log_file = LogFile::new(config.log_file.as_deref());
    let mut summary = BatchSummary::default();
    let mut created_streams: HashMap<String, String> = HashMap::new();

    log_info(format!("Dispatching {} rows", entries.len()));

    for entry in &entries {
        let mut outcome = RowOutcome {
            row: entry.row,
            kind: entry.kind,
            identity: entry.identity.clone(),
            action: entry.action,
            state: RowState::NotDispatched,
            created_id: None,
            error: None,
        };

        if entry.action == PlanAction::Skip {
            summary.skipped += 1;
            on_row(&outcome);
            continue;
        }

        let mut record = entry.record.clone();
        link_created_stream(entry, &mut record, &created_streams);
        if config.validate {
            cast_and_check(entry, &mut record);
        }

        let stream_name = (entry.kind == RecordKind::Stream)
            .then(|| text_field(&record, NAME_KEY).map(|n| n.into_owned()))
            .flatten();

        let dispatched_at = Instant::now();
        let result = dispatch(store, entry, record).await;
        // stores that do not pause on their own still get the configured gap
        let pause = config.call_delay().saturating_sub(dispatched_at.elapsed());
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        match result {
            Ok(created_id) => {
                outcome.state = RowState::Succeeded;
                let verb = match entry.action {
                    PlanAction::Create => {
                        summary.created += 1;
                        "created"
                    }
                    _ => {
                        summary.updated += 1;
                        "updated"
                    }
                };
                let shown = created_id.clone().unwrap_or_else(|| entry.identity.to_string());
                log_info_indent(format!("Row {}: {} {} {}", entry.row, verb, entry.kind, shown), 1);
                if let (Some(id), Some(name)) = (&created_id, stream_name) {
                    created_streams.insert(name, id.clone());
                }
                outcome.created_id = created_id;
            }
            Err(err) => {
                let err = ReconciliationError::row(entry.row, err);
                let message = format!("{} {} '{}': {}", entry.kind, entry.scope, entry.identity, err);

                let log_entry = LogEntry::error(message.clone());
                log_file.append(&log_entry);
                LOG_BROADCASTER.log(log_entry);

                summary.failed += 1;
                if summary.failures.len() < config.max_failure_messages {
                    summary.failures.push(message.clone());
                }
                outcome.state = RowState::Failed;
                outcome.error = Some(message);
            }
        }
        on_row(&outcome);

        if outcome.state == RowState::Failed && config.fail_fast {
            summary.stopped_early = true;
            break;
        }
    }

    log_success(format!("Batch finished: {}", summary));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::reconcile::{plan, prepare_rows, BaselineIndex};
    use crate::remote::memory::{MemoryStore, StoreCall};
    use crate::models::FlatRow;
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

    fn entries(rows: &[FlatRow], kind: Option<RecordKind>, baseline: &BaselineIndex) -> Vec<PlanEntry> {
        plan(prepare_rows(rows, kind, &config()).unwrap(), baseline)
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        for id in ["s1", "s2", "s4", "s5"] {
            store.insert(RecordKind::Stream, "e1", json!({"id": id, "name": id}));
        }
        store
    }

    #[tokio::test]
    async fn test_row_failure_does_not_stop_batch() {
        let store = seeded_store();
        let baseline = BaselineIndex::from_document(&store.snapshot("e1"));

        let rows = vec![
            row(&[("id", "s1"), ("name", "s1 renamed")]),
            row(&[("id", "s2"), ("name", "s2")]),
            row(&[("id", "s3"), ("name", "ghost")]),
            row(&[("id", ""), ("name", "brand new")]),
            row(&[("id", "s5"), ("name", "s5 renamed")]),
        ];
        let mut seen = Vec::new();
        let summary = execute_plan(
            &store,
            entries(&rows, Some(RecordKind::Stream), &baseline),
            &config(),
            |outcome| seen.push((outcome.row, outcome.state)),
        )
        .await;

        assert_eq!(summary.created, 1);
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());
        assert!(summary.failures[0].contains("Row 3"));
        assert!(summary.failures[0].contains("not found"));

        assert_eq!(
            seen,
            vec![
                (1, RowState::Succeeded),
                (2, RowState::NotDispatched),
                (3, RowState::Failed),
                (4, RowState::Succeeded),
                (5, RowState::Succeeded),
            ]
        );
    }

    #[tokio::test]
    async fn test_call_delay_spaces_dispatched_rows() {
        let store = MemoryStore::new();
        let rows: Vec<FlatRow> = (1..=3)
            .map(|i| {
                let name = format!("new {}", i);
                row(&[("id", ""), ("name", name.as_str())])
            })
            .collect();
        let paced = ReconciliationConfig {
            call_delay_ms: 40,
            ..config()
        };

        let started = Instant::now();
        let summary = execute_plan(
            &store,
            entries(&rows, Some(RecordKind::Stream), &BaselineIndex::new()),
            &paced,
            |_| {},
        )
        .await;

        assert_eq!(summary.created, 3);
        assert!(started.elapsed() >= std::time::Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_create_payload_has_no_id() {
        let store = MemoryStore::new();
        execute_plan(
            &store,
            entries(&[row(&[("id", ""), ("name", "fresh")])], Some(RecordKind::Stream), &BaselineIndex::new()),
            &config(),
            |_| {},
        )
        .await;

        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        let StoreCall::Create { record, edge, .. } = &calls[0] else {
            panic!("expected a create call");
        };
        assert!(!record.contains_key("id"));
        assert_eq!(edge, "e1");
        assert_eq!(record["mwedge"], "e1");
    }

    #[tokio::test]
    async fn test_created_stream_links_children() {
        let store = MemoryStore::new();
        let rows = vec![
            row(&[("objectType", "Stream"), ("name", "News")]),
            row(&[("objectType", "Source"), ("streamName", "News"), ("name", "Main")]),
            row(&[("objectType", "Output"), ("stream", "other"), ("streamName", "News"), ("name", "SRT")]),
        ];
        let mut created = Vec::new();
        let summary = execute_plan(
            &store,
            entries(&rows, None, &BaselineIndex::new()),
            &config(),
            |outcome| created.extend(outcome.created_id.clone()),
        )
        .await;

        assert_eq!(summary.created, 3);
        let doc = store.snapshot("e1");
        let stream_id = created[0].clone();
        assert_eq!(doc.records(RecordKind::Source)[0]["stream"], json!(stream_id));
        // an explicit stream is left alone
        assert_eq!(doc.records(RecordKind::Output)[0]["stream"], "other");
    }

    #[tokio::test]
    async fn test_rejected_update_counts_as_failure() {
        let store = seeded_store();
        store.reject_updates_of("s1");

        let summary = execute_plan(
            &store,
            entries(&[row(&[("id", "s1"), ("name", "x")])], Some(RecordKind::Stream), &BaselineIndex::new()),
            &config(),
            |_| {},
        )
        .await;

        assert_eq!(summary.failed, 1);
        assert!(summary.failures[0].contains("rejected"));
    }

    #[tokio::test]
    async fn test_fail_fast_and_failure_bound() {
        let store = MemoryStore::new();
        store.fail_updates_with(RemoteError::Unauthorized("token expired".to_string()));
        let rows: Vec<FlatRow> = (1..=4)
            .map(|i| {
                let id = format!("s{}", i);
                row(&[("id", id.as_str()), ("name", "x")])
            })
            .collect();

        let bounded = ReconciliationConfig {
            max_failure_messages: 2,
            ..config()
        };
        let summary = execute_plan(&store, entries(&rows, Some(RecordKind::Stream), &BaselineIndex::new()), &bounded, |_| {}).await;
        assert_eq!(summary.failed, 4);
        assert_eq!(summary.failures.len(), 2);
        assert!(!summary.stopped_early);

        let fast = ReconciliationConfig {
            fail_fast: true,
            ..config()
        };
        let summary = execute_plan(&store, entries(&rows, Some(RecordKind::Stream), &BaselineIndex::new()), &fast, |_| {}).await;
        assert_eq!(summary.failed, 1);
        assert!(summary.stopped_early);
    }

    #[tokio::test]
    async fn test_validation_casts_declared_fields() {
        let store = MemoryStore::new();
        store.insert(RecordKind::Source, "e1", json!({"id": "in1", "stream": "s1", "priority": 0}));

        execute_plan(
            &store,
            entries(
                &[row(&[("id", "in1"), ("stream", "s1"), ("priority", "3"), ("name", "1234")])],
                Some(RecordKind::Source),
                &BaselineIndex::new(),
            ),
            &config(),
            |_| {},
        )
        .await;

        let doc = store.snapshot("e1");
        let source = doc.records(RecordKind::Source)[0];
        assert_eq!(source["priority"], 3);
        assert_eq!(source["name"], "1234");
    }

    #[tokio::test]
    async fn test_failures_written_to_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("import.log");
        let store = MemoryStore::new();

        let with_log = ReconciliationConfig {
            log_file: Some(log_path.clone()),
            ..config()
        };
        execute_plan(
            &store,
            entries(&[row(&[("id", "missing"), ("name", "x")])], Some(RecordKind::Output), &BaselineIndex::new()),
            &with_log,
            |_| {},
        )
        .await;

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("ERROR Output e1 'missing': Row 1"));
    }
}
