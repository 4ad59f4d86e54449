//! Failover settings report: one row per Stream, followed by its Sources.

use serde_json::Value;

use super::flatten::render_scalar;
use crate::models::{text_field, ConfigDocument, FlatRow, Record, RecordKind, ID_KEY, NAME_KEY, STREAM_KEY};
use crate::parser::Table;

/// Fields read from `options.failoverTriggers`.
const TRIGGER_FIELDS: [&str; 7] = [
    "zeroBitrate",
    "TSSyncLoss",
    "lowBitrateThreshold",
    "CCErrorsInPeriodThreshold",
    "CCErrorsInPeriodTime",
    "lowBitrate",
    "CCErrorsInPeriod",
];

/// Fields read from `options`.
const OPTION_FIELDS: [&str; 3] = ["failoverMode", "failoverRevertTime", "failoverWaitTime"];

const THUMBNAILS: &str = "enableThumbnails";
const PRIORITY: &str = "priority";

/// Report header, in column order.
pub fn report_headers() -> Vec<String> {
    std::iter::once(NAME_KEY)
        .chain(TRIGGER_FIELDS)
        .chain(OPTION_FIELDS)
        .chain([THUMBNAILS, PRIORITY])
        .map(str::to_string)
        .collect()
}

fn cell(value: Option<&Value>) -> String {
    value.map(render_scalar).unwrap_or_default()
}

/// Build the failover report.
///
/// Stream rows carry the trigger and option fields; each Source row only
/// carries `name` and `priority`.
pub fn failover_report(doc: &ConfigDocument) -> Table {
    let sources = doc.records(RecordKind::Source);
    let mut rows = Vec::new();

    for stream in doc.records(RecordKind::Stream) {
        rows.push(stream_row(stream));

        let Some(stream_id) = text_field(stream, ID_KEY) else {
            continue;
        };
        for source in &sources {
            if text_field(source, STREAM_KEY).as_deref() == Some(&*stream_id) {
                let mut row = FlatRow::new();
                row.insert(NAME_KEY.to_string(), cell(source.get(NAME_KEY)));
                row.insert(PRIORITY.to_string(), cell(source.get(PRIORITY)));
                rows.push(row);
            }
        }
    }

    Table::new(report_headers(), rows)
}

fn stream_row(stream: &Record) -> FlatRow {
    let options = stream.get("options").and_then(Value::as_object);
    let triggers = options
        .and_then(|o| o.get("failoverTriggers"))
        .and_then(Value::as_object);

    let mut row = FlatRow::new();
    row.insert(NAME_KEY.to_string(), cell(stream.get(NAME_KEY)));
    for field in TRIGGER_FIELDS {
        row.insert(field.to_string(), cell(triggers.and_then(|t| t.get(field))));
    }
    for field in OPTION_FIELDS {
        row.insert(field.to_string(), cell(options.and_then(|o| o.get(field))));
    }

    // Top-level flag first, options as fallback
    let thumbnails = stream
        .get(THUMBNAILS)
        .filter(|v| !v.is_null())
        .or_else(|| options.and_then(|o| o.get(THUMBNAILS)));
    row.insert(THUMBNAILS.to_string(), cell(thumbnails));
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_headers() {
        let headers = report_headers();
        assert_eq!(headers.len(), 13);
        assert_eq!(headers[0], "name");
        assert_eq!(headers[1], "zeroBitrate");
        assert_eq!(headers[8], "failoverMode");
        assert_eq!(headers[12], "priority");
    }

    #[test]
    fn test_report_rows() {
        let doc = ConfigDocument::from_value(json!({
            "configuredStreams": [{
                "id": "s1",
                "name": "News",
                "options": {
                    "failoverMode": "priority",
                    "failoverWaitTime": 3,
                    "enableThumbnails": false,
                    "failoverTriggers": {"zeroBitrate": true, "lowBitrateThreshold": 500}
                }
            }],
            "configuredSources": [
                {"id": "a", "stream": "s1", "name": "Main", "priority": 0},
                {"id": "b", "stream": "other", "name": "Elsewhere", "priority": 1}
            ]
        }))
        .unwrap();

        let table = failover_report(&doc);
        assert_eq!(table.rows.len(), 2);

        let stream = &table.rows[0];
        assert_eq!(stream["name"], "News");
        assert_eq!(stream["zeroBitrate"], "true");
        assert_eq!(stream["lowBitrateThreshold"], "500");
        assert_eq!(stream["TSSyncLoss"], "");
        assert_eq!(stream["failoverWaitTime"], "3");
        assert_eq!(stream["enableThumbnails"], "false");
        assert!(!stream.contains_key("priority"));

        let source = &table.rows[1];
        assert_eq!(source["name"], "Main");
        assert_eq!(source["priority"], "0");

        let csv = table.to_csv_string(',').unwrap();
        assert!(csv.lines().nth(2).unwrap().starts_with("Main,,,,,,,,,,,,0"));
    }
}
