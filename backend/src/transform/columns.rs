//! Stable CSV headers for heterogeneous rows.

use crate::models::{
    FlatRow, RecordKind, ID_KEY, NAME_KEY, OBJECT_TYPE_KEY, STREAM_KEY, STREAM_NAME_KEY,
};

use super::flatten::is_state_rooted;

/// Orders the union of row keys into a header.
///
/// Pinned keys present in the input come first, then the `objectType`
/// marker when projecting mixed kinds, then the rest sorted
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnProjector {
    pinned: Vec<&'static str>,
    object_type: bool,
}

impl ColumnProjector {
    /// Header for rows of a single kind.
    pub fn for_kind(kind: RecordKind) -> Self {
        let pinned = match kind {
            RecordKind::Stream => vec![ID_KEY, NAME_KEY],
            RecordKind::Source | RecordKind::Output => {
                vec![ID_KEY, STREAM_KEY, STREAM_NAME_KEY, NAME_KEY]
            }
        };
        Self {
            pinned,
            object_type: false,
        }
    }

    /// Header for Streams, Sources and Outputs exported together.
    pub fn combined() -> Self {
        Self {
            pinned: vec![ID_KEY, STREAM_KEY, NAME_KEY],
            object_type: true,
        }
    }

    pub fn project(&self, rows: &[FlatRow]) -> Vec<String> {
        let seen = collect_columns(rows);

        let mut header: Vec<String> = self
            .pinned
            .iter()
            .filter(|key| seen.iter().any(|s| s == *key))
            .map(|key| key.to_string())
            .collect();

        if self.object_type {
            header.push(OBJECT_TYPE_KEY.to_string());
        }

        let mut rest: Vec<String> = seen
            .into_iter()
            .filter(|key| !header.contains(key) && key != OBJECT_TYPE_KEY)
            .collect();
        rest.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));

        header.extend(rest);
        header
    }
}

/// Keys across rows in first-seen order, `state` columns excluded.
pub fn collect_columns(rows: &[FlatRow]) -> Vec<String> {
    let mut seen = indexmap::IndexSet::new();
    for row in rows {
        for key in row.keys() {
            if !is_state_rooted(key) {
                seen.insert(key.as_str());
            }
        }
    }
    seen.into_iter().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(keys: &[&str]) -> FlatRow {
        keys.iter().map(|k| (k.to_string(), String::new())).collect()
    }

    #[test]
    fn test_stream_header() {
        let rows = vec![row(&["zeta", "name", "Alpha", "id"]), row(&["beta", "state.x"])];
        let header = ColumnProjector::for_kind(RecordKind::Stream).project(&rows);

        assert_eq!(header, vec!["id", "name", "Alpha", "beta", "zeta"]);
    }

    #[test]
    fn test_source_header_pins_join_keys() {
        let rows = vec![row(&["priority", "name", "stream", "streamName", "id"])];
        let header = ColumnProjector::for_kind(RecordKind::Source).project(&rows);

        assert_eq!(header, vec!["id", "stream", "streamName", "name", "priority"]);
    }

    #[test]
    fn test_pinned_keys_only_when_present() {
        let rows = vec![row(&["name", "b", "a"])];
        let header = ColumnProjector::for_kind(RecordKind::Output).project(&rows);

        assert_eq!(header, vec!["name", "a", "b"]);
    }

    #[test]
    fn test_combined_always_has_object_type() {
        let rows = vec![row(&["name", "id", "x"]), row(&["stream", "id", "objectType"])];
        let header = ColumnProjector::combined().project(&rows);

        assert_eq!(header, vec!["id", "stream", "name", "objectType", "x"]);
    }

    #[test]
    fn test_case_insensitive_sort_is_stable() {
        let rows = vec![row(&["b", "B", "a", "A"])];
        let header = ColumnProjector::for_kind(RecordKind::Stream).project(&rows);

        assert_eq!(header, vec!["A", "a", "B", "b"]);
    }

    #[test]
    fn test_id_is_first_column() {
        let rows = vec![row(&["aaa", "name"]), row(&["id"])];
        for projector in [
            ColumnProjector::for_kind(RecordKind::Stream),
            ColumnProjector::for_kind(RecordKind::Source),
            ColumnProjector::combined(),
        ] {
            assert_eq!(projector.project(&rows)[0], "id");
        }
    }
}
