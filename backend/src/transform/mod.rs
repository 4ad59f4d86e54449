//! Transformation module.
//!
//! Everything that turns configuration records into rows and back:
//! - Flatten: record <-> flat row
//! - Coerce: cell text -> typed values
//! - Columns: stable headers
//! - Export / Report / Convert / Merge: file-level operations built on the above

pub mod coerce;
pub mod columns;
pub mod convert;
pub mod export;
pub mod flatten;
pub mod merge;
pub mod path;
pub mod report;

pub use coerce::{coerce, coerce_like, parse_bool_loose, Coercion, CoercionWarning};
pub use columns::{collect_columns, ColumnProjector};
pub use convert::{convert, convert_file, load_records, ConvertOptions};
pub use export::{export_combined, export_kind, CombinedExport};
pub use flatten::{
    flatten, flatten_last_key, flatten_with, is_state_rooted, normalize, render_scalar, unflatten,
    FlattenMode, Unflattened,
};
pub use merge::{merge_file, merge_rows, MergeSummary};
pub use path::FieldPath;
pub use report::failover_report;
