//! Remote configuration store.
//!
//! The executor only talks to a [`RemoteStore`]; [`CoreClient`] implements
//! it over the tx core REST API.

pub mod client;
pub mod fetch;
#[cfg(test)]
pub mod memory;

use std::future::Future;

use crate::error::RemoteResult;
use crate::models::{ConfigDocument, Record, RecordKind};

pub use client::{clean_payload, CoreClient, EdgeSummary};
pub use fetch::{connect_first, fetch_baseline, fetch_edge_configs, FetchReport};

/// Trait for stores that accept record writes.
///
/// Every call is awaited before the next one is issued; implementations
/// never see overlapping calls from one batch.
pub trait RemoteStore: Send + Sync {
    /// Create a record in an edge. The record carries no `id`; the created
    /// record, with its assigned identity, is returned.
    fn create(
        &self,
        kind: RecordKind,
        edge: &str,
        record: &Record,
    ) -> impl Future<Output = RemoteResult<Record>> + Send;

    /// Update an existing record. `Ok(false)` means the store refused the
    /// change without raising.
    fn update(
        &self,
        kind: RecordKind,
        edge: &str,
        record: &Record,
    ) -> impl Future<Output = RemoteResult<bool>> + Send;

    /// Current configuration of an edge.
    fn edge_config(&self, edge: &str) -> impl Future<Output = RemoteResult<ConfigDocument>> + Send;
}
