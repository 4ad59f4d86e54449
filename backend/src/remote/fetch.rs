//! Bulk download of edge configurations, and live baselines.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::client::CoreClient;
use super::RemoteStore;
use crate::api::logs::{log_info, log_success, log_warning};
use crate::config::CoreConfig;
use crate::error::{BatchResult, DocumentError, RemoteResult};
use crate::reconcile::BaselineIndex;

/// Files written by [`fetch_edge_configs`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchReport {
    pub saved: Vec<PathBuf>,
    /// Edge id to the core address it was fetched from.
    pub edge_cores: BTreeMap<String, String>,
}

/// Connect to the first core among `config.addresses` that answers.
pub async fn connect_first(config: &CoreConfig) -> RemoteResult<CoreClient> {
    CoreClient::connect(config).await
}

fn config_file_name(edge_name: &str) -> String {
    let safe: String = edge_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!("{}-config.json", safe)
}

/// Fetch the configuration of every online edge into `dir`, one
/// `<edgeName>-config.json` per edge.
///
/// When listing edges fails on the first core, the remaining cores are
/// tried once.
pub async fn fetch_edge_configs(config: &CoreConfig, dir: &Path) -> BatchResult<FetchReport> {
    let mut client = connect_first(config).await?;

    log_info("Fetching edges: online=true&limit=-1");
    let edges = match client.list_edges().await {
        Ok(edges) => edges,
        Err(e) => {
            log_warning(format!("Edge fetch failed: {}", e));
            let remaining: Vec<String> = config
                .addresses
                .iter()
                .filter(|a| a.trim_end_matches('/') != client.address())
                .cloned()
                .collect();
            if remaining.is_empty() {
                return Err(e.into());
            }
            log_info("Retrying with next core...");
            client = CoreClient::connect_any(&remaining, config).await?;
            client.list_edges().await?
        }
    };
    log_info(format!("Found {} edges", edges.len()));

    std::fs::create_dir_all(dir).map_err(DocumentError::from)?;

    let mut report = FetchReport::default();
    for edge in &edges {
        log_info(format!("Fetching config for edge: {} ({})", edge.display_name(), edge.id));
        let raw = client.edge_config_raw(&edge.id).await?;

        let path = dir.join(config_file_name(edge.display_name()));
        let pretty = serde_json::to_string_pretty(&raw).map_err(DocumentError::from)?;
        std::fs::write(&path, pretty).map_err(DocumentError::from)?;

        report.edge_cores.insert(edge.id.clone(), client.address().to_string());
        log_success(format!("Saved: {}", path.display()));
        report.saved.push(path);
    }

    log_success("Fetch complete");
    Ok(report)
}

/// Baseline built from the current configuration of each edge.
pub async fn fetch_baseline<S: RemoteStore>(store: &S, edges: &[String]) -> RemoteResult<BaselineIndex> {
    let mut baseline = BaselineIndex::new();
    for edge in edges {
        log_info(format!("Loading live baseline for edge {}", edge));
        let doc = store.edge_config(edge).await?;
        baseline.extend_from_document(&doc);
    }
    Ok(baseline)
}
