//! HTTP client for the tx core REST API.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::RemoteStore;
use crate::api::logs::{log_info, log_success, log_warning};
use crate::config::CoreConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::models::{ConfigDocument, Record, RecordKind, ID_KEY};

/// Longest response excerpt kept in an error message.
const ERROR_BODY_LIMIT: usize = 200;

/// Values dropped from payloads before sending.
const EMPTY_MARKERS: [&str; 4] = ["", "None", "none", "null"];

/// An edge as listed by the core.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeSummary {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl EdgeSummary {
    /// Name, or the id when the edge is unnamed.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Deserialize)]
struct CoreSettings {
    #[serde(default)]
    version: Option<String>,
}

/// Client bound to one core address.
#[derive(Clone)]
pub struct CoreClient {
    http: reqwest::Client,
    address: String,
    token: String,
    call_delay: Duration,
}

impl CoreClient {
    /// Build a client for one address without contacting it.
    pub fn new(address: &str, config: &CoreConfig) -> RemoteResult<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_https)
            .build()
            .map_err(|e| RemoteError::transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            address: address.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            call_delay: config.call_delay(),
        })
    }

    /// Connect to the first core that answers the version probe.
    pub async fn connect(config: &CoreConfig) -> RemoteResult<Self> {
        Self::connect_any(&config.addresses, config).await
    }

    pub(crate) async fn connect_any(addresses: &[String], config: &CoreConfig) -> RemoteResult<Self> {
        let mut last_error = None;

        for address in addresses {
            log_info(format!("Trying core: {}", address));
            let attempt = match Self::new(address, config) {
                Ok(client) => client.version().await.map(|v| (client, v)),
                Err(e) => Err(e),
            };
            match attempt {
                Ok((client, version)) => {
                    log_success(format!("Connected to {} (core version {})", address, version));
                    return Ok(client);
                }
                Err(e) => {
                    log_warning(format!("Failed core {}: {}", address, e));
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| RemoteError::transport("No core addresses provided")))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Core version, from `GET /api/settings`.
    pub async fn version(&self) -> RemoteResult<String> {
        let url = format!("{}/api/settings", self.address);
        let body = self.send(self.http.get(&url), "GetCoreVersion").await?;
        let settings: CoreSettings = serde_json::from_value(body)
            .map_err(|e| RemoteError::transport(format!("Invalid settings response: {}", e)))?;
        Ok(settings.version.unwrap_or_else(|| "0.0.0".to_string()))
    }

    /// Online edges known to this core.
    pub async fn list_edges(&self) -> RemoteResult<Vec<EdgeSummary>> {
        let url = format!("{}/api/mwedges?online=true&limit=-1", self.address);
        let body = self.send(self.http.get(&url), "GetEdges").await?;
        serde_json::from_value(body)
            .map_err(|e| RemoteError::transport(format!("Invalid edge list: {}", e)))
    }

    /// Full configuration of an edge as returned by the core.
    pub async fn edge_config_raw(&self, edge: &str) -> RemoteResult<Value> {
        let url = format!("{}/api/mwedge/{}", self.address, edge);
        self.send(self.http.get(&url), &format!("GetEdgeById {}", edge)).await
    }

    fn record_url(&self, kind: RecordKind, edge: &str, id: Option<&str>) -> String {
        let base = format!("{}/api/mwedge/{}/{}/", self.address, edge, kind.api_segment());
        match id {
            Some(id) => format!("{}{}", base, id),
            None => base,
        }
    }

    /// Send a request, wait the call delay, map the status.
    async fn send(&self, request: reqwest::RequestBuilder, context: &str) -> RemoteResult<Value> {
        let result = request.bearer_auth(&self.token).send().await;
        tokio::time::sleep(self.call_delay).await;

        let response = result.map_err(|e| RemoteError::transport(format!("{}: {}", context, e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::transport(format!("{}: {}", context, e)))?;

        if !status.is_success() {
            let excerpt: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            return Err(RemoteError::from_status(
                status.as_u16(),
                format!("{} {}", context, excerpt).trim_end().to_string(),
            ));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| RemoteError::transport(format!("{}: invalid JSON response: {}", context, e)))
    }
}

impl RemoteStore for CoreClient {
    async fn create(&self, kind: RecordKind, edge: &str, record: &Record) -> RemoteResult<Record> {
        let mut payload = clean_payload(record);
        payload.remove(ID_KEY);

        let url = self.record_url(kind, edge, None);
        let context = format!("Create{}", kind.label());
        match self.send(self.http.post(&url).json(&payload), &context).await? {
            Value::Object(created) => Ok(created),
            other => Err(RemoteError::transport(format!(
                "{}: expected an object, got {}",
                context, other
            ))),
        }
    }

    async fn update(&self, kind: RecordKind, edge: &str, record: &Record) -> RemoteResult<bool> {
        let Some(id) = record.get(ID_KEY).and_then(Value::as_str) else {
            return Ok(false);
        };
        let payload = clean_payload(record);

        let url = self.record_url(kind, edge, Some(id));
        let context = format!("Update{} {}", kind.label(), id);
        self.send(self.http.put(&url).json(&payload), &context).await?;
        Ok(true)
    }

    async fn edge_config(&self, edge: &str) -> RemoteResult<ConfigDocument> {
        let raw = self.edge_config_raw(edge).await?;
        ConfigDocument::from_value(raw)
            .map_err(|e| RemoteError::transport(format!("Edge {}: {}", edge, e)))
    }
}

/// Copy of `record` without null or empty members, at every object depth.
pub fn clean_payload(record: &Record) -> Record {
    let mut cleaned = Map::new();
    for (key, value) in record {
        match value {
            Value::Null => {}
            Value::String(s) if EMPTY_MARKERS.contains(&s.as_str()) => {}
            Value::Object(children) => {
                cleaned.insert(key.clone(), Value::Object(clean_payload(children)));
            }
            other => {
                cleaned.insert(key.clone(), other.clone());
            }
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(addresses: &[&str]) -> CoreConfig {
        let mut config = CoreConfig::new(addresses.iter().map(|a| a.to_string()).collect(), "t");
        config.call_delay_ms = 0;
        config
    }

    #[test]
    fn test_clean_payload() {
        let record = json!({
            "name": "Main",
            "stream": "",
            "notes": null,
            "backup": "None",
            "priority": 0,
            "paused": false,
            "options": {"host": "null", "port": 5000, "inner": {"x": ""}},
            "tags": [null, ""]
        });
        let cleaned = clean_payload(record.as_object().unwrap());

        assert_eq!(
            Value::Object(cleaned),
            json!({
                "name": "Main",
                "priority": 0,
                "paused": false,
                "options": {"port": 5000, "inner": {}},
                "tags": [null, ""]
            })
        );
    }

    #[test]
    fn test_record_urls() {
        let client = CoreClient::new("https://core:8443/", &config(&[])).unwrap();
        assert_eq!(client.address(), "https://core:8443");
        assert_eq!(
            client.record_url(RecordKind::Source, "e1", None),
            "https://core:8443/api/mwedge/e1/source/"
        );
        assert_eq!(
            client.record_url(RecordKind::Output, "e1", Some("o9")),
            "https://core:8443/api/mwedge/e1/output/o9"
        );
    }

    #[test]
    fn test_edge_display_name() {
        let edges: Vec<EdgeSummary> =
            serde_json::from_value(json!([{"_id": "e1", "name": "Paris"}, {"_id": "e2", "name": ""}]))
                .unwrap();
        assert_eq!(edges[0].display_name(), "Paris");
        assert_eq!(edges[1].display_name(), "e2");
    }

    #[tokio::test]
    async fn test_connect_without_addresses() {
        let err = CoreClient::connect(&config(&[])).await.err().unwrap();
        assert!(err.to_string().contains("No core addresses"));
    }

    #[tokio::test]
    async fn test_connect_unreachable() {
        let err = CoreClient::connect(&config(&["http://127.0.0.1:1"])).await.err().unwrap();
        assert!(matches!(err, RemoteError::Unknown { status: None, .. }));
    }
}
