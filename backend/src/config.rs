//! Run configuration.
//!
//! - [`ReconciliationConfig`] - knobs of one import batch, passed explicitly
//! - [`CoreConfig`] - how to reach the tx cores, read from the environment

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default delay after every remote call.
pub const DEFAULT_CALL_DELAY_MS: u64 = 10;

/// Default number of failure messages kept in a batch summary.
pub const DEFAULT_MAX_FAILURE_MESSAGES: usize = 10;

/// Options for one import batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconciliationConfig {
    /// Minimum time between two dispatched rows, in milliseconds.
    pub call_delay_ms: u64,
    /// Cast declared fields and check them against the kind's schema.
    pub validate: bool,
    /// Stop the batch after the first failed row.
    pub fail_fast: bool,
    /// How many failure descriptions the summary keeps.
    pub max_failure_messages: usize,
    /// Append failure lines to this file.
    pub log_file: Option<PathBuf>,
    /// Edge used for rows with a blank `mwedge` cell.
    pub default_edge: Option<String>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            call_delay_ms: DEFAULT_CALL_DELAY_MS,
            validate: true,
            fail_fast: false,
            max_failure_messages: DEFAULT_MAX_FAILURE_MESSAGES,
            log_file: None,
            default_edge: None,
        }
    }
}

impl ReconciliationConfig {
    pub fn call_delay(&self) -> Duration {
        Duration::from_millis(self.call_delay_ms)
    }

    pub fn with_default_edge(mut self, edge: impl Into<String>) -> Self {
        self.default_edge = Some(edge.into());
        self
    }
}

/// Connection settings for the tx cores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Core addresses, tried in order.
    pub addresses: Vec<String>,
    /// Bearer token.
    #[serde(skip_serializing)]
    pub token: String,
    /// Verify TLS certificates.
    pub verify_https: bool,
    /// Pause after every call, in milliseconds.
    pub call_delay_ms: u64,
}

impl CoreConfig {
    pub fn new(addresses: Vec<String>, token: impl Into<String>) -> Self {
        Self {
            addresses,
            token: token.into(),
            verify_https: true,
            call_delay_ms: DEFAULT_CALL_DELAY_MS,
        }
    }

    /// Load from `TXCORE_ADDRESSES`, `TXCORE_TOKEN`, `TXCORE_VERIFY_HTTPS`
    /// and `TXCORE_CALL_DELAY_MS`, after reading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as [`CoreConfig::from_env`] with an explicit lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addresses = lookup("TXCORE_ADDRESSES")
            .map(|raw| parse_addresses(&raw))
            .unwrap_or_default();
        if addresses.is_empty() {
            return Err(ConfigError::MissingVar("TXCORE_ADDRESSES".to_string()));
        }

        let token = lookup("TXCORE_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("TXCORE_TOKEN".to_string()))?;

        let verify_https = match lookup("TXCORE_VERIFY_HTTPS") {
            Some(raw) => crate::transform::parse_bool_loose(&raw).ok_or_else(|| {
                ConfigError::Invalid {
                    var: "TXCORE_VERIFY_HTTPS".to_string(),
                    message: format!("'{}' is not a boolean", raw),
                }
            })?,
            None => true,
        };

        let call_delay_ms = match lookup("TXCORE_CALL_DELAY_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                var: "TXCORE_CALL_DELAY_MS".to_string(),
                message: format!("{}", e),
            })?,
            None => DEFAULT_CALL_DELAY_MS,
        };

        Ok(Self {
            addresses,
            token: token.trim().to_string(),
            verify_https,
            call_delay_ms,
        })
    }

    pub fn call_delay(&self) -> Duration {
        Duration::from_millis(self.call_delay_ms)
    }
}

/// Split a comma-separated address list.
pub fn parse_addresses(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}
