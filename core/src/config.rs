//! Facade configuration, loadable from JSON.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

fn default_start_tasks_immediately() -> bool {
    true
}

/// Settings for a `ServiceFacade`.
///
/// ```json
/// { "base_url": "https://api.example.com/v1/", "start_tasks_immediately": false,
///   "default_headers": { "Accept": "application/json" }, "timeout_secs": 30 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
    pub base_url: String,
    #[serde(default = "default_start_tasks_immediately")]
    pub start_tasks_immediately: bool,
    /// Added to every request after the built-in defaults.
    #[serde(default)]
    pub default_headers: BTreeMap<String, String>,
    /// Only used when the facade builds its own `NetworkTransport`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ServiceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            start_tasks_immediately: default_start_tasks_immediately(),
            default_headers: BTreeMap::new(),
            timeout_secs: None,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
