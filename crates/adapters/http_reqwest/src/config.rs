//! HTTP backend configuration.

use std::time::Duration;

use serde::Deserialize;

/// Where and how to reach the REST backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL every resource path is appended to (e.g. `https://api.example.com/v1`).
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Bearer token sent as `Authorization`, if any.
    pub token: Option<String>,
}

impl HttpConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_secs: 30,
            token: None,
        }
    }
}
