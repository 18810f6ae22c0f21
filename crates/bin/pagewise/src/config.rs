//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `pagewise.toml` in the working directory unless a path is
//! given. Every field has a default so the file is optional. Environment
//! variables take precedence over file values.

use std::path::Path;

use serde::Deserialize;

use pagewise_adapter_http_reqwest::HttpConfig;
use pagewise_domain::page::{DEFAULT_PAGE_LIMIT, PageSize};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pagewise.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST backend settings.
    pub backend: HttpConfig,
    /// Pagination defaults.
    pub pagination: PaginationConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Pagination defaults applied when a command does not override them.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Items requested per page.
    pub page_size: u32,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `path` (or `pagewise.toml`), then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the resulting values are invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE)))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Apply overrides looked up through `var` (the process environment
    /// in [`load`](Self::load)).
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("PAGEWISE_BASE_URL") {
            self.backend.base_url = val;
        }
        if let Some(secs) = var("PAGEWISE_TIMEOUT_SECS").and_then(|val| val.parse().ok()) {
            self.backend.timeout_secs = secs;
        }
        if let Some(val) = var("PAGEWISE_TOKEN") {
            self.backend.token = Some(val);
        }
        if let Some(size) = var("PAGEWISE_PAGE_SIZE").and_then(|val| val.parse().ok()) {
            self.pagination.page_size = size;
        }
        if let Some(val) = var("PAGEWISE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("base_url must not be empty".to_string()));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::Validation("timeout_secs must be non-zero".to_string()));
        }
        if self.pagination.page_size == 0 {
            return Err(ConfigError::Validation("page_size must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Configured page size, falling back to the default when invalid.
    #[must_use]
    pub fn page_size(&self) -> PageSize {
        PageSize::new(self.pagination.page_size).unwrap_or_default()
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "pagewise=info,pagewise_app=info,pagewise_adapter_http_reqwest=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
