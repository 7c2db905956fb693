//! Engine configuration
//!
//! Loaded from TOML or built in code; every field has a default.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound for any single remote call, in milliseconds
    pub remote_timeout_ms: u64,
    /// Capacity of the notice channel
    pub notice_capacity: usize,
    /// `tracing` filter directive used when `DIVERGENCE_LOG` is unset
    pub log_filter: String,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Run the tree validator after loads and merges
    pub validate_after_merge: bool,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With remote timeout
    #[inline]
    #[must_use]
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With notice channel capacity
    #[inline]
    #[must_use]
    pub fn with_notice_capacity(mut self, capacity: usize) -> Self {
        self.notice_capacity = capacity;
        self
    }

    /// With post-merge validation toggled
    #[inline]
    #[must_use]
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_after_merge = enabled;
        self
    }

    /// Remote timeout as a `Duration`
    #[inline]
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// - `EngineError::Config` on syntax errors, unknown keys or invalid values
    pub fn from_toml_str(text: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// - `EngineError::Config` if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.remote_timeout_ms == 0 {
            return Err(EngineError::Config("remote_timeout_ms must be positive".into()));
        }
        if self.notice_capacity == 0 {
            return Err(EngineError::Config("notice_capacity must be positive".into()));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: 10_000,
            notice_capacity: 256,
            log_filter: "info".to_string(),
            log_json: false,
            validate_after_merge: true,
        }
    }
}
