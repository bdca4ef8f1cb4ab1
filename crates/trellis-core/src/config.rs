use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};

/// Exponential backoff bounds for per-node retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryBackoff {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-run cap on how often any single node may execute. Self-correction
    /// cycles are legitimate; unbounded ones are a routing bug.
    #[serde(default = "default_max_node_visits")]
    pub max_node_visits: u32,

    #[serde(default)]
    pub retry: RetryBackoff,

    /// Destination for privileged nodes blocked by the quarantine gate.
    /// When unset, a blocked privileged node aborts the run.
    #[serde(default)]
    pub quarantine_node: Option<String>,
}

fn default_max_node_visits() -> u32 {
    25
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_node_visits: default_max_node_visits(),
            retry: RetryBackoff::default(),
            quarantine_node: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| TrellisError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_node_visits, 25);
        assert_eq!(cfg.retry.initial_backoff_ms, 1_000);
        assert!(cfg.quarantine_node.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            quarantine_node = "containment"

            [retry]
            initial_backoff_ms = 50
            "#,
        )
        .unwrap();
        assert_eq!(cfg.quarantine_node.as_deref(), Some("containment"));
        assert_eq!(cfg.retry.initial_backoff_ms, 50);
        assert_eq!(cfg.retry.max_backoff_ms, 30_000);
        assert_eq!(cfg.max_node_visits, 25);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("max_node_visits = \"lots\"").unwrap_err();
        assert!(matches!(err, TrellisError::Config(_)));
    }
}
