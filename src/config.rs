//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! data_dir = "/var/lib/histograph"
//! seed_path = "seed.json"
//! history_depth = 50
//! metrics_timeout_secs = 15
//!
//! [metrics]
//! damping = 0.85
//! exact_betweenness_limit = 1500
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::analytics::MetricsConfig;
use crate::history::DEFAULT_HISTORY_DEPTH;
use crate::patch::{GraphPatch, ReconcileOptions};

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory of the durable store. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// JSON graph patch applied when the store is empty or from an older schema.
    pub seed_path: Option<PathBuf>,
    /// Undo steps kept.
    pub history_depth: usize,
    /// Hard bound on one metrics recomputation.
    pub metrics_timeout_secs: u64,
    /// Consecutive failed recomputations before metrics become unavailable.
    pub max_metric_restarts: usize,
    pub persist_history: bool,
    /// Fold new patch nodes onto existing nodes with an identical label.
    pub resolve_exact_labels: bool,
    pub metrics: MetricsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            seed_path: None,
            history_depth: DEFAULT_HISTORY_DEPTH,
            metrics_timeout_secs: 15,
            max_metric_restarts: 3,
            persist_history: true,
            resolve_exact_labels: true,
            metrics: MetricsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// In-memory engine with default settings.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Default settings persisting under `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.metrics_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "metrics_timeout_secs must be at least 1".into(),
            });
        }
        let damping = self.metrics.damping;
        if !(damping > 0.0 && damping < 1.0) {
            return Err(ConfigError::Invalid {
                message: format!("metrics.damping must be in (0, 1), got {damping}"),
            });
        }
        Ok(())
    }

    pub fn metrics_timeout(&self) -> Duration {
        Duration::from_secs(self.metrics_timeout_secs)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            resolve_exact_labels: self.resolve_exact_labels,
        }
    }

    /// Read the seed patch, if one is configured.
    pub fn load_seed(&self) -> ConfigResult<Option<GraphPatch>> {
        let Some(path) = &self.seed_path else {
            return Ok(None);
        };
        let seed_error = |message: String| ConfigError::Seed {
            path: path.display().to_string(),
            message,
        };
        let text = std::fs::read_to_string(path).map_err(|e| seed_error(e.to_string()))?;
        let patch = GraphPatch::from_json_lenient(&text).map_err(|e| seed_error(e.to_string()))?;
        Ok(Some(patch))
    }
}
