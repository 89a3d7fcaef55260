//! skiff.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{RecreateOrder, ScaleDownPolicy};

/// File name looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "skiff.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkiffConfig {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Path to the cluster state file used by the local cluster backend.
    pub state: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Containers recreated per rolling batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Concurrent operations outside rolling batches.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
    #[serde(default)]
    pub scale_down: ScaleDownPolicy,
    #[serde(default)]
    pub recreate_order: RecreateOrder,
    /// Scale-down removals allowed before a plan asks for explicit approval.
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: u32,
}

fn default_batch_size() -> u32 {
    1
}

fn default_max_concurrency() -> usize {
    4
}

fn default_stop_timeout_secs() -> u64 {
    10
}

fn default_approval_threshold() -> u32 {
    1
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
            stop_timeout_secs: default_stop_timeout_secs(),
            scale_down: ScaleDownPolicy::default(),
            recreate_order: RecreateOrder::default(),
            approval_threshold: default_approval_threshold(),
        }
    }
}

impl DeployConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl SkiffConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SkiffConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load `path` if given, else `skiff.toml` in `dir` if it exists, else defaults.
    pub fn load(path: Option<&Path>, dir: &Path) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        let fallback = dir.join(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            Self::from_file(&fallback)
        } else {
            Ok(Self::default())
        }
    }
}
