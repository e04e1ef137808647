use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use migrant_installer::RetryPolicy;
use migrant_matcher::MatchConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

const CONFIG_FILE_NAME: &str = "config.toml";
const MAPPINGS_FILE_NAME: &str = "mappings.json";
const DEFAULT_PLAN_FILE_NAME: &str = "plan.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct MigrantConfig {
    pub(crate) catalog: CatalogConfig,
    pub(crate) matcher: MatchConfig,
    pub(crate) worker: WorkerConfig,
    pub(crate) mappings: MappingsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CatalogConfig {
    /// Portable catalog directory holding `choco.exe`.
    pub(crate) root: Option<PathBuf>,
    pub(crate) default_timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root: None,
            default_timeout_secs: 300,
        }
    }
}

impl CatalogConfig {
    pub(crate) fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct WorkerConfig {
    pub(crate) max_concurrent: usize,
    pub(crate) max_retries: u32,
    pub(crate) base_retry_delay_ms: u64,
    pub(crate) retry_multiplier: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            max_retries: 3,
            base_retry_delay_ms: 5000,
            retry_multiplier: 2,
        }
    }
}

impl WorkerConfig {
    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        if self.max_retries > RetryPolicy::MAX_RETRIES {
            warn!(
                "worker.max_retries = {} exceeds the limit, using {}",
                self.max_retries,
                RetryPolicy::MAX_RETRIES
            );
        }
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_retry_delay_ms),
            multiplier: self.retry_multiplier,
        }
        .capped()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct MappingsConfig {
    /// Extra mapping file merged over the stored table at startup.
    pub(crate) file: Option<PathBuf>,
}

impl MigrantConfig {
    /// A missing file is not an error; it just means defaults.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse config: {}", path.display()))
    }

    pub(crate) fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid migrant configuration")
    }
}

/// Where migrant keeps its own files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StateLayout {
    prefix: PathBuf,
}

impl StateLayout {
    pub(crate) fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub(crate) fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub(crate) fn config_path(&self) -> PathBuf {
        self.prefix.join(CONFIG_FILE_NAME)
    }

    pub(crate) fn mappings_path(&self) -> PathBuf {
        self.prefix.join(MAPPINGS_FILE_NAME)
    }

    pub(crate) fn plans_dir(&self) -> PathBuf {
        self.prefix.join("plans")
    }

    pub(crate) fn snapshots_dir(&self) -> PathBuf {
        self.prefix.join("snapshots")
    }

    pub(crate) fn default_plan_path(&self) -> PathBuf {
        self.plans_dir().join(DEFAULT_PLAN_FILE_NAME)
    }

    pub(crate) fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.prefix.clone(), self.plans_dir(), self.snapshots_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub(crate) fn default_state_prefix() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows state prefix")?;
        return Ok(PathBuf::from(app_data).join("Migrant"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve state prefix")?;
    Ok(PathBuf::from(home).join(".migrant"))
}
