use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use migrant_core::{retain_migratable, AppInfo, Clock, HostInfo};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A saved inventory, so a plan can be built away from the scanned machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventorySnapshot {
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub host: HostInfo,
    #[serde(default)]
    pub apps: Vec<AppInfo>,
}

impl InventorySnapshot {
    pub fn capture(host: HostInfo, clock: &dyn Clock, apps: Vec<AppInfo>) -> Self {
        Self {
            captured_at: clock.now(),
            host,
            apps,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read inventory snapshot: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse inventory snapshot: {}", path.display()))
    }

    /// The captured apps minus updates and system components.
    pub fn migratable_apps(&self) -> Vec<AppInfo> {
        let mut apps = self.apps.clone();
        retain_migratable(&mut apps);
        apps
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let rendered =
            serde_json::to_string_pretty(self).context("failed to serialize inventory snapshot")?;
        fs::write(path, rendered)
            .with_context(|| format!("failed to write inventory snapshot: {}", path.display()))?;
        info!(
            "wrote inventory snapshot with {} apps to {}",
            self.apps.len(),
            path.display()
        );
        Ok(())
    }
}
