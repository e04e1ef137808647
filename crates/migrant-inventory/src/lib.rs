mod appx;
mod host;
mod installed;
mod registry;
mod snapshot;

use anyhow::Result;
use migrant_core::{retain_migratable, AppInfo, InstalledApplicationSource};
use tracing::{info, warn};

pub use appx::{parse_appx_json, AppxSource};
pub use host::detect_host;
pub use installed::CatalogInstalledSource;
pub use registry::{app_from_uninstall_values, RegistrySource, UninstallRoot, UninstallValues};
pub use snapshot::InventorySnapshot;

/// Runs every configured source in order and concatenates what they find.
///
/// A source that fails is logged and skipped so one broken enumerator never
/// hides the rest of the inventory.
#[derive(Default)]
pub struct Scanner {
    sources: Vec<Box<dyn InstalledApplicationSource>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub apps: Vec<AppInfo>,
    pub per_source: Vec<(String, usize)>,
    pub failed_sources: Vec<(String, String)>,
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Box<dyn InstalledApplicationSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn add_source(&mut self, source: Box<dyn InstalledApplicationSource>) {
        self.sources.push(source);
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();
        for source in &self.sources {
            match source.list_all() {
                Ok(mut apps) => {
                    retain_migratable(&mut apps);
                    report
                        .per_source
                        .push((source.name().to_string(), apps.len()));
                    report.apps.extend(apps);
                }
                Err(err) => {
                    warn!("inventory source '{}' failed: {err:#}", source.name());
                    report
                        .failed_sources
                        .push((source.name().to_string(), format!("{err:#}")));
                }
            }
        }
        info!(
            "found {} applications across {} sources",
            report.apps.len(),
            self.sources.len()
        );
        report
    }

    /// Like [`Scanner::scan`] but fails when every source failed.
    pub fn scan_all(&self) -> Result<Vec<AppInfo>> {
        let report = self.scan();
        if !self.sources.is_empty() && report.failed_sources.len() == self.sources.len() {
            let reasons = report
                .failed_sources
                .iter()
                .map(|(name, reason)| format!("{name}: {reason}"))
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!("all inventory sources failed: {reasons}");
        }
        Ok(report.apps)
    }
}
