use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use migrant_core::{AppInfo, Clock, HostInfo, PackageCatalog, SystemClock};
use migrant_installer::{ChannelObserver, ChocoCatalog, InstallWorker, SharedPlan, WorkerEvent};
use migrant_inventory::{
    detect_host, AppxSource, CatalogInstalledSource, InventorySnapshot, RegistrySource,
    ScanReport, Scanner,
};
use migrant_matcher::{MappingTable, Matcher};
use migrant_plan::MigrationPlan;
use tracing::{info, warn};

use crate::config::{MigrantConfig, StateLayout};

/// Which inventory sources a scan should consult.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SourceSelection {
    pub(crate) from_snapshot: Option<PathBuf>,
    pub(crate) skip_registry: bool,
    pub(crate) skip_store: bool,
    pub(crate) skip_catalog: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Inventory {
    pub(crate) host: HostInfo,
    pub(crate) report: ScanReport,
}

/// Wires configuration, state files and the library crates into the
/// scan, match, plan and install pipeline.
pub(crate) struct Orchestrator {
    config: MigrantConfig,
    layout: StateLayout,
    catalog_root: Option<PathBuf>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub(crate) fn new(
        config: MigrantConfig,
        layout: StateLayout,
        catalog_root_override: Option<PathBuf>,
    ) -> Self {
        let catalog_root = catalog_root_override.or_else(|| config.catalog.root.clone());
        Self {
            config,
            layout,
            catalog_root,
            clock: Arc::new(SystemClock),
        }
    }

    pub(crate) fn config(&self) -> &MigrantConfig {
        &self.config
    }

    pub(crate) fn layout(&self) -> &StateLayout {
        &self.layout
    }

    pub(crate) fn catalog_root(&self) -> Option<&Path> {
        self.catalog_root.as_deref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn open_catalog(&self) -> Result<Arc<ChocoCatalog>> {
        let root = self.catalog_root.as_ref().ok_or_else(|| {
            anyhow!("no catalog root configured; set [catalog] root or pass --catalog-root")
        })?;
        let catalog = ChocoCatalog::open(root)?
            .with_default_timeout(self.config.catalog.default_timeout());
        Ok(Arc::new(catalog))
    }

    /// Matching still works without a catalog, just with mappings alone.
    pub(crate) fn try_open_catalog(&self) -> Option<Arc<ChocoCatalog>> {
        if self.catalog_root.is_none() {
            info!("no catalog root configured, matching with mappings only");
            return None;
        }
        match self.open_catalog() {
            Ok(catalog) => Some(catalog),
            Err(err) => {
                warn!("catalog unavailable, matching with mappings only: {err:#}");
                None
            }
        }
    }

    /// The stored table replaces the built-ins once it exists, so removals
    /// of built-in mappings stick.
    pub(crate) fn load_mappings(&self) -> Result<MappingTable> {
        let path = self.layout.mappings_path();
        if !path.exists() {
            return Ok(MappingTable::builtin());
        }
        let mut table = MappingTable::new();
        table.import_file(&path)?;
        Ok(table)
    }

    pub(crate) fn save_mappings(&self, table: &MappingTable) -> Result<()> {
        table.export_file(&self.layout.mappings_path())
    }

    pub(crate) fn matcher(&self, sequential: bool) -> Result<Matcher> {
        let mut config = self.config.matcher.clone();
        if sequential {
            config.parallel = false;
        }
        let mut matcher = Matcher::with_mappings(config, self.load_mappings()?);
        if let Some(file) = &self.config.mappings.file {
            let context = || format!("failed to load configured mappings: {}", file.display());
            matcher.import_mappings(file).with_context(context)?;
        }
        Ok(matcher)
    }

    pub(crate) fn scan(
        &self,
        selection: &SourceSelection,
        catalog: Option<Arc<dyn PackageCatalog>>,
    ) -> Result<Inventory> {
        if let Some(path) = &selection.from_snapshot {
            let snapshot = InventorySnapshot::load(path)?;
            let apps = snapshot.migratable_apps();
            info!("loaded {} applications from {}", apps.len(), path.display());
            return Ok(Inventory {
                host: snapshot.host,
                report: ScanReport {
                    per_source: vec![("snapshot".to_string(), apps.len())],
                    apps,
                    failed_sources: Vec::new(),
                },
            });
        }

        let mut scanner = Scanner::new();
        if !selection.skip_registry {
            scanner.add_source(Box::new(RegistrySource::default()));
        }
        if !selection.skip_store {
            scanner.add_source(Box::new(AppxSource::default()));
        }
        if let Some(catalog) = catalog.filter(|_| !selection.skip_catalog) {
            scanner.add_source(Box::new(CatalogInstalledSource::new(catalog)));
        }

        Ok(Inventory {
            host: detect_host(),
            report: scanner.scan(),
        })
    }

    pub(crate) fn write_snapshot(&self, inventory: &Inventory, path: &Path) -> Result<()> {
        InventorySnapshot::capture(
            inventory.host.clone(),
            self.clock(),
            inventory.report.apps.clone(),
        )
        .write(path)
    }

    pub(crate) fn build_plan(
        &self,
        host: &HostInfo,
        apps: &[AppInfo],
        matcher: &Matcher,
        catalog: Option<&dyn PackageCatalog>,
    ) -> MigrationPlan {
        let matches = matcher.match_all(apps, catalog);
        let mut plan = MigrationPlan::new(host, self.clock());
        plan.generate(apps, &matches, self.clock());
        plan
    }

    /// Starts the worker; the receiver yields its events until completion.
    pub(crate) fn start_install(
        &self,
        plan: SharedPlan,
        catalog: Arc<dyn PackageCatalog>,
        max_concurrent: Option<usize>,
    ) -> (InstallWorker, usize, Receiver<WorkerEvent>) {
        let (observer, events) = ChannelObserver::channel();
        let worker = InstallWorker::builder(catalog)
            .observer(Arc::new(observer))
            .clock(self.clock.clone())
            .retry_policy(self.config.worker.retry_policy())
            .build();
        let started = worker.start(
            plan,
            max_concurrent.unwrap_or(self.config.worker.max_concurrent),
        );
        (worker, started, events)
    }
}
