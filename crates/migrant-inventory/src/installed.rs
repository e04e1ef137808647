use std::sync::Arc;

use anyhow::{Context, Result};
use migrant_core::{
    retain_migratable, AppInfo, AppOrigin, InstalledApplicationSource, PackageCatalog,
};
use tracing::info;

/// Packages the catalog itself reports as installed locally.
pub struct CatalogInstalledSource {
    catalog: Arc<dyn PackageCatalog>,
}

impl CatalogInstalledSource {
    pub fn new(catalog: Arc<dyn PackageCatalog>) -> Self {
        Self { catalog }
    }
}

impl InstalledApplicationSource for CatalogInstalledSource {
    fn name(&self) -> &str {
        "catalog"
    }

    fn list_all(&self) -> Result<Vec<AppInfo>> {
        let packages = self
            .catalog
            .installed_packages()
            .context("failed to list catalog-installed packages")?;

        let mut apps = packages
            .into_iter()
            .map(|package| {
                let mut app = AppInfo::new(package.title.clone(), AppOrigin::Catalog)
                    .with_version(package.version);
                app.registry_key = format!("choco:{}", package.id);
                app
            })
            .collect::<Vec<_>>();
        retain_migratable(&mut apps);
        info!("found {} catalog-installed packages", apps.len());
        Ok(apps)
    }
}
