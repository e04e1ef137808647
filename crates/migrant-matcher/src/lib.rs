mod cache;
mod config;
mod mappings;
mod similarity;

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use anyhow::Result;
use migrant_core::{
    app_keywords, base_app_name, is_valid_package_id, normalize_app_name, AppInfo, CatalogPackage,
    MatchResult, MatchType, PackageCatalog,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};

pub use cache::{SearchCache, DEFAULT_CACHE_CAPACITY};
pub use config::MatchConfig;
pub use mappings::{
    MappingDocument, MappingHit, MappingRecord, MappingTable, CASE_INSENSITIVE_CONFIDENCE,
    CASE_SENSITIVE_CONFIDENCE,
};
pub use similarity::{
    jaro_winkler, levenshtein, levenshtein_similarity, similarity, CONTAINS_SCORE,
};

const FUZZY_SEARCH_LIMIT: usize = 10;
const FUZZY_THRESHOLD: f64 = 0.60;
const SEARCH_THRESHOLD: f64 = 0.50;
const TITLE_WEIGHT: f64 = 0.9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub exact: usize,
    pub fuzzy: usize,
    pub search: usize,
}

impl MatchStats {
    pub fn total(&self) -> usize {
        self.exact + self.fuzzy + self.search
    }

    fn record(&mut self, match_type: MatchType) {
        match match_type {
            MatchType::Exact => self.exact += 1,
            MatchType::Fuzzy => self.fuzzy += 1,
            MatchType::Search => self.search += 1,
            MatchType::Manual | MatchType::None => {}
        }
    }
}

/// Maps inventory entries to catalog package ids.
///
/// Strategies run in a fixed order (exact mapping, fuzzy keyword search, base
/// name search) and the first result that clears `min_confidence` wins. Catalog
/// failures never escape: a strategy whose search errors simply yields nothing.
#[derive(Debug)]
pub struct Matcher {
    config: MatchConfig,
    mappings: MappingTable,
    cache: SearchCache,
    stats: Mutex<MatchStats>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(MatchConfig::default())
    }
}

impl Matcher {
    pub fn new(config: MatchConfig) -> Self {
        Self::with_mappings(config, MappingTable::builtin())
    }

    pub fn with_mappings(config: MatchConfig, mappings: MappingTable) -> Self {
        Self {
            config,
            mappings,
            cache: SearchCache::default(),
            stats: Mutex::new(MatchStats::default()),
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn match_one(
        &self,
        app: &AppInfo,
        catalog: Option<&dyn PackageCatalog>,
    ) -> Option<MatchResult> {
        let result = self
            .try_exact(app, catalog)
            .or_else(|| catalog.and_then(|catalog| self.match_remote(app, catalog)))?;
        self.record(result.match_type);
        Some(result)
    }

    /// Sequential matching; only matched apps appear, in input order.
    pub fn match_many(
        &self,
        apps: &[AppInfo],
        catalog: Option<&dyn PackageCatalog>,
    ) -> Vec<MatchResult> {
        let results = apps
            .iter()
            .filter_map(|app| self.match_one(app, catalog))
            .collect::<Vec<_>>();
        self.log_summary(apps.len(), results.len());
        results
    }

    /// Exact mappings serially, then fuzzy/search spread over `thread_count`
    /// workers. Output order follows `apps`.
    pub fn match_many_parallel(
        &self,
        apps: &[AppInfo],
        catalog: Option<&dyn PackageCatalog>,
    ) -> Vec<MatchResult> {
        let mut slots: Vec<Option<MatchResult>> = Vec::with_capacity(apps.len());
        let mut pending = Vec::new();

        for (index, app) in apps.iter().enumerate() {
            match self.try_exact(app, catalog) {
                Some(result) => {
                    self.record(result.match_type);
                    slots.push(Some(result));
                }
                None => {
                    slots.push(None);
                    pending.push(index);
                }
            }
        }

        debug!(
            "exact phase matched {} of {} apps, {} left for catalog matching",
            apps.len() - pending.len(),
            apps.len(),
            pending.len()
        );

        if let Some(catalog) = catalog.filter(|_| !pending.is_empty()) {
            for (index, result) in self.fan_out(apps, &pending, catalog) {
                if let Some(result) = result {
                    self.record(result.match_type);
                    slots[index] = Some(result);
                }
            }
        }

        let results = slots.into_iter().flatten().collect::<Vec<_>>();
        self.log_summary(apps.len(), results.len());
        results
    }

    /// Dispatches to the parallel or sequential path per `config.parallel`.
    pub fn match_all(
        &self,
        apps: &[AppInfo],
        catalog: Option<&dyn PackageCatalog>,
    ) -> Vec<MatchResult> {
        if self.config.parallel {
            self.match_many_parallel(apps, catalog)
        } else {
            self.match_many(apps, catalog)
        }
    }

    pub fn stats(&self) -> MatchStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn exact_match_count(&self) -> usize {
        self.stats().exact
    }

    pub fn fuzzy_match_count(&self) -> usize {
        self.stats().fuzzy
    }

    pub fn search_match_count(&self) -> usize {
        self.stats().search
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.count()
    }

    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    pub fn add_mapping(&mut self, app_name: &str, package_id: &str) -> bool {
        self.mappings.add(app_name, package_id)
    }

    pub fn remove_mapping(&mut self, app_name: &str) -> bool {
        self.mappings.remove(app_name)
    }

    pub fn has_mapping(&self, app_name: &str) -> bool {
        self.mappings.has(app_name)
    }

    pub fn get_mapping(&self, app_name: &str) -> Option<&str> {
        self.mappings.get(app_name)
    }

    pub fn import_mappings(&mut self, path: &Path) -> Result<usize> {
        let imported = self.mappings.import_file(path)?;
        info!("imported {imported} mappings from {}", path.display());
        Ok(imported)
    }

    pub fn export_mappings(&self, path: &Path) -> Result<()> {
        self.mappings.export_file(path)
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn fan_out(
        &self,
        apps: &[AppInfo],
        pending: &[usize],
        catalog: &dyn PackageCatalog,
    ) -> Vec<(usize, Option<MatchResult>)> {
        let remote = |index: usize| (index, self.match_remote(&apps[index], catalog));

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.thread_count.max(1))
            .build()
        {
            Ok(pool) => pool.install(|| pending.par_iter().map(|&index| remote(index)).collect()),
            Err(err) => {
                warn!("failed to build matcher thread pool, matching sequentially: {err}");
                pending.iter().map(|&index| remote(index)).collect()
            }
        }
    }

    fn match_remote(&self, app: &AppInfo, catalog: &dyn PackageCatalog) -> Option<MatchResult> {
        self.try_fuzzy(app, catalog)
            .or_else(|| self.try_search(app, catalog))
    }

    fn try_exact(
        &self,
        app: &AppInfo,
        catalog: Option<&dyn PackageCatalog>,
    ) -> Option<MatchResult> {
        if !self.config.use_exact_mappings {
            return None;
        }
        let hit = self.mappings.lookup(&app.name)?;

        let mut available = None;
        if self.config.verify_availability {
            if let Some(catalog) = catalog {
                if !catalog.is_available(&hit.package_id) {
                    debug!(
                        "mapping '{}' -> '{}' is not available in the catalog",
                        hit.key, hit.package_id
                    );
                    return None;
                }
                available = Some(true);
            }
        }

        self.accept(MatchResult {
            app_name: app.name.clone(),
            matched_name: hit.key,
            catalog_package_id: hit.package_id,
            confidence: hit.confidence,
            match_type: MatchType::Exact,
            available,
            catalog_version: None,
        })
    }

    fn try_fuzzy(&self, app: &AppInfo, catalog: &dyn PackageCatalog) -> Option<MatchResult> {
        if !self.config.use_fuzzy_matching {
            return None;
        }
        let normalized = normalize_app_name(&app.name);

        let mut best: Option<(f64, CatalogPackage)> = None;
        for keyword in app_keywords(&app.name) {
            let candidates = self.cached_search(catalog, &keyword)?;
            for candidate in candidates {
                let score = similarity(&normalized, &candidate.id);
                if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
                    best = Some((score, candidate));
                }
            }
        }

        let (score, package) = best?;
        if score < FUZZY_THRESHOLD {
            return None;
        }
        self.accept(catalog_result(app, package, score, MatchType::Fuzzy))
    }

    fn try_search(&self, app: &AppInfo, catalog: &dyn PackageCatalog) -> Option<MatchResult> {
        if !self.config.use_catalog_search {
            return None;
        }
        let base = base_app_name(&app.name);
        if base.is_empty() {
            return None;
        }

        let packages = match catalog.search(&base, self.config.max_search_results) {
            Ok(packages) => packages,
            Err(err) => {
                debug!("catalog search for '{base}' failed: {err}");
                return None;
            }
        };

        let mut best: Option<(f64, CatalogPackage)> = None;
        for package in packages {
            let id_score = similarity(&base, &package.id);
            let title_score = TITLE_WEIGHT * similarity(&base, &package.title);
            let score = id_score.max(title_score);
            if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
                best = Some((score, package));
            }
        }

        let (score, package) = best?;
        if score < SEARCH_THRESHOLD {
            return None;
        }
        self.accept(catalog_result(app, package, score, MatchType::Search))
    }

    /// `None` means the search failed; an empty list is a real answer.
    fn cached_search(
        &self,
        catalog: &dyn PackageCatalog,
        keyword: &str,
    ) -> Option<Vec<CatalogPackage>> {
        if self.config.use_cache {
            if let Some(hit) = self.cache.get(keyword) {
                debug!("search cache hit for '{keyword}'");
                return Some(hit);
            }
            debug!("search cache miss for '{keyword}'");
        }

        match catalog.search(keyword, FUZZY_SEARCH_LIMIT) {
            Ok(packages) => {
                if self.config.use_cache {
                    self.cache.insert(keyword, packages.clone());
                }
                Some(packages)
            }
            Err(err) => {
                debug!("catalog search for '{keyword}' failed: {err}");
                None
            }
        }
    }

    fn accept(&self, result: MatchResult) -> Option<MatchResult> {
        if !is_valid_package_id(&result.catalog_package_id) {
            debug!(
                "discarding {} match for '{}': invalid package id '{}'",
                result.match_type.as_str(),
                result.app_name,
                result.catalog_package_id
            );
            return None;
        }
        (result.confidence >= self.config.min_confidence).then_some(result)
    }

    fn record(&self, match_type: MatchType) {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(match_type);
    }

    fn log_summary(&self, total: usize, matched: usize) {
        let stats = self.stats();
        info!(
            "matched {matched}/{total} applications (exact {}, fuzzy {}, search {})",
            stats.exact, stats.fuzzy, stats.search
        );
    }
}

fn catalog_result(
    app: &AppInfo,
    package: CatalogPackage,
    score: f64,
    match_type: MatchType,
) -> MatchResult {
    let catalog_version = Some(package.version).filter(|version| !version.is_empty());
    MatchResult {
        app_name: app.name.clone(),
        matched_name: package.title,
        catalog_package_id: package.id,
        confidence: score.clamp(0.0, 1.0),
        match_type,
        available: Some(true),
        catalog_version,
    }
}
