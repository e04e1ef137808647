mod entry;
mod export;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use migrant_core::{
    is_valid_version, normalize_app_name, AppInfo, Clock, EntryStatus, HostInfo, MatchResult,
    MatchType,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use entry::{
    format_timestamp, PlanEntry, PlanMetadata, AUTO_SELECT_CONFIDENCE, PLAN_SCHEMA_VERSION,
};
pub use export::{escape_html, CSV_HEADER};

/// The migration plan: every scanned application, its proposed package, the
/// operator's selections and the installer's progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MigrationPlan {
    #[serde(default)]
    metadata: PlanMetadata,
    #[serde(default)]
    entries: Vec<PlanEntry>,
}

impl MigrationPlan {
    pub fn new(host: &HostInfo, clock: &dyn Clock) -> Self {
        Self {
            metadata: PlanMetadata {
                source_machine: host.machine_name.clone(),
                source_os: host.os_name.clone(),
                source_os_version: host.os_version.clone(),
                created_by: host.user_name.clone(),
                created_at: Some(clock.now()),
                report_schema_version: PLAN_SCHEMA_VERSION.to_string(),
                ..PlanMetadata::default()
            },
            entries: Vec::new(),
        }
    }

    /// Replaces all entries with one row per app joined to its match.
    pub fn generate(&mut self, apps: &[AppInfo], matches: &[MatchResult], clock: &dyn Clock) {
        let by_app = matches
            .iter()
            .map(|matched| (matched.app_name.as_str(), matched))
            .collect::<HashMap<_, _>>();
        // A title only stands in for a match whose own app is not in the inventory.
        let app_names = apps
            .iter()
            .map(|app| app.name.as_str())
            .collect::<HashSet<_>>();
        let mut by_title: HashMap<&str, &MatchResult> = HashMap::new();
        for matched in matches
            .iter()
            .filter(|matched| !app_names.contains(matched.app_name.as_str()))
        {
            by_title
                .entry(matched.matched_name.as_str())
                .or_insert(matched);
        }
        let lookup = |key: &str| by_app.get(key).or_else(|| by_title.get(key)).copied();

        self.entries = apps
            .iter()
            .map(|app| {
                let normalized = normalize_app_name(&app.name);
                let found = lookup(&app.name).or_else(|| lookup(&normalized));
                PlanEntry::from_app(app, found)
            })
            .collect();

        self.metadata.created_at = Some(clock.now());
        self.refresh_counters();
        info!(
            "generated migration plan: {} apps, {} matched, {} selected",
            self.metadata.total_apps, self.metadata.matched_apps, self.metadata.selected_apps
        );
    }

    pub fn metadata(&self) -> &PlanMetadata {
        &self.metadata
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&PlanEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn select_all(&mut self) {
        for entry in &mut self.entries {
            entry.selected = entry.is_matched();
        }
        self.refresh_counters();
    }

    pub fn deselect_all(&mut self) {
        for entry in &mut self.entries {
            entry.selected = false;
        }
        self.refresh_counters();
    }

    /// Additive: entries of other types keep their selection.
    pub fn select_by_match_type(&mut self, match_type: MatchType) {
        for entry in &mut self.entries {
            if entry.match_type == match_type && entry.is_matched() {
                entry.selected = true;
            }
        }
        self.refresh_counters();
    }

    /// Replacing: entries below `min_confidence` are deselected.
    pub fn select_by_confidence(&mut self, min_confidence: f64) {
        for entry in &mut self.entries {
            entry.selected = entry.is_matched() && entry.confidence >= min_confidence;
        }
        self.refresh_counters();
    }

    pub fn select_entry(&mut self, index: usize, selected: bool) -> Result<()> {
        let entry = self.entry_mut(index)?;
        if selected && !entry.is_matched() {
            bail!(
                "entry {index} ('{}') has no package and cannot be selected",
                entry.app_name
            );
        }
        entry.selected = selected;
        self.refresh_counters();
        Ok(())
    }

    pub fn update_entry(&mut self, index: usize, mut entry: PlanEntry) -> Result<()> {
        validate_lock(&entry)?;
        entry.enforce_match_invariants();
        *self.entry_mut(index)? = entry;
        self.refresh_counters();
        Ok(())
    }

    pub fn add_entry(&mut self, mut entry: PlanEntry) -> Result<usize> {
        validate_lock(&entry)?;
        entry.enforce_match_invariants();
        self.entries.push(entry);
        self.refresh_counters();
        Ok(self.entries.len() - 1)
    }

    pub fn remove_entry(&mut self, index: usize) -> Result<PlanEntry> {
        if index >= self.entries.len() {
            bail!("entry index {index} out of range (plan has {} entries)", self.entries.len());
        }
        let removed = self.entries.remove(index);
        self.refresh_counters();
        Ok(removed)
    }

    /// Pins an entry to `version`, or releases the pin with `None`.
    pub fn set_version_lock(&mut self, index: usize, version: Option<&str>) -> Result<()> {
        let entry = self.entry_mut(index)?;
        match version.map(str::trim) {
            Some(version) => {
                if !is_valid_version(version) {
                    bail!("invalid locked version '{version}' for entry {index}");
                }
                entry.version_lock = true;
                entry.locked_version = version.to_string();
            }
            None => {
                entry.version_lock = false;
                entry.locked_version.clear();
            }
        }
        Ok(())
    }

    /// Execution write-back used by the installer.
    pub fn record_status(
        &mut self,
        index: usize,
        status: EntryStatus,
        error_message: &str,
        executed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let entry = self.entry_mut(index)?;
        entry.status = status;
        entry.error_message = error_message.to_string();
        if executed_at.is_some() {
            entry.executed_at = executed_at;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.refresh_counters();
    }

    pub fn matched_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.is_matched())
            .count()
    }

    pub fn unmatched_count(&self) -> usize {
        self.entries.len() - self.matched_count()
    }

    pub fn selected_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.selected).count()
    }

    pub fn match_rate(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.matched_count() as f64 / self.entries.len() as f64
    }

    pub fn match_type_distribution(&self) -> BTreeMap<MatchType, usize> {
        let mut distribution = BTreeMap::new();
        for entry in &self.entries {
            *distribution.entry(entry.match_type).or_insert(0) += 1;
        }
        distribution
    }

    pub fn selected_entries(&self) -> Vec<(usize, &PlanEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.selected)
            .collect()
    }

    pub fn unmatched_entries(&self) -> Vec<(usize, &PlanEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.is_matched())
            .collect()
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize migration plan")
    }

    /// Parses a plan document. Unknown fields are ignored and missing ones
    /// default; a different schema version is kept and only warned about.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let mut plan: Self =
            serde_json::from_str(content).context("failed to parse migration plan JSON")?;

        if plan.metadata.report_schema_version != PLAN_SCHEMA_VERSION {
            warn!(
                "plan schema version '{}' differs from supported '{PLAN_SCHEMA_VERSION}'",
                plan.metadata.report_schema_version
            );
        }

        for (index, entry) in plan.entries.iter_mut().enumerate() {
            if validate_lock(entry).is_err() {
                warn!(
                    "dropping invalid version lock '{}' on entry {index}",
                    entry.locked_version
                );
                entry.version_lock = false;
            }
            entry.enforce_match_invariants();
        }
        plan.refresh_counters();
        Ok(plan)
    }

    pub fn export_json(&self, path: &Path) -> Result<()> {
        write_output(path, &self.to_json_string()?)?;
        info!("exported plan JSON to {}", path.display());
        Ok(())
    }

    /// Replaces this plan with the file's contents; on error nothing changes.
    pub fn import_json(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read plan file: {}", path.display()))?;
        let plan = Self::from_json_str(&content)
            .with_context(|| format!("failed to import plan: {}", path.display()))?;
        *self = plan;
        info!(
            "imported plan with {} entries from {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut plan = Self::default();
        plan.import_json(path)?;
        Ok(plan)
    }

    pub fn to_csv_string(&self) -> Result<String> {
        export::render_csv(self)
    }

    pub fn export_csv(&self, path: &Path) -> Result<()> {
        write_output(path, &self.to_csv_string()?)?;
        info!("exported plan CSV to {}", path.display());
        Ok(())
    }

    pub fn to_html_string(&self) -> String {
        export::render_html(self)
    }

    pub fn export_html(&self, path: &Path) -> Result<()> {
        write_output(path, &self.to_html_string())?;
        info!("exported plan HTML to {}", path.display());
        Ok(())
    }

    fn entry_mut(&mut self, index: usize) -> Result<&mut PlanEntry> {
        let len = self.entries.len();
        self.entries
            .get_mut(index)
            .ok_or_else(|| anyhow!("entry index {index} out of range (plan has {len} entries)"))
    }

    fn refresh_counters(&mut self) {
        self.metadata.total_apps = self.entries.len();
        self.metadata.matched_apps = self.matched_count();
        self.metadata.selected_apps = self.selected_count();
        self.metadata.match_rate = self.match_rate();
        debug!(
            "plan counters: total={} matched={} selected={}",
            self.metadata.total_apps, self.metadata.matched_apps, self.metadata.selected_apps
        );
    }
}

fn validate_lock(entry: &PlanEntry) -> Result<()> {
    if entry.version_lock && !is_valid_version(entry.locked_version.trim()) {
        bail!(
            "entry '{}' is version locked with invalid version '{}'",
            entry.app_name,
            entry.locked_version
        );
    }
    Ok(())
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests;
