use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use migrant_core::{is_valid_package_id, normalize_app_name};
use serde::{Deserialize, Serialize};
use tracing::warn;

const COMMON_MAPPINGS: &[(&str, &str)] = &[
    // browsers
    ("Google Chrome", "googlechrome"),
    ("Mozilla Firefox", "firefox"),
    ("Microsoft Edge", "microsoft-edge"),
    ("Opera", "opera"),
    ("Brave", "brave"),
    // development
    ("Visual Studio Code", "vscode"),
    ("Git", "git"),
    ("GitHub Desktop", "github-desktop"),
    ("GitKraken", "gitkraken"),
    ("Docker Desktop", "docker-desktop"),
    ("Node.js", "nodejs"),
    ("Python", "python"),
    ("Java", "javaruntime"),
    ("CMake", "cmake"),
    // archives
    ("7-Zip", "7zip"),
    ("WinRAR", "winrar"),
    ("WinZip", "winzip"),
    // media
    ("VLC media player", "vlc"),
    ("iTunes", "itunes"),
    ("Spotify", "spotify"),
    ("Audacity", "audacity"),
    // editors
    ("Notepad++", "notepadplusplus"),
    ("Sublime Text", "sublimetext3"),
    ("Atom", "atom"),
    // communication
    ("Discord", "discord"),
    ("Slack", "slack"),
    ("Zoom", "zoom"),
    ("Microsoft Teams", "microsoft-teams"),
    ("Skype", "skype"),
    // network and remote access
    ("PuTTY", "putty"),
    ("WinSCP", "winscp"),
    ("FileZilla", "filezilla"),
    ("TeamViewer", "teamviewer"),
    ("AnyDesk", "anydesk"),
    ("Wireshark", "wireshark"),
    // graphics and office
    ("Adobe Acrobat", "adobereader"),
    ("GIMP", "gimp"),
    ("Inkscape", "inkscape"),
    ("OBS Studio", "obs-studio"),
    ("VirtualBox", "virtualbox"),
    // misc
    ("qBittorrent", "qbittorrent"),
    ("Steam", "steam"),
];

pub const CASE_SENSITIVE_CONFIDENCE: f64 = 1.0;
pub const CASE_INSENSITIVE_CONFIDENCE: f64 = 0.95;

/// On-disk form: `{"mappings": [{"app_name", "choco_package"}], "count"}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingDocument {
    #[serde(default)]
    pub mappings: Vec<MappingRecord>,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MappingRecord {
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub choco_package: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingHit {
    pub key: String,
    pub package_id: String,
    pub confidence: f64,
}

/// Display name to package id table. Keys are always stored normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    entries: BTreeMap<String, String>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (app_name, package_id) in COMMON_MAPPINGS {
            table.add(app_name, package_id);
        }
        table
    }

    /// Returns `false` and leaves the table untouched when the name is blank
    /// or the package id is not a valid catalog id.
    pub fn add(&mut self, app_name: &str, package_id: &str) -> bool {
        let key = normalize_app_name(app_name);
        let package_id = package_id.trim();
        if key.is_empty() || !is_valid_package_id(package_id) {
            return false;
        }
        self.entries.insert(key, package_id.to_string());
        true
    }

    pub fn remove(&mut self, app_name: &str) -> bool {
        self.entries.remove(&normalize_app_name(app_name)).is_some()
    }

    pub fn has(&self, app_name: &str) -> bool {
        self.entries.contains_key(&normalize_app_name(app_name))
    }

    pub fn get(&self, app_name: &str) -> Option<&str> {
        self.entries
            .get(&normalize_app_name(app_name))
            .map(String::as_str)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Case-sensitive hit first, then a case-insensitive scan.
    pub fn lookup(&self, app_name: &str) -> Option<MappingHit> {
        let key = normalize_app_name(app_name);
        if key.is_empty() {
            return None;
        }

        if let Some(package_id) = self.entries.get(&key) {
            return Some(MappingHit {
                key,
                package_id: package_id.clone(),
                confidence: CASE_SENSITIVE_CONFIDENCE,
            });
        }

        let folded = key.to_lowercase();
        self.entries
            .iter()
            .find(|(candidate, _)| candidate.to_lowercase() == folded)
            .map(|(candidate, package_id)| MappingHit {
                key: candidate.clone(),
                package_id: package_id.clone(),
                confidence: CASE_INSENSITIVE_CONFIDENCE,
            })
    }

    pub fn to_document(&self) -> MappingDocument {
        let mappings = self
            .iter()
            .map(|(app_name, package_id)| MappingRecord {
                app_name: app_name.to_string(),
                choco_package: package_id.to_string(),
            })
            .collect::<Vec<_>>();
        MappingDocument {
            count: mappings.len(),
            mappings,
        }
    }

    /// Merges `document` into the table and returns how many records were taken.
    pub fn merge_document(&mut self, document: &MappingDocument) -> usize {
        let mut imported = 0;
        for record in &document.mappings {
            let app_name = record.app_name.trim();
            let package_id = record.choco_package.trim();
            if app_name.is_empty() || package_id.is_empty() {
                continue;
            }
            if !self.add(app_name, package_id) {
                warn!("skipping mapping for '{app_name}': invalid package id '{package_id}'");
                continue;
            }
            imported += 1;
        }
        imported
    }

    pub fn export_file(&self, path: &Path) -> Result<()> {
        let rendered = serde_json::to_string_pretty(&self.to_document())
            .context("failed to serialize mappings")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, rendered)
            .with_context(|| format!("failed to write mappings file: {}", path.display()))
    }

    pub fn import_file(&mut self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read mappings file: {}", path.display()))?;
        let document: MappingDocument = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse mappings file: {}", path.display()))?;
        Ok(self.merge_document(&document))
    }
}
