use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Where an installed application was discovered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppOrigin {
    RegistryHklm,
    RegistryHklmWow64,
    RegistryHkcu,
    PackageStore,
    Catalog,
}

impl AppOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegistryHklm => "registry_hklm",
            Self::RegistryHklmWow64 => "registry_hklm_wow64",
            Self::RegistryHkcu => "registry_hkcu",
            Self::PackageStore => "package_store",
            Self::Catalog => "catalog",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub install_date: String,
    #[serde(default)]
    pub install_location: String,
    #[serde(default)]
    pub uninstall_string: String,
    #[serde(default)]
    pub registry_key: String,
    pub origin: AppOrigin,
}

impl AppInfo {
    pub fn new(name: impl Into<String>, origin: AppOrigin) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            publisher: String::new(),
            install_date: String::new(),
            install_location: String::new(),
            uninstall_string: String::new(),
            registry_key: String::new(),
            origin,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = publisher.into();
        self
    }

    pub fn parsed_install_date(&self) -> Option<DateTime<Utc>> {
        parse_install_date(&self.install_date)
    }
}

/// Windows hotfixes and security rollups show up as uninstall entries but are
/// never migrated.
pub fn is_os_update_name(name: &str) -> bool {
    name.starts_with("KB") || name.starts_with("Security Update") || name.contains("(KB")
}

/// Accepts RFC 3339, `YYYY-MM-DD` and the registry's compact `YYYYMMDD`.
pub fn parse_install_date(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}
