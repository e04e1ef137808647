use chrono::{DateTime, SecondsFormat, Utc};
use migrant_core::{is_valid_package_id, AppInfo, EntryStatus, MatchResult, MatchType};
use serde::{Deserialize, Serialize};

pub const PLAN_SCHEMA_VERSION: &str = "1.0";

/// Entries at or above this confidence start out selected.
pub const AUTO_SELECT_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlanEntry {
    pub app_name: String,
    pub app_version: String,
    pub app_publisher: String,
    pub install_location: String,
    #[serde(with = "iso_date")]
    pub install_date: Option<DateTime<Utc>>,
    pub registry_key: String,

    #[serde(rename = "choco_package")]
    pub catalog_package_id: String,
    pub confidence: f64,
    #[serde(deserialize_with = "lenient_match_type")]
    pub match_type: MatchType,
    pub available: bool,
    pub available_version: String,

    pub selected: bool,
    pub version_lock: bool,
    pub locked_version: String,
    pub notes: String,

    #[serde(deserialize_with = "lenient_status")]
    pub status: EntryStatus,
    pub error_message: String,
    #[serde(with = "iso_date", skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
}

impl PlanEntry {
    /// An unmatched row named `app_name`.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    pub fn from_app(app: &AppInfo, matched: Option<&MatchResult>) -> Self {
        let mut entry = Self {
            app_name: app.name.clone(),
            app_version: app.version.clone(),
            app_publisher: app.publisher.clone(),
            install_location: app.install_location.clone(),
            install_date: app.parsed_install_date(),
            registry_key: app.registry_key.clone(),
            ..Self::default()
        };

        let matched =
            matched.filter(|matched| is_valid_package_id(matched.catalog_package_id.trim()));
        if let Some(matched) = matched {
            entry.catalog_package_id = matched.catalog_package_id.trim().to_string();
            entry.confidence = matched.confidence;
            entry.match_type = matched.match_type;
            entry.available = matched.available != Some(false);
            entry.available_version = matched.catalog_version.clone().unwrap_or_default();
        }
        entry.selected = entry.is_matched() && entry.confidence >= AUTO_SELECT_CONFIDENCE;
        entry.enforce_match_invariants();
        entry
    }

    pub fn with_package(mut self, package_id: impl Into<String>, match_type: MatchType) -> Self {
        self.catalog_package_id = package_id.into();
        self.match_type = match_type;
        self.confidence = match match_type {
            MatchType::Manual => 1.0,
            other => other.confidence_floor(),
        };
        self.available = true;
        self
    }

    pub fn is_matched(&self) -> bool {
        !self.catalog_package_id.is_empty()
    }

    /// Version the installer must request, if any.
    pub fn requested_version(&self) -> Option<&str> {
        (self.version_lock && !self.locked_version.is_empty())
            .then_some(self.locked_version.as_str())
    }

    pub(crate) fn enforce_match_invariants(&mut self) {
        self.catalog_package_id = self.catalog_package_id.trim().to_string();
        if self.catalog_package_id.is_empty() {
            self.match_type = MatchType::None;
            self.confidence = 0.0;
            self.available = false;
            self.available_version.clear();
            self.selected = false;
        } else {
            self.confidence = self.confidence.clamp(0.0, 1.0);
        }
        if !self.version_lock {
            self.locked_version.clear();
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlanMetadata {
    pub source_machine: String,
    pub source_os: String,
    pub source_os_version: String,
    pub created_by: String,
    #[serde(with = "iso_date")]
    pub created_at: Option<DateTime<Utc>>,
    pub total_apps: usize,
    pub matched_apps: usize,
    pub selected_apps: usize,
    pub match_rate: f64,
    #[serde(rename = "report_version")]
    pub report_schema_version: String,
}

pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn lenient_match_type<'de, D>(deserializer: D) -> Result<MatchType, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(MatchType::parse).unwrap_or_default())
}

fn lenient_status<'de, D>(deserializer: D) -> Result<EntryStatus, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(EntryStatus::parse).unwrap_or_default())
}

/// Timestamps travel as ISO-8601 text; unset or unparseable values read back
/// as `None`.
mod iso_date {
    use chrono::{DateTime, Utc};
    use migrant_core::parse_install_date;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_str(&super::format_timestamp(value)),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse_install_date))
    }
}
