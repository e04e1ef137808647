use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Search,
    Manual,
    #[default]
    None,
}

impl MatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Fuzzy => "fuzzy",
            Self::Search => "search",
            Self::Manual => "manual",
            Self::None => "none",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "fuzzy" => Some(Self::Fuzzy),
            "search" => Some(Self::Search),
            "manual" => Some(Self::Manual),
            "none" => Some(Self::None),
            _ => None,
        }
    }

    /// Lowest confidence a strategy may report.
    pub fn confidence_floor(self) -> f64 {
        match self {
            Self::Exact => 0.95,
            Self::Fuzzy => 0.60,
            Self::Search => 0.50,
            Self::Manual | Self::None => 0.0,
        }
    }
}

/// A proposal that `app_name` installs as `catalog_package_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Inventory name the matcher was asked about.
    pub app_name: String,
    /// Mapping key for exact hits, catalog title otherwise.
    pub matched_name: String,
    pub catalog_package_id: String,
    pub confidence: f64,
    pub match_type: MatchType,
    /// `None` when availability was not checked.
    pub available: Option<bool>,
    pub catalog_version: Option<String>,
}
