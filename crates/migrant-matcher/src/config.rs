use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchConfig {
    pub use_exact_mappings: bool,
    pub use_fuzzy_matching: bool,
    pub use_catalog_search: bool,
    pub min_confidence: f64,
    pub max_search_results: usize,
    pub verify_availability: bool,
    pub thread_count: usize,
    pub use_cache: bool,
    /// Prefer the two-phase fan-out when matching a whole inventory.
    pub parallel: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            use_exact_mappings: true,
            use_fuzzy_matching: true,
            use_catalog_search: true,
            min_confidence: 0.5,
            max_search_results: 5,
            verify_availability: true,
            thread_count: 8,
            use_cache: true,
            parallel: true,
        }
    }
}
