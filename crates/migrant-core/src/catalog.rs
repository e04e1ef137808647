use std::time::Duration;

use crate::CatalogError;

/// Exit codes the catalog reports for a completed install.
pub const SUCCESS_EXIT_CODES: [i32; 3] = [0, 1641, 3010];

/// Success, but the machine wants a reboot before the package is usable.
pub const REBOOT_EXIT_CODES: [i32; 2] = [1641, 3010];

const PERMISSION_PATTERNS: &[&str] = &["access denied", "permission", "administrator", "elevated"];
const NOT_FOUND_PATTERNS: &[&str] = &["not found", "unable to find"];
const NETWORK_PATTERNS: &[&str] = &[
    "network",
    "timeout",
    "connection",
    "unreachable",
    "dns",
    "proxy",
    "ssl",
    "certificate",
    "tls",
];
const DEPENDENCY_PATTERNS: &[&str] = &["dependency", "requires"];

pub fn is_success_exit_code(exit_code: i32) -> bool {
    SUCCESS_EXIT_CODES.contains(&exit_code)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPackage {
    pub id: String,
    pub version: String,
    pub title: String,
}

impl CatalogPackage {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            version: version.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutdatedPackage {
    pub id: String,
    pub current_version: String,
    pub available_version: String,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub package_id: String,
    pub version: Option<String>,
    pub version_locked: bool,
    pub auto_confirm: bool,
    pub force: bool,
    pub extra_args: Vec<String>,
    /// Falls back to the catalog's default when unset.
    pub timeout: Option<Duration>,
}

impl InstallRequest {
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            version: None,
            version_locked: false,
            auto_confirm: true,
            force: false,
            extra_args: Vec::new(),
            timeout: None,
        }
    }

    /// Pins the request to `version`; an empty string means "latest".
    pub fn with_version(mut self, version: Option<&str>) -> Self {
        match version.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => {
                self.version = Some(value.to_string());
                self.version_locked = true;
            }
            None => {
                self.version = None;
                self.version_locked = false;
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    InvalidInput,
    Unavailable,
    Permission,
    NotFound,
    Network,
    Dependency,
    Timeout,
    Other,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Unavailable => "unavailable",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::Network => "network",
            Self::Dependency => "dependency",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Dependency | Self::Timeout | Self::Other
        )
    }

    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        let matches_any = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

        if matches_any(PERMISSION_PATTERNS) {
            Self::Permission
        } else if lower.contains("timed out") {
            Self::Timeout
        } else if matches_any(NOT_FOUND_PATTERNS) {
            Self::NotFound
        } else if matches_any(NETWORK_PATTERNS) {
            Self::Network
        } else if matches_any(DEPENDENCY_PATTERNS) {
            Self::Dependency
        } else {
            Self::Other
        }
    }
}

impl From<&CatalogError> for FailureKind {
    fn from(error: &CatalogError) -> Self {
        match error {
            CatalogError::InvalidPackageId(_) | CatalogError::InvalidVersion(_) => {
                Self::InvalidInput
            }
            CatalogError::NotInitialized | CatalogError::Spawn(_) => Self::Unavailable,
            CatalogError::TimedOut => Self::Timeout,
            CatalogError::CommandFailed { message, .. } => Self::classify(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub success: bool,
    pub output: String,
    pub error_message: String,
    pub exit_code: i32,
    pub failure_kind: Option<FailureKind>,
}

impl InstallOutcome {
    pub fn success(output: impl Into<String>, exit_code: i32) -> Self {
        Self {
            success: true,
            output: output.into(),
            error_message: String::new(),
            exit_code,
            failure_kind: None,
        }
    }

    pub fn failure(
        error_message: impl Into<String>,
        output: impl Into<String>,
        exit_code: i32,
    ) -> Self {
        let error_message = error_message.into();
        let output = output.into();
        let kind = FailureKind::classify(&format!("{output}\n{error_message}"));
        Self {
            success: false,
            output,
            error_message,
            exit_code,
            failure_kind: Some(kind),
        }
    }

    /// Refused before any catalog process ran.
    pub fn rejected(error: &CatalogError) -> Self {
        Self {
            success: false,
            output: String::new(),
            error_message: error.to_string(),
            exit_code: -1,
            failure_kind: Some(FailureKind::from(error)),
        }
    }

    pub fn reboot_required(&self) -> bool {
        self.success && REBOOT_EXIT_CODES.contains(&self.exit_code)
    }

    pub fn is_retryable(&self) -> bool {
        !self.success && self.failure_kind.is_none_or(FailureKind::is_retryable)
    }
}

/// The package manager the pipeline matches against and installs from.
pub trait PackageCatalog: Send + Sync {
    fn verify_integrity(&self) -> bool;

    fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogPackage>, CatalogError>;

    fn is_available(&self, package_id: &str) -> bool;

    fn install(&self, request: &InstallRequest) -> InstallOutcome;

    fn catalog_version(&self) -> Option<String> {
        None
    }

    fn installed_version(&self, _package_id: &str) -> Option<String> {
        None
    }

    fn installed_packages(&self) -> Result<Vec<CatalogPackage>, CatalogError> {
        Ok(Vec::new())
    }

    fn outdated(&self) -> Result<Vec<OutdatedPackage>, CatalogError> {
        Ok(Vec::new())
    }
}
