mod app;
mod catalog;
mod clock;
mod error;
mod matching;
mod normalize;
mod process;
mod source;
mod status;
mod validate;

pub use app::{is_os_update_name, parse_install_date, AppInfo, AppOrigin};
pub use catalog::{
    is_success_exit_code, CatalogPackage, FailureKind, InstallOutcome, InstallRequest,
    OutdatedPackage, PackageCatalog, REBOOT_EXIT_CODES, SUCCESS_EXIT_CODES,
};
pub use clock::{Clock, HostInfo, SystemClock};
pub use error::CatalogError;
pub use matching::{MatchResult, MatchType};
pub use normalize::{app_keywords, base_app_name, normalize_app_name};
pub use process::{run_with_timeout, CommandOutput};
pub use source::{retain_migratable, InstalledApplicationSource};
pub use status::EntryStatus;
pub use validate::{is_valid_package_id, is_valid_version, validate_package_id, validate_version};
