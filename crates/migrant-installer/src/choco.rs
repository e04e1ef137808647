use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use migrant_core::{
    is_success_exit_code, run_with_timeout, validate_package_id, validate_version,
    CatalogError, CatalogPackage, CommandOutput, InstallOutcome, InstallRequest,
    OutdatedPackage, PackageCatalog,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const OUTDATED_TIMEOUT: Duration = Duration::from_secs(120);

const CHOCO_CANDIDATES: [&str; 3] = ["choco.exe", "bin/choco.exe", "chocolatey/bin/choco.exe"];
const INSTALL_ROOT_ENV: &str = "ChocolateyInstall";
const BANNER_PREFIX: &str = "Chocolatey";

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\d+\.\d+").expect("version pattern is valid"));

/// A portable Chocolatey install driven through its command line.
#[derive(Debug, Clone)]
pub struct ChocoCatalog {
    root: PathBuf,
    executable: PathBuf,
    version: String,
    default_timeout: Duration,
}

impl ChocoCatalog {
    /// Locates `choco.exe` under `root` and queries its version. Either step
    /// failing leaves the catalog unusable, so it is reported as an error.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let executable = locate_executable(&root)
            .ok_or_else(|| anyhow!("choco.exe not found under {}", root.display()))?;

        let mut catalog = Self {
            root,
            executable,
            version: String::new(),
            default_timeout: DEFAULT_INSTALL_TIMEOUT,
        };
        catalog.version = catalog.query_version().with_context(|| {
            format!("failed to initialize catalog at {}", catalog.root.display())
        })?;

        info!(
            "using Chocolatey {} at {}",
            catalog.version,
            catalog.executable.display()
        );
        Ok(catalog)
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn uninstall(&self, package_id: &str) -> InstallOutcome {
        if let Err(err) = validate_package_id(package_id) {
            return InstallOutcome::rejected(&err);
        }
        info!("uninstalling {package_id}");
        self.execute(
            vec!["uninstall".into(), package_id.into(), "-y".into()],
            self.default_timeout,
        )
    }

    pub fn upgrade(&self, package_id: &str) -> InstallOutcome {
        if let Err(err) = validate_package_id(package_id) {
            return InstallOutcome::rejected(&err);
        }
        info!("upgrading {package_id}");
        self.execute(
            vec!["upgrade".into(), package_id.into(), "-y".into()],
            self.default_timeout,
        )
    }

    fn query_version(&self) -> Result<String> {
        let output = self.run(&["--version".to_string()], VERSION_QUERY_TIMEOUT)?;
        parse_version(&output.combined()).ok_or_else(|| {
            anyhow!(
                "catalog did not report a version (exit code {}): '{}'",
                output.exit_code,
                output.stdout.trim()
            )
        })
    }

    fn run(&self, args: &[String], timeout: Duration) -> Result<CommandOutput, CatalogError> {
        if !self.executable.is_file() {
            warn!("choco.exe is missing at {}", self.executable.display());
            return Err(CatalogError::NotInitialized);
        }
        debug!("running {} {}", self.executable.display(), args.join(" "));

        let mut command = Command::new(&self.executable);
        command.args(args).env(INSTALL_ROOT_ENV, &self.root);
        run_with_timeout(&mut command, timeout)
    }

    /// Runs a state-changing command and folds any failure into the outcome.
    fn execute(&self, args: Vec<String>, timeout: Duration) -> InstallOutcome {
        match self.run(&args, timeout) {
            Ok(output) => outcome_from_output(&output),
            Err(err) => {
                warn!("catalog command '{}' failed: {err}", args.join(" "));
                InstallOutcome::rejected(&err)
            }
        }
    }

    fn query(&self, args: &[String], timeout: Duration) -> Result<String, CatalogError> {
        let output = self.run(args, timeout)?;
        if !is_success_exit_code(output.exit_code) {
            return Err(CatalogError::CommandFailed {
                exit_code: output.exit_code,
                message: failure_message(&output),
            });
        }
        Ok(output.stdout)
    }
}

impl PackageCatalog for ChocoCatalog {
    fn verify_integrity(&self) -> bool {
        match self.query_version() {
            Ok(_) => true,
            Err(err) => {
                warn!("catalog integrity check failed: {err:#}");
                false
            }
        }
    }

    fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogPackage>, CatalogError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec![
            "search".to_string(),
            query.to_string(),
            "--limit-output".to_string(),
        ];
        if limit > 0 {
            args.push("--page-size".to_string());
            args.push(limit.to_string());
        }

        let mut packages = parse_limit_output(&self.query(&args, SEARCH_TIMEOUT)?);
        if limit > 0 {
            packages.truncate(limit);
        }
        debug!("search '{query}' returned {} packages", packages.len());
        Ok(packages)
    }

    fn is_available(&self, package_id: &str) -> bool {
        if validate_package_id(package_id).is_err() {
            return false;
        }
        match self.search(package_id, 1) {
            Ok(packages) => packages
                .iter()
                .any(|package| package.id.eq_ignore_ascii_case(package_id)),
            Err(err) => {
                debug!("availability check for {package_id} failed: {err}");
                false
            }
        }
    }

    fn install(&self, request: &InstallRequest) -> InstallOutcome {
        if let Err(err) = validate_package_id(&request.package_id) {
            return InstallOutcome::rejected(&err);
        }
        if let Some(version) = &request.version {
            if let Err(err) = validate_version(version) {
                return InstallOutcome::rejected(&err);
            }
        }

        info!(
            "installing {}{}",
            request.package_id,
            request
                .version
                .as_deref()
                .map(|version| format!(" {version}"))
                .unwrap_or_default()
        );
        let outcome = self.execute(
            build_install_args(request),
            request.timeout.unwrap_or(self.default_timeout),
        );
        if outcome.success {
            info!("installed {} (exit code {})", request.package_id, outcome.exit_code);
        } else {
            warn!(
                "install of {} failed (exit code {}): {}",
                request.package_id, outcome.exit_code, outcome.error_message
            );
        }
        outcome
    }

    fn catalog_version(&self) -> Option<String> {
        Some(self.version.clone())
    }

    fn installed_version(&self, package_id: &str) -> Option<String> {
        validate_package_id(package_id).ok()?;
        let args = [
            "list".to_string(),
            "--local-only".to_string(),
            package_id.to_string(),
            "--exact".to_string(),
            "--limit-output".to_string(),
        ];
        let stdout = self.query(&args, QUERY_TIMEOUT).ok()?;
        parse_limit_output(&stdout)
            .into_iter()
            .find(|package| package.id.eq_ignore_ascii_case(package_id))
            .map(|package| package.version)
    }

    fn installed_packages(&self) -> Result<Vec<CatalogPackage>, CatalogError> {
        let args = [
            "list".to_string(),
            "--local-only".to_string(),
            "--limit-output".to_string(),
        ];
        Ok(parse_limit_output(&self.query(&args, SEARCH_TIMEOUT)?))
    }

    fn outdated(&self) -> Result<Vec<OutdatedPackage>, CatalogError> {
        let args = ["outdated".to_string(), "--limit-output".to_string()];
        Ok(parse_outdated(&self.query(&args, OUTDATED_TIMEOUT)?))
    }
}

pub fn locate_executable(root: &Path) -> Option<PathBuf> {
    CHOCO_CANDIDATES
        .iter()
        .map(|candidate| root.join(candidate))
        .find(|path| path.is_file())
}

pub fn build_install_args(request: &InstallRequest) -> Vec<String> {
    let mut args = vec!["install".to_string(), request.package_id.clone()];
    if let Some(version) = &request.version {
        args.push("--version".to_string());
        args.push(version.clone());
    }
    if request.auto_confirm {
        args.push("-y".to_string());
    }
    if request.force {
        args.push("--force".to_string());
    }
    args.extend(request.extra_args.iter().cloned());
    args
}

/// Parses `id|version` lines as printed with `--limit-output`.
pub fn parse_limit_output(output: &str) -> Vec<CatalogPackage> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(BANNER_PREFIX))
        .filter_map(|line| {
            let mut parts = line.split('|');
            let id = parts.next()?.trim();
            if id.is_empty() {
                return None;
            }
            let version = parts.next().unwrap_or_default().trim();
            Some(CatalogPackage::new(id, version))
        })
        .collect()
}

/// Parses `id|current|available|pinned` lines.
pub fn parse_outdated(output: &str) -> Vec<OutdatedPackage> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(BANNER_PREFIX))
        .filter_map(|line| {
            let parts = line.split('|').map(str::trim).collect::<Vec<_>>();
            if parts.len() < 3 || parts[0].is_empty() {
                return None;
            }
            Some(OutdatedPackage {
                id: parts[0].to_string(),
                current_version: parts[1].to_string(),
                available_version: parts[2].to_string(),
                pinned: parts
                    .get(3)
                    .is_some_and(|value| value.eq_ignore_ascii_case("true")),
            })
        })
        .collect()
}

pub fn parse_version(output: &str) -> Option<String> {
    VERSION_PATTERN
        .find(output)
        .map(|found| found.as_str().to_string())
}

/// Picks the most telling line out of a failed command's output.
pub fn extract_error_message(output: &str) -> String {
    for line in output.lines() {
        let trimmed = line.trim();
        let lower = trimmed.to_ascii_lowercase();

        if let Some(position) = lower.find("error") {
            return trimmed[position..].trim().to_string();
        }
        if lower.contains("failed") || lower.contains("not found") {
            return trimmed.to_string();
        }
    }
    "Unknown error".to_string()
}

fn failure_message(output: &CommandOutput) -> String {
    let combined = output.combined();
    if combined.trim().is_empty() {
        format!("Command failed with exit code {}", output.exit_code)
    } else {
        extract_error_message(&combined)
    }
}

pub(crate) fn outcome_from_output(output: &CommandOutput) -> InstallOutcome {
    if is_success_exit_code(output.exit_code) {
        return InstallOutcome::success(output.combined(), output.exit_code);
    }
    InstallOutcome::failure(failure_message(output), output.combined(), output.exit_code)
}
