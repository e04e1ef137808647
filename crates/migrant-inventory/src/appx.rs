use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use migrant_core::{
    retain_migratable, run_with_timeout, AppInfo, AppOrigin, InstalledApplicationSource,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

const APPX_QUERY: &str =
    "Get-AppxPackage | Select-Object Name,Version,Publisher,InstallLocation | ConvertTo-Json";
const APPX_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AppxRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    publisher: Option<String>,
    #[serde(default)]
    install_location: Option<String>,
}

/// `ConvertTo-Json` emits a bare object for a single package and an array
/// otherwise.
pub fn parse_appx_json(raw: &str) -> Result<Vec<AppInfo>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(trimmed).context("failed to parse AppX package list")?;
    let records = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        Value::Null => Vec::new(),
        other => return Err(anyhow!("unexpected AppX package list shape: {other}")),
    };

    let apps = records
        .into_iter()
        .filter_map(|item| serde_json::from_value::<AppxRecord>(item).ok())
        .filter_map(|record| {
            let name = record.name?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let mut app = AppInfo::new(name.clone(), AppOrigin::PackageStore)
                .with_version(record.version.unwrap_or_default())
                .with_publisher(record.publisher.unwrap_or_default());
            app.install_location = record.install_location.unwrap_or_default();
            app.registry_key = format!("appx:{name}");
            Some(app)
        })
        .collect();
    Ok(apps)
}

/// Store (AppX/MSIX) packages enumerated through PowerShell.
#[derive(Debug, Clone)]
pub struct AppxSource {
    program: String,
    timeout: Duration,
}

impl Default for AppxSource {
    fn default() -> Self {
        Self {
            program: "powershell.exe".to_string(),
            timeout: APPX_TIMEOUT,
        }
    }
}

impl InstalledApplicationSource for AppxSource {
    fn name(&self) -> &str {
        "appx"
    }

    fn list_all(&self) -> Result<Vec<AppInfo>> {
        if !cfg!(windows) {
            warn!("package store inventory is only available on Windows");
            return Ok(Vec::new());
        }

        let mut command = Command::new(&self.program);
        command.args(["-NoProfile", "-Command", APPX_QUERY]);
        let output = run_with_timeout(&mut command, self.timeout)
            .with_context(|| format!("failed to query AppX packages via {}", self.program))?;
        if output.exit_code != 0 {
            return Err(anyhow!(
                "AppX query exited with code {}: {}",
                output.exit_code,
                output.stderr.trim()
            ));
        }

        let mut apps = parse_appx_json(&output.stdout)?;
        retain_migratable(&mut apps);
        info!("found {} package store applications", apps.len());
        Ok(apps)
    }
}
