use anyhow::Result;
use migrant_core::{retain_migratable, AppInfo, AppOrigin, InstalledApplicationSource};
use tracing::{debug, info, warn};

#[cfg(windows)]
use winreg::{enums::*, RegKey};

const UNINSTALL_KEY: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall";
const UNINSTALL_KEY_WOW64: &str =
    r"SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallRoot {
    LocalMachine,
    LocalMachineWow64,
    CurrentUser,
}

impl UninstallRoot {
    pub const ALL: [UninstallRoot; 3] = [
        UninstallRoot::LocalMachine,
        UninstallRoot::LocalMachineWow64,
        UninstallRoot::CurrentUser,
    ];

    pub fn subkey(self) -> &'static str {
        match self {
            Self::LocalMachine | Self::CurrentUser => UNINSTALL_KEY,
            Self::LocalMachineWow64 => UNINSTALL_KEY_WOW64,
        }
    }

    pub fn origin(self) -> AppOrigin {
        match self {
            Self::LocalMachine => AppOrigin::RegistryHklm,
            Self::LocalMachineWow64 => AppOrigin::RegistryHklmWow64,
            Self::CurrentUser => AppOrigin::RegistryHkcu,
        }
    }
}

/// Values read from one uninstall subkey.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallValues {
    pub display_name: String,
    pub display_version: String,
    pub publisher: String,
    pub install_date: String,
    pub install_location: String,
    pub uninstall_string: String,
}

/// Builds an app from one uninstall subkey; entries without a display name are
/// not applications.
pub fn app_from_uninstall_values(
    root: UninstallRoot,
    subkey_name: &str,
    values: UninstallValues,
) -> Option<AppInfo> {
    let name = values.display_name.trim();
    if name.is_empty() {
        return None;
    }

    let mut app = AppInfo::new(name, root.origin())
        .with_version(values.display_version.trim())
        .with_publisher(values.publisher.trim());
    app.install_date = values.install_date.trim().to_string();
    app.install_location = values.install_location.trim().to_string();
    app.uninstall_string = values.uninstall_string;
    app.registry_key = format!(r"{}\{}", root.subkey(), subkey_name);
    Some(app)
}

/// Windows uninstall registry (machine, 32-bit machine and per-user hives).
#[derive(Debug, Clone)]
pub struct RegistrySource {
    roots: Vec<UninstallRoot>,
}

impl Default for RegistrySource {
    fn default() -> Self {
        Self {
            roots: UninstallRoot::ALL.to_vec(),
        }
    }
}

impl RegistrySource {
    #[cfg(windows)]
    fn scan_root(&self, root: UninstallRoot) -> Vec<AppInfo> {
        let hive = match root {
            UninstallRoot::CurrentUser => RegKey::predef(HKEY_CURRENT_USER),
            _ => RegKey::predef(HKEY_LOCAL_MACHINE),
        };
        let uninstall = match hive.open_subkey_with_flags(root.subkey(), KEY_READ) {
            Ok(key) => key,
            Err(err) => {
                warn!("failed to open registry key {}: {err}", root.subkey());
                return Vec::new();
            }
        };

        let read = |key: &RegKey, name: &str| key.get_value::<String, _>(name).unwrap_or_default();

        let mut apps = Vec::new();
        for subkey_name in uninstall.enum_keys().filter_map(|name| name.ok()) {
            let Ok(app_key) = uninstall.open_subkey_with_flags(&subkey_name, KEY_READ) else {
                continue;
            };
            let values = UninstallValues {
                display_name: read(&app_key, "DisplayName"),
                display_version: read(&app_key, "DisplayVersion"),
                publisher: read(&app_key, "Publisher"),
                install_date: read(&app_key, "InstallDate"),
                install_location: read(&app_key, "InstallLocation"),
                uninstall_string: read(&app_key, "UninstallString"),
            };
            if let Some(app) = app_from_uninstall_values(root, &subkey_name, values) {
                debug!("found {} {}", app.name, app.version);
                apps.push(app);
            }
        }
        apps
    }

    #[cfg(not(windows))]
    fn scan_root(&self, root: UninstallRoot) -> Vec<AppInfo> {
        debug!("skipping registry root {:?} on a non-Windows host", root);
        Vec::new()
    }
}

impl InstalledApplicationSource for RegistrySource {
    fn name(&self) -> &str {
        "registry"
    }

    fn list_all(&self) -> Result<Vec<AppInfo>> {
        if !cfg!(windows) {
            warn!("registry inventory is only available on Windows");
            return Ok(Vec::new());
        }

        let mut apps = Vec::new();
        for root in &self.roots {
            apps.extend(self.scan_root(*root));
        }
        retain_migratable(&mut apps);
        info!("found {} applications in the registry", apps.len());
        Ok(apps)
    }
}
