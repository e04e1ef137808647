use migrant_core::HostInfo;

#[cfg(windows)]
use winreg::{enums::*, RegKey};

#[cfg(windows)]
const CURRENT_VERSION_KEY: &str = r"SOFTWARE\Microsoft\Windows NT\CurrentVersion";

/// Host identity plus the Windows product name and release when available.
pub fn detect_host() -> HostInfo {
    let mut host = HostInfo::from_env();
    if let Some((product, version)) = windows_version() {
        host.os_name = product;
        host.os_version = version;
    }
    host
}

#[cfg(windows)]
fn windows_version() -> Option<(String, String)> {
    let key = RegKey::predef(HKEY_LOCAL_MACHINE)
        .open_subkey(CURRENT_VERSION_KEY)
        .ok()?;
    let product = key.get_value::<String, _>("ProductName").ok()?;
    let release = key
        .get_value::<String, _>("DisplayVersion")
        .or_else(|_| key.get_value::<String, _>("ReleaseId"))
        .unwrap_or_default();
    let build = key
        .get_value::<String, _>("CurrentBuild")
        .unwrap_or_default();

    let version = match (release.is_empty(), build.is_empty()) {
        (false, false) => format!("{release} (build {build})"),
        (false, true) => release,
        (true, false) => build,
        (true, true) => String::new(),
    };
    Some((product, version))
}

#[cfg(not(windows))]
fn windows_version() -> Option<(String, String)> {
    None
}
