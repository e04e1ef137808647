use anyhow::Result;

use crate::{is_os_update_name, AppInfo};

/// Enumerates applications installed on this machine.
pub trait InstalledApplicationSource: Send + Sync {
    fn name(&self) -> &str;

    fn list_all(&self) -> Result<Vec<AppInfo>>;
}

/// Drops entries that can never be migrated: blank names and OS updates.
pub fn retain_migratable(apps: &mut Vec<AppInfo>) {
    apps.retain(|app| {
        let name = app.name.trim();
        !name.is_empty() && !is_os_update_name(name)
    });
}
