use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Time source for plan metadata and job timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Identity of the machine a plan was produced on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostInfo {
    pub machine_name: String,
    pub user_name: String,
    pub os_name: String,
    pub os_version: String,
}

impl HostInfo {
    /// Environment-only detection; the OS version is left empty here and filled
    /// in by platform-aware callers.
    pub fn from_env() -> Self {
        Self {
            machine_name: first_env(&["COMPUTERNAME", "HOSTNAME"])
                .unwrap_or_else(|| "unknown".to_string()),
            user_name: first_env(&["USERNAME", "USER"]).unwrap_or_else(|| "unknown".to_string()),
            os_name: os_display_name(std::env::consts::OS).to_string(),
            os_version: String::new(),
        }
    }
}

fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn os_display_name(os: &str) -> &str {
    match os {
        "windows" => "Windows",
        "linux" => "Linux",
        "macos" => "macOS",
        other => other,
    }
}
