use std::time::Duration;

use chrono::{DateTime, Utc};
use migrant_core::{EntryStatus, FailureKind, InstallRequest};
use migrant_plan::PlanEntry;

/// One selected plan entry as the worker tracks it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub entry_index: usize,
    pub app_name: String,
    pub package_id: String,
    pub requested_version: Option<String>,
    pub status: EntryStatus,
    pub error_message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub failure_kind: Option<FailureKind>,
}

impl Job {
    pub(crate) fn queued(entry_index: usize, entry: &PlanEntry) -> Self {
        Self {
            entry_index,
            app_name: entry.app_name.clone(),
            package_id: entry.catalog_package_id.clone(),
            requested_version: entry.requested_version().map(str::to_string),
            status: EntryStatus::Queued,
            error_message: String::new(),
            started_at: None,
            ended_at: None,
            retry_count: 0,
            failure_kind: None,
        }
    }

    pub fn request(&self, timeout: Option<Duration>) -> InstallRequest {
        let mut request =
            InstallRequest::new(&self.package_id).with_version(self.requested_version.as_deref());
        request.timeout = timeout;
        request
    }

    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.ended_at? - self.started_at?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub total: usize,
    pub pending: usize,
    pub queued: usize,
    pub installing: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl WorkerStats {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let mut stats = Self {
            total: jobs.len(),
            ..Self::default()
        };
        for job in jobs {
            match job.status {
                EntryStatus::Pending => stats.pending += 1,
                EntryStatus::Queued => stats.queued += 1,
                EntryStatus::Installing => stats.installing += 1,
                EntryStatus::Success => stats.success += 1,
                EntryStatus::Failed => stats.failed += 1,
                EntryStatus::Skipped => stats.skipped += 1,
                EntryStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub fn finished(&self) -> usize {
        self.success + self.failed + self.skipped + self.cancelled
    }
}
