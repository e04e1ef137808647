use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use migrant_core::{
    CatalogError, CatalogPackage, EntryStatus, FailureKind, InstallOutcome, InstallRequest,
    MatchType, PackageCatalog,
};
use migrant_plan::{MigrationPlan, PlanEntry};

use super::*;

#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
    waiting: AtomicUsize,
}

impl Gate {
    fn pass(&self) {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().expect("must lock gate");
        while !*open {
            open = self.opened.wait(open).expect("must wait on gate");
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }

    fn release(&self) {
        *self.open.lock().expect("must lock gate") = true;
        self.opened.notify_all();
    }
}

#[derive(Default)]
struct FakeCatalog {
    scripted: Mutex<HashMap<String, VecDeque<InstallOutcome>>>,
    requests: Mutex<Vec<InstallRequest>>,
    install_delay: Duration,
    gate: Option<Gate>,
    broken: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCatalog {
    fn script(self, package_id: &str, outcomes: Vec<InstallOutcome>) -> Self {
        self.scripted
            .lock()
            .expect("must lock script")
            .insert(package_id.to_string(), outcomes.into());
        self
    }

    fn gated() -> Self {
        Self {
            gate: Some(Gate::default()),
            ..Self::default()
        }
    }

    fn calls_for(&self, package_id: &str) -> usize {
        self.requests
            .lock()
            .expect("must lock requests")
            .iter()
            .filter(|request| request.package_id == package_id)
            .count()
    }

    fn waiting(&self) -> usize {
        self.gate
            .as_ref()
            .map_or(0, |gate| gate.waiting.load(Ordering::SeqCst))
    }

    fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.release();
        }
    }
}

impl PackageCatalog for FakeCatalog {
    fn verify_integrity(&self) -> bool {
        !self.broken
    }

    fn search(&self, _query: &str, _limit: usize) -> Result<Vec<CatalogPackage>, CatalogError> {
        Ok(Vec::new())
    }

    fn is_available(&self, _package_id: &str) -> bool {
        true
    }

    fn install(&self, request: &InstallRequest) -> InstallOutcome {
        self.requests
            .lock()
            .expect("must lock requests")
            .push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.pass();
        }
        thread::sleep(self.install_delay);

        let outcome = self
            .scripted
            .lock()
            .expect("must lock script")
            .get_mut(&request.package_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| InstallOutcome::success("installed", 0));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn network_failure() -> InstallOutcome {
    InstallOutcome::failure(
        "ERROR: The remote server returned an error: (503) Server Unavailable.",
        "connection reset while downloading",
        1,
    )
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(5),
        multiplier: 2,
    }
}

fn shared_plan(count: usize) -> SharedPlan {
    let mut plan = MigrationPlan::default();
    for index in 0..count {
        let entry = PlanEntry::new(format!("App {index}"))
            .with_package(format!("pkg{index}"), MatchType::Exact);
        plan.add_entry(entry).expect("must add entry");
    }
    plan.select_all();
    Arc::new(Mutex::new(plan))
}

fn worker_with(
    catalog: &Arc<FakeCatalog>,
    policy: RetryPolicy,
) -> (InstallWorker, std::sync::mpsc::Receiver<WorkerEvent>) {
    let (observer, events) = ChannelObserver::channel();
    let worker = InstallWorker::builder(catalog.clone())
        .observer(Arc::new(observer))
        .retry_policy(policy)
        .build();
    (worker, events)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn plan_statuses(plan: &SharedPlan) -> Vec<EntryStatus> {
    plan.lock()
        .expect("must lock plan")
        .entries()
        .iter()
        .map(|entry| entry.status)
        .collect()
}

#[test]
fn retry_delay_doubles_per_attempt() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay(0), Duration::from_secs(5));
    assert_eq!(policy.delay(1), Duration::from_secs(10));
    assert_eq!(policy.delay(2), Duration::from_secs(20));
    assert_eq!(policy.max_retries, 3);
}

#[test]
fn retry_policy_respects_kind_count_and_cancellation() {
    let policy = RetryPolicy::default();
    let mut job = Job {
        entry_index: 0,
        app_name: "Git".to_string(),
        package_id: "git".to_string(),
        requested_version: None,
        status: EntryStatus::Failed,
        error_message: "network".to_string(),
        started_at: None,
        ended_at: None,
        retry_count: 0,
        failure_kind: Some(FailureKind::Network),
    };
    assert!(policy.should_retry(&job, false));
    assert!(!policy.should_retry(&job, true));

    job.failure_kind = Some(FailureKind::Permission);
    assert!(!policy.should_retry(&job, false));

    job.failure_kind = None;
    job.retry_count = 3;
    assert!(!policy.should_retry(&job, false));

    job.retry_count = 0;
    job.status = EntryStatus::Success;
    assert!(!policy.should_retry(&job, false));
}

#[test]
fn retry_policy_never_exceeds_three_retries() {
    let generous = RetryPolicy {
        max_retries: 10,
        ..RetryPolicy::default()
    };
    assert_eq!(generous.capped().max_retries, RetryPolicy::MAX_RETRIES);

    let mut job = Job {
        entry_index: 0,
        app_name: "Git".to_string(),
        package_id: "git".to_string(),
        requested_version: None,
        status: EntryStatus::Failed,
        error_message: "network".to_string(),
        started_at: None,
        ended_at: None,
        retry_count: 2,
        failure_kind: Some(FailureKind::Network),
    };
    assert!(generous.should_retry(&job, false));
    job.retry_count = 3;
    assert!(!generous.should_retry(&job, false));
}

#[test]
fn worker_retries_transient_failures_within_concurrency_limit() {
    let catalog = Arc::new(
        FakeCatalog {
            install_delay: Duration::from_millis(20),
            ..FakeCatalog::default()
        }
        .script("pkg2", vec![network_failure(), network_failure()]),
    );
    let (worker, events) = worker_with(&catalog, fast_policy());
    let plan = shared_plan(5);

    assert_eq!(worker.start(plan.clone(), 2), 5);
    let stats = worker.wait();

    assert_eq!(stats.total, 5);
    assert_eq!(stats.success, 5);
    assert_eq!(stats.finished(), stats.total);
    assert!(catalog.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(catalog.calls_for("pkg2"), 3);

    let jobs = worker.jobs();
    let retried = jobs
        .iter()
        .find(|job| job.package_id == "pkg2")
        .expect("must track pkg2");
    assert_eq!(retried.retry_count, 2);
    assert!(retried.error_message.is_empty());
    assert!(retried.elapsed().is_some());

    assert_eq!(plan_statuses(&plan), vec![EntryStatus::Success; 5]);
    let plan = plan.lock().expect("must lock plan");
    assert!(plan.entries().iter().all(|entry| entry.executed_at.is_some()));

    let events = events.try_iter().collect::<Vec<_>>();
    assert_eq!(events.first(), Some(&WorkerEvent::Started { total: 5 }));
    assert!(matches!(events.last(), Some(WorkerEvent::Completed { stats }) if stats.success == 5));
    let retries = events
        .iter()
        .filter_map(|event| match event {
            WorkerEvent::JobRetrying { attempt, delay, .. } => Some((*attempt, *delay)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        retries,
        vec![
            (1, Duration::from_millis(5)),
            (2, Duration::from_millis(10))
        ]
    );
    assert!(events.contains(&WorkerEvent::JobProgress {
        entry_index: 2,
        message: "Installing pkg2...".to_string(),
    }));
    assert!(events.contains(&WorkerEvent::JobProgress {
        entry_index: 2,
        message: "Failed to install pkg2".to_string(),
    }));
    assert!(events.contains(&WorkerEvent::JobProgress {
        entry_index: 4,
        message: "Successfully installed pkg4".to_string(),
    }));
}

#[test]
fn worker_gives_up_after_max_retries() {
    let catalog = Arc::new(FakeCatalog::default().script(
        "pkg0",
        vec![
            network_failure(),
            network_failure(),
            network_failure(),
            network_failure(),
        ],
    ));
    let (worker, _events) = worker_with(&catalog, fast_policy());
    let plan = shared_plan(1);

    worker.start(plan.clone(), 1);
    let stats = worker.wait();

    assert_eq!(stats.failed, 1);
    assert_eq!(catalog.calls_for("pkg0"), 4);
    let job = &worker.jobs()[0];
    assert_eq!(job.retry_count, 3);
    assert_eq!(job.failure_kind, Some(FailureKind::Network));

    let plan = plan.lock().expect("must lock plan");
    let entry = plan.entry(0).expect("must have entry");
    assert_eq!(entry.status, EntryStatus::Failed);
    assert!(entry.error_message.contains("503"));
}

#[test]
fn worker_caps_configured_retries_at_three() {
    let catalog = Arc::new(
        FakeCatalog::default().script("pkg0", (0..6).map(|_| network_failure()).collect()),
    );
    let policy = RetryPolicy {
        max_retries: 10,
        ..fast_policy()
    };
    let (worker, _events) = worker_with(&catalog, policy);

    worker.start(shared_plan(1), 1);
    let stats = worker.wait();

    assert_eq!(stats.failed, 1);
    assert_eq!(catalog.calls_for("pkg0"), 4);
    assert_eq!(worker.jobs()[0].retry_count, 3);
}

#[test]
fn permission_failures_are_not_retried() {
    let catalog = Arc::new(FakeCatalog::default().script(
        "pkg1",
        vec![InstallOutcome::failure("ERROR: Access denied to C:\\ProgramData", "", 1)],
    ));
    let (worker, _events) = worker_with(&catalog, fast_policy());
    let plan = shared_plan(3);

    worker.start(plan.clone(), 2);
    let stats = worker.wait();

    assert_eq!(stats.success, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(catalog.calls_for("pkg1"), 1);
    assert_eq!(
        plan_statuses(&plan),
        vec![
            EntryStatus::Success,
            EntryStatus::Failed,
            EntryStatus::Success
        ]
    );
}

#[test]
fn empty_failure_message_gets_default_text() {
    let catalog = Arc::new(FakeCatalog::default().script(
        "pkg0",
        vec![InstallOutcome {
            success: false,
            output: String::new(),
            error_message: String::new(),
            exit_code: 1,
            failure_kind: Some(FailureKind::NotFound),
        }],
    ));
    let (worker, _events) = worker_with(&catalog, fast_policy());
    worker.start(shared_plan(1), 1);
    worker.wait();

    assert_eq!(worker.jobs()[0].error_message, "Installation failed");
}

#[test]
fn cancel_drops_queued_jobs_and_lets_in_flight_finish() {
    let catalog = Arc::new(FakeCatalog::gated());
    let (worker, events) = worker_with(&catalog, fast_policy());
    let plan = shared_plan(20);

    assert_eq!(worker.start(plan.clone(), 2), 20);
    assert!(
        wait_until(Duration::from_secs(5), || catalog.waiting() == 2),
        "two installs must be in flight"
    );

    worker.cancel();
    worker.cancel();
    catalog.release();
    let stats = worker.wait();

    assert_eq!(stats.success, 2);
    assert_eq!(stats.cancelled, 18);
    assert_eq!(stats.finished(), 20);
    assert!(!worker.is_running());
    assert_eq!(catalog.requests.lock().expect("must lock").len(), 2);

    let statuses = plan_statuses(&plan);
    assert_eq!(
        statuses
            .iter()
            .filter(|status| **status == EntryStatus::Cancelled)
            .count(),
        18
    );

    let events = events.try_iter().collect::<Vec<_>>();
    assert_eq!(
        events
            .iter()
            .filter(|event| **event == WorkerEvent::Cancelled)
            .count(),
        1
    );
    let cancelled_position = events
        .iter()
        .position(|event| *event == WorkerEvent::Cancelled)
        .expect("must emit cancelled");
    let completed_position = events
        .iter()
        .position(|event| matches!(event, WorkerEvent::Completed { .. }))
        .expect("must emit completed");
    assert!(cancelled_position < completed_position);
    assert_eq!(completed_position, events.len() - 1);
}

#[test]
fn cancel_during_retry_delay_finalizes_job_as_cancelled() {
    let catalog = Arc::new(FakeCatalog::default().script("pkg0", vec![network_failure()]));
    let policy = RetryPolicy {
        base_delay: Duration::from_secs(30),
        ..RetryPolicy::default()
    };
    let (worker, events) = worker_with(&catalog, policy);
    let plan = shared_plan(1);

    worker.start(plan.clone(), 1);
    let mut seen = Vec::new();
    assert!(wait_until(Duration::from_secs(5), || {
        seen.extend(events.try_iter());
        seen.iter()
            .any(|event| matches!(event, WorkerEvent::JobRetrying { .. }))
    }));

    let started = Instant::now();
    worker.cancel();
    let stats = worker.wait();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(stats.cancelled, 1);
    assert_eq!(catalog.calls_for("pkg0"), 1);
    assert_eq!(plan_statuses(&plan), vec![EntryStatus::Cancelled]);
}

#[test]
fn pause_holds_dispatch_until_resume() {
    let catalog = Arc::new(FakeCatalog::gated());
    let (worker, events) = worker_with(&catalog, fast_policy());
    let plan = shared_plan(4);

    worker.pause();
    assert!(!worker.is_paused(), "pause before start is a no-op");

    worker.start(plan.clone(), 1);
    assert!(wait_until(Duration::from_secs(5), || catalog.waiting() == 1));

    worker.pause();
    worker.pause();
    assert!(worker.is_paused());
    catalog.release();

    assert!(wait_until(Duration::from_secs(5), || worker.stats().success == 1));
    thread::sleep(Duration::from_millis(250));
    let stats = worker.stats();
    assert_eq!(stats.success, 1);
    assert_eq!(stats.installing, 0);
    assert_eq!(stats.queued, 3);
    assert!(worker.is_running());

    worker.resume();
    assert!(!worker.is_paused());
    let stats = worker.wait();
    assert_eq!(stats.success, 4);

    let events = events.try_iter().collect::<Vec<_>>();
    assert_eq!(
        events
            .iter()
            .filter(|event| **event == WorkerEvent::Paused)
            .count(),
        1
    );
    assert!(events.contains(&WorkerEvent::Resumed));
}

#[test]
fn start_refuses_while_running_or_with_broken_catalog() {
    let catalog = Arc::new(FakeCatalog::gated());
    let (worker, _events) = worker_with(&catalog, fast_policy());

    assert_eq!(worker.start(shared_plan(2), 1), 2);
    assert!(worker.is_running());
    assert_eq!(worker.start(shared_plan(3), 1), 0);
    catalog.release();
    assert_eq!(worker.wait().success, 2);

    let broken = Arc::new(FakeCatalog {
        broken: true,
        ..FakeCatalog::default()
    });
    let (worker, _events) = worker_with(&broken, fast_policy());
    let plan = shared_plan(2);
    assert_eq!(worker.start(plan.clone(), 1), 0);
    assert!(!worker.is_running());
    assert_eq!(plan_statuses(&plan), vec![EntryStatus::Pending; 2]);
}

#[test]
fn only_selected_matched_entries_become_jobs() {
    let catalog = Arc::new(FakeCatalog::default());
    let (worker, events) = worker_with(&catalog, fast_policy());

    let mut plan = MigrationPlan::default();
    plan.add_entry(PlanEntry::new("Git").with_package("git", MatchType::Exact))
        .expect("must add git");
    plan.add_entry(PlanEntry::new("Internal Tool"))
        .expect("must add unmatched");
    plan.add_entry(PlanEntry::new("Slack").with_package("slack", MatchType::Fuzzy))
        .expect("must add slack");
    plan.select_all();
    plan.select_entry(2, false).expect("must deselect slack");
    plan.set_version_lock(0, Some("2.43.0"))
        .expect("must lock version");
    let plan = Arc::new(Mutex::new(plan));

    assert_eq!(worker.start(plan.clone(), 0), 1);
    let stats = worker.wait();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.success, 1);

    let requests = catalog.requests.lock().expect("must lock requests");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].package_id, "git");
    assert_eq!(requests[0].version.as_deref(), Some("2.43.0"));
    assert!(requests[0].version_locked);

    assert_eq!(
        plan_statuses(&plan),
        vec![
            EntryStatus::Success,
            EntryStatus::Pending,
            EntryStatus::Pending
        ]
    );
    assert!(events
        .try_iter()
        .any(|event| event == WorkerEvent::Started { total: 1 }));
}

#[test]
fn empty_run_completes_immediately() {
    let catalog = Arc::new(FakeCatalog::default());
    let (worker, events) = worker_with(&catalog, fast_policy());

    assert_eq!(worker.start(shared_plan(0), 2), 0);
    let stats = worker.wait();
    assert_eq!(stats, WorkerStats::default());

    let events = events.try_iter().collect::<Vec<_>>();
    assert_eq!(
        events,
        vec![
            WorkerEvent::Started { total: 0 },
            WorkerEvent::Completed {
                stats: WorkerStats::default()
            }
        ]
    );
}

#[test]
fn observer_may_call_back_into_the_worker() {
    struct Canceller {
        worker: Mutex<Option<Arc<InstallWorker>>>,
        fired: AtomicBool,
    }

    impl WorkerObserver for Canceller {
        fn on_event(&self, event: &WorkerEvent) {
            if let WorkerEvent::JobStatusChanged { job, .. } = event {
                if job.status == EntryStatus::Success && !self.fired.swap(true, Ordering::SeqCst) {
                    let worker = self.worker.lock().expect("must lock").clone();
                    if let Some(worker) = worker {
                        let _ = worker.stats();
                        worker.cancel();
                    }
                }
            }
        }
    }

    let catalog = Arc::new(FakeCatalog::default());
    let observer = Arc::new(Canceller {
        worker: Mutex::new(None),
        fired: AtomicBool::new(false),
    });
    let worker = Arc::new(
        InstallWorker::builder(catalog.clone())
            .observer(observer.clone())
            .retry_policy(fast_policy())
            .build(),
    );
    *observer.worker.lock().expect("must lock") = Some(worker.clone());

    worker.start(shared_plan(10), 1);
    let stats = worker.wait();
    *observer.worker.lock().expect("must lock") = None;

    assert!(stats.success >= 1);
    assert!(stats.cancelled >= 1);
    assert_eq!(stats.finished(), 10);
}

#[test]
fn stats_count_every_status() {
    let job = |status| Job {
        entry_index: 0,
        app_name: String::new(),
        package_id: "pkg".to_string(),
        requested_version: None,
        status,
        error_message: String::new(),
        started_at: None,
        ended_at: None,
        retry_count: 0,
        failure_kind: None,
    };
    let stats = WorkerStats::from_jobs(&[
        job(EntryStatus::Queued),
        job(EntryStatus::Installing),
        job(EntryStatus::Success),
        job(EntryStatus::Success),
        job(EntryStatus::Failed),
        job(EntryStatus::Cancelled),
    ]);
    assert_eq!(stats.total, 6);
    assert_eq!(stats.queued, 1);
    assert_eq!(stats.installing, 1);
    assert_eq!(stats.success, 2);
    assert_eq!(stats.finished(), 4);
}

#[test]
fn limit_output_parsing_skips_banner_and_blank_lines() {
    let output = "Chocolatey v2.2.2\n\ngit|2.43.0\r\ngit.install|2.43.0\n|9.9\nnotepadplusplus\n";
    let packages = parse_limit_output(output);
    assert_eq!(
        packages,
        vec![
            CatalogPackage::new("git", "2.43.0"),
            CatalogPackage::new("git.install", "2.43.0"),
            CatalogPackage::new("notepadplusplus", ""),
        ]
    );
    assert_eq!(packages[0].title, "git");
}

#[test]
fn outdated_parsing_reads_pinned_flag() {
    let output =
        "Chocolatey v2.2.2\ngit|2.43.0|2.44.0|false\nnodejs|18.0.0|20.11.0|true\nbroken|1.0\n";
    let outdated = parse_outdated(output);
    assert_eq!(outdated.len(), 2);
    assert_eq!(outdated[0].id, "git");
    assert_eq!(outdated[0].available_version, "2.44.0");
    assert!(!outdated[0].pinned);
    assert!(outdated[1].pinned);
}

#[test]
fn error_extraction_prefers_error_lines() {
    assert_eq!(
        extract_error_message("Progress: 50%\n [x] ERROR: Unable to resolve dependency\nFailed"),
        "ERROR: Unable to resolve dependency"
    );
    let output = concat!(
        "Installing...\n",
        "The install of foo was NOT successful.\n",
        "Chocolatey installed 0/1. Failed: 1"
    );
    assert_eq!(
        extract_error_message(output),
        "Chocolatey installed 0/1. Failed: 1"
    );
    assert_eq!(
        extract_error_message("package bogus not found"),
        "package bogus not found"
    );
    assert_eq!(extract_error_message("all quiet"), "Unknown error");
}

#[test]
fn command_output_becomes_install_outcome() {
    let success = crate::choco::outcome_from_output(&migrant_core::CommandOutput {
        exit_code: 3010,
        stdout: "installed".to_string(),
        stderr: String::new(),
    });
    assert!(success.success);
    assert!(success.reboot_required());

    let silent = crate::choco::outcome_from_output(&migrant_core::CommandOutput {
        exit_code: 4,
        stdout: String::new(),
        stderr: String::new(),
    });
    assert!(!silent.success);
    assert_eq!(silent.error_message, "Command failed with exit code 4");

    let noisy = crate::choco::outcome_from_output(&migrant_core::CommandOutput {
        exit_code: 1,
        stdout: "Downloading".to_string(),
        stderr: "ERROR: Access to the path is denied because you are not an administrator"
            .to_string(),
    });
    assert_eq!(noisy.failure_kind, Some(FailureKind::Permission));
    assert!(!noisy.is_retryable());
}

#[test]
fn install_args_follow_request_flags() {
    let mut request = InstallRequest::new("git").with_version(Some("2.43.0"));
    request.force = true;
    request.extra_args = vec!["--params".to_string(), "/NoShellIntegration".to_string()];
    assert_eq!(
        build_install_args(&request),
        vec![
            "install",
            "git",
            "--version",
            "2.43.0",
            "-y",
            "--force",
            "--params",
            "/NoShellIntegration"
        ]
    );

    let mut plain = InstallRequest::new("7zip");
    plain.auto_confirm = false;
    assert_eq!(build_install_args(&plain), vec!["install", "7zip"]);
}

#[test]
fn version_query_finds_semver_triplet() {
    assert_eq!(parse_version("Chocolatey v2.2.2\n"), Some("2.2.2".to_string()));
    assert_eq!(parse_version("1.4.0-beta"), Some("1.4.0".to_string()));
    assert_eq!(parse_version("v2"), None);
}

static TEST_PATH_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "migrant-installer-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        TEST_PATH_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    path
}

#[test]
fn open_fails_without_executable() {
    let dir = test_dir();
    std::fs::create_dir_all(&dir).expect("must create dir");
    assert!(locate_executable(&dir).is_none());

    let err = ChocoCatalog::open(&dir).expect_err("must fail");
    assert!(err.to_string().contains("choco.exe not found"));

    std::fs::create_dir_all(dir.join("bin")).expect("must create bin");
    std::fs::write(dir.join("bin").join("choco.exe"), b"").expect("must write exe");
    assert_eq!(
        locate_executable(&dir),
        Some(dir.join("bin").join("choco.exe"))
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[cfg(unix)]
#[test]
fn scripted_choco_drives_every_catalog_operation() {
    use std::os::unix::fs::PermissionsExt;

    let dir = test_dir();
    std::fs::create_dir_all(&dir).expect("must create dir");
    let script = dir.join("choco.exe");
    std::fs::write(
        &script,
        r#"#!/bin/sh
case "$1" in
  --version) echo "2.2.2" ;;
  search) echo "Chocolatey v2.2.2"; echo "git|2.43.0"; echo "git.install|2.43.0" ;;
  install)
    case "$2" in
      badpkg) echo "ERROR: The package was not found with the source(s) listed."; exit 1 ;;
      slowpkg) exec sleep 5 ;;
    esac
    echo "installed $2 into $ChocolateyInstall"; exit 3010 ;;
  list) echo "git|2.43.0" ;;
  outdated) echo "git|2.43.0|2.44.0|false" ;;
  *) exit 1 ;;
esac
"#,
    )
    .expect("must write script");
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
        .expect("must make script executable");

    let catalog = ChocoCatalog::open(&dir).expect("must open catalog");
    assert_eq!(catalog.version(), "2.2.2");
    assert_eq!(catalog.catalog_version().as_deref(), Some("2.2.2"));
    assert!(catalog.verify_integrity());

    let found = catalog.search("git", 1).expect("must search");
    assert_eq!(found, vec![CatalogPackage::new("git", "2.43.0")]);
    assert!(catalog.search("  ", 5).expect("blank query").is_empty());
    assert!(catalog.is_available("GIT"));
    assert!(!catalog.is_available("nodejs"));
    assert!(!catalog.is_available("not a package"));

    assert_eq!(catalog.installed_version("git").as_deref(), Some("2.43.0"));
    assert_eq!(catalog.installed_packages().expect("must list").len(), 1);
    assert_eq!(catalog.outdated().expect("must list outdated").len(), 1);

    let installed = catalog.install(&InstallRequest::new("git"));
    assert!(installed.success);
    assert!(installed.reboot_required());
    assert!(installed.output.contains(dir.to_string_lossy().as_ref()));

    let missing = catalog.install(&InstallRequest::new("badpkg"));
    assert!(!missing.success);
    assert!(missing
        .error_message
        .starts_with("ERROR: The package was not found"));
    assert_eq!(missing.failure_kind, Some(FailureKind::NotFound));

    let mut slow = InstallRequest::new("slowpkg");
    slow.timeout = Some(Duration::from_millis(200));
    let timed_out = catalog.install(&slow);
    assert_eq!(timed_out.error_message, "Command timed out");
    assert_eq!(timed_out.failure_kind, Some(FailureKind::Timeout));
    assert!(timed_out.is_retryable());

    let rejected = catalog.install(&InstallRequest::new("bad id"));
    assert_eq!(rejected.failure_kind, Some(FailureKind::InvalidInput));
    assert_eq!(rejected.exit_code, -1);

    let bad_version = catalog.install(&InstallRequest::new("git").with_version(Some("latest!")));
    assert_eq!(bad_version.failure_kind, Some(FailureKind::InvalidInput));

    let uninstalled = catalog.uninstall("git");
    assert!(!uninstalled.success);
    assert_eq!(uninstalled.error_message, "Command failed with exit code 1");

    let _ = std::fs::remove_dir_all(&dir);
}
