use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use migrant_core::{
    Clock, EntryStatus, InstallOutcome, InstallRequest, PackageCatalog, SystemClock,
};
use migrant_plan::MigrationPlan;
use tracing::{debug, error, info, warn};

use crate::{Job, NoopObserver, RetryPolicy, WorkerEvent, WorkerObserver, WorkerStats};

/// The plan is shared with whoever started the run; the worker writes job
/// status back into it. Lock order is always worker state, then plan.
pub type SharedPlan = Arc<Mutex<MigrationPlan>>;

const COORDINATOR_TICK: Duration = Duration::from_millis(100);
const DEFAULT_FAILURE_MESSAGE: &str = "Installation failed";
const CANCELLED_MESSAGE: &str = "Migration cancelled";

pub struct InstallWorkerBuilder {
    catalog: Arc<dyn PackageCatalog>,
    observer: Arc<dyn WorkerObserver>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    install_timeout: Option<Duration>,
}

impl InstallWorkerBuilder {
    pub fn observer(mut self, observer: Arc<dyn WorkerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy.capped();
        self
    }

    /// Per-install timeout; the catalog's default applies when unset.
    pub fn install_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.install_timeout = timeout;
        self
    }

    pub fn build(self) -> InstallWorker {
        InstallWorker {
            shared: Arc::new(Shared {
                catalog: self.catalog,
                observer: self.observer,
                clock: self.clock,
                policy: self.policy,
                install_timeout: self.install_timeout,
                state: Mutex::new(WorkerState::default()),
                wake: Condvar::new(),
                emitting: Mutex::new(()),
            }),
            coordinator: Mutex::new(None),
        }
    }
}

/// Installs the selected entries of a plan with bounded concurrency.
///
/// `start` hands the run to a coordinator thread that dispatches at most
/// `max_concurrent` installs, each on its own thread. Failed installs with a
/// transient cause are re-queued after an exponential delay. The run can be
/// paused, resumed and cancelled from any thread; cancellation drops queued
/// jobs immediately and lets in-flight installs finish.
pub struct InstallWorker {
    shared: Arc<Shared>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    catalog: Arc<dyn PackageCatalog>,
    observer: Arc<dyn WorkerObserver>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    install_timeout: Option<Duration>,
    state: Mutex<WorkerState>,
    wake: Condvar,
    emitting: Mutex<()>,
}

#[derive(Default)]
struct WorkerState {
    plan: Option<SharedPlan>,
    jobs: Vec<Job>,
    queue: VecDeque<usize>,
    max_concurrent: usize,
    active: usize,
    backing_off: usize,
    running: bool,
    paused: bool,
    cancelled: bool,
    outbox: Vec<WorkerEvent>,
}

impl WorkerState {
    /// Applies `change` to a job, mirrors the result into the plan and queues
    /// a status event.
    fn update_job(
        &mut self,
        job_index: usize,
        executed_at: Option<DateTime<Utc>>,
        change: impl FnOnce(&mut Job),
    ) {
        let Some(job) = self.jobs.get_mut(job_index) else {
            return;
        };
        change(job);

        if let Some(plan) = &self.plan {
            let mut plan = plan.lock().unwrap_or_else(PoisonError::into_inner);
            let entry_index = job.entry_index;
            let recorded =
                plan.record_status(entry_index, job.status, &job.error_message, executed_at);
            if let Err(err) = recorded {
                warn!("failed to record status for entry {entry_index}: {err:#}");
            }
        }

        self.outbox.push(WorkerEvent::JobStatusChanged {
            entry_index: job.entry_index,
            job: job.clone(),
        });
    }

    fn progress(&mut self, job_index: usize, message: String) {
        if let Some(job) = self.jobs.get(job_index) {
            self.outbox.push(WorkerEvent::JobProgress {
                entry_index: job.entry_index,
                message,
            });
        }
    }

    fn is_idle(&self) -> bool {
        self.active == 0 && self.backing_off == 0
    }
}

impl InstallWorker {
    pub fn new(catalog: Arc<dyn PackageCatalog>) -> Self {
        Self::builder(catalog).build()
    }

    pub fn builder(catalog: Arc<dyn PackageCatalog>) -> InstallWorkerBuilder {
        InstallWorkerBuilder {
            catalog,
            observer: Arc::new(NoopObserver),
            clock: Arc::new(SystemClock),
            policy: RetryPolicy::default(),
            install_timeout: None,
        }
    }

    /// Queues every selected, matched entry and starts the coordinator.
    /// Returns the number of queued jobs, or 0 when a run is already active or
    /// the catalog fails its integrity check.
    pub fn start(&self, plan: SharedPlan, max_concurrent: usize) -> usize {
        if self.is_running() {
            warn!("migration is already running");
            return 0;
        }
        if !self.shared.catalog.verify_integrity() {
            warn!("catalog failed its integrity check, migration not started");
            return 0;
        }
        self.join_coordinator();

        let total = {
            let mut guard = self.shared.lock_state();
            if guard.running {
                return 0;
            }
            let state = &mut *guard;

            let jobs = {
                let mut plan = plan.lock().unwrap_or_else(PoisonError::into_inner);
                let jobs = plan
                    .entries()
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.selected && entry.is_matched())
                    .map(|(index, entry)| Job::queued(index, entry))
                    .collect::<Vec<_>>();
                for job in &jobs {
                    if let Err(err) =
                        plan.record_status(job.entry_index, EntryStatus::Queued, "", None)
                    {
                        warn!("failed to queue entry {}: {err:#}", job.entry_index);
                    }
                }
                jobs
            };

            state.queue = (0..jobs.len()).collect();
            state.jobs = jobs;
            state.plan = Some(plan);
            state.max_concurrent = max_concurrent.max(1);
            state.active = 0;
            state.backing_off = 0;
            state.running = true;
            state.paused = false;
            state.cancelled = false;
            state.outbox.push(WorkerEvent::Started {
                total: state.jobs.len(),
            });
            state.jobs.len()
        };
        info!("starting migration of {total} packages (max {max_concurrent} concurrent)");
        self.shared.flush();

        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("migrant-coordinator".to_string())
            .spawn(move || shared.coordinate())
        {
            Ok(handle) => {
                *self
                    .coordinator
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(handle);
                total
            }
            Err(err) => {
                error!("failed to start migration coordinator: {err}");
                let mut state = self.shared.lock_state();
                state.running = false;
                state.queue.clear();
                0
            }
        }
    }

    pub fn pause(&self) {
        {
            let mut state = self.shared.lock_state();
            if !state.running || state.paused || state.cancelled {
                return;
            }
            state.paused = true;
            state.outbox.push(WorkerEvent::Paused);
        }
        info!("migration paused");
        self.shared.flush();
    }

    pub fn resume(&self) {
        {
            let mut state = self.shared.lock_state();
            if !state.running || !state.paused {
                return;
            }
            state.paused = false;
            state.outbox.push(WorkerEvent::Resumed);
            self.shared.wake.notify_all();
        }
        info!("migration resumed");
        self.shared.flush();
    }

    /// Cancels every queued job. In-flight installs run to completion and are
    /// not retried; jobs waiting out a retry delay end as cancelled.
    pub fn cancel(&self) {
        let drained = {
            let mut guard = self.shared.lock_state();
            if !guard.running || guard.cancelled {
                return;
            }
            let state = &mut *guard;
            state.cancelled = true;
            state.paused = false;

            let now = self.shared.clock.now();
            let drained = state.queue.drain(..).collect::<Vec<_>>();
            for &job_index in &drained {
                state.update_job(job_index, Some(now), |job| {
                    job.status = EntryStatus::Cancelled;
                    job.error_message = CANCELLED_MESSAGE.to_string();
                    job.ended_at = Some(now);
                });
            }
            state.outbox.push(WorkerEvent::Cancelled);
            self.shared.wake.notify_all();
            drained.len()
        };
        info!("migration cancelled, {drained} queued jobs dropped");
        self.shared.flush();
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock_state().running
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock_state().paused
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats::from_jobs(&self.shared.lock_state().jobs)
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.shared.lock_state().jobs.clone()
    }

    /// Blocks until the current run completes and returns its final stats.
    pub fn wait(&self) -> WorkerStats {
        self.join_coordinator();
        self.stats()
    }

    fn join_coordinator(&self) {
        let handle = self
            .coordinator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("migration coordinator panicked");
            }
        }
    }
}

impl Drop for InstallWorker {
    fn drop(&mut self) {
        self.cancel();
        self.join_coordinator();
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers queued events in the order they were produced. Whoever holds
    /// the emit lock drains for everyone; a re-entrant call from an observer
    /// just leaves its events for the outer loop.
    fn flush(&self) {
        loop {
            {
                let Ok(_emitting) = self.emitting.try_lock() else {
                    return;
                };
                self.drain_outbox();
            }
            if self.lock_state().outbox.is_empty() {
                return;
            }
        }
    }

    fn drain_outbox(&self) {
        loop {
            let events = std::mem::take(&mut self.lock_state().outbox);
            if events.is_empty() {
                return;
            }
            for event in &events {
                self.observer.on_event(event);
            }
        }
    }

    fn coordinate(self: Arc<Self>) {
        let mut state = self.lock_state();
        loop {
            if state.is_idle() && (state.cancelled || state.queue.is_empty()) {
                break;
            }
            if state.paused {
                state = self
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            if state.cancelled || state.active >= state.max_concurrent || state.queue.is_empty() {
                state = self
                    .wake
                    .wait_timeout(state, COORDINATOR_TICK)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }
            let Some(job_index) = state.queue.pop_front() else {
                continue;
            };

            state.active += 1;
            let now = self.clock.now();
            state.update_job(job_index, None, |job| {
                job.status = EntryStatus::Installing;
                job.started_at = Some(now);
                job.ended_at = None;
            });
            let job = &state.jobs[job_index];
            let request = job.request(self.install_timeout);
            let message = format!("Installing {}...", job.package_id);
            state.progress(job_index, message);
            debug!(
                "dispatched {} ({} active, {} queued)",
                request.package_id,
                state.active,
                state.queue.len()
            );
            drop(state);

            self.flush();
            self.spawn_install(job_index, request);
            state = self.lock_state();
        }

        state.running = false;
        state.paused = false;
        let stats = WorkerStats::from_jobs(&state.jobs);
        state.outbox.push(WorkerEvent::Completed { stats });
        drop(state);

        info!(
            "migration finished: {} succeeded, {} failed, {} cancelled of {}",
            stats.success, stats.failed, stats.cancelled, stats.total
        );
        let _emitting = self.emitting.lock().unwrap_or_else(PoisonError::into_inner);
        self.drain_outbox();
    }

    fn spawn_install(self: &Arc<Self>, job_index: usize, request: InstallRequest) {
        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("migrant-install-{job_index}"))
            .spawn(move || {
                let outcome = shared.catalog.install(&request);
                shared.finish_install(job_index, outcome);
            });
        if let Err(err) = spawned {
            error!("failed to start install thread: {err}");
            self.finish_install(
                job_index,
                InstallOutcome::failure(format!("failed to start install thread: {err}"), "", -1),
            );
        }
    }

    fn finish_install(&self, job_index: usize, outcome: InstallOutcome) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        state.active = state.active.saturating_sub(1);

        let now = self.clock.now();
        let package_id = state.jobs[job_index].package_id.clone();
        if outcome.success {
            if outcome.reboot_required() {
                info!("{package_id} installed, reboot required");
            }
            state.update_job(job_index, Some(now), |job| {
                job.status = EntryStatus::Success;
                job.error_message.clear();
                job.failure_kind = None;
                job.ended_at = Some(now);
            });
            state.progress(job_index, format!("Successfully installed {package_id}"));
        } else {
            let message = if outcome.error_message.trim().is_empty() {
                DEFAULT_FAILURE_MESSAGE.to_string()
            } else {
                outcome.error_message.clone()
            };
            state.update_job(job_index, Some(now), |job| {
                job.status = EntryStatus::Failed;
                job.error_message = message;
                job.failure_kind = outcome.failure_kind;
                job.ended_at = Some(now);
            });
            state.progress(job_index, format!("Failed to install {package_id}"));
        }

        let job = &state.jobs[job_index];
        if !self.policy.should_retry(job, state.cancelled) {
            self.wake.notify_all();
            drop(guard);
            self.flush();
            return;
        }

        let attempt = job.retry_count + 1;
        let delay = self.policy.delay(job.retry_count);
        let entry_index = job.entry_index;
        warn!(
            "install of {package_id} failed, retry {attempt}/{} in {delay:?}",
            self.policy.max_retries
        );
        state.backing_off += 1;
        state.outbox.push(WorkerEvent::JobRetrying {
            entry_index,
            attempt,
            delay,
        });
        self.wake.notify_all();
        drop(guard);
        self.flush();

        let deadline = Instant::now() + delay;
        let mut guard = self.lock_state();
        while !guard.cancelled {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            guard = self
                .wake
                .wait_timeout(guard, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        let state = &mut *guard;
        state.backing_off -= 1;
        if state.cancelled {
            let now = self.clock.now();
            state.update_job(job_index, Some(now), |job| {
                job.status = EntryStatus::Cancelled;
                job.error_message = CANCELLED_MESSAGE.to_string();
                job.ended_at = Some(now);
            });
        } else {
            state.update_job(job_index, None, |job| {
                job.retry_count += 1;
                job.status = EntryStatus::Queued;
                job.started_at = None;
                job.ended_at = None;
            });
            state.queue.push_back(job_index);
        }
        self.wake.notify_all();
        drop(guard);
        self.flush();
    }
}
